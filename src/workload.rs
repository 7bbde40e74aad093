use std::collections::BTreeMap;

use crate::calendar::CalendarRules;
use crate::model::*;

/// Date → summed rate. Derived, never persisted.
pub type DailyTotals = BTreeMap<Day, Rate>;

/// One day of an owner's load, ready for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLoad {
    pub date: Day,
    pub total: Rate,
    pub capacity: Rate,
    pub percent: i64,
    pub working: bool,
}

/// Sum of rates per date over `range`, one entry for every date in it.
///
/// Sweep line over `+rate` at each clipped start and `-rate` the day after
/// each clipped end.
pub fn compute_daily_totals<I>(intervals: I, range: &DateRange) -> DailyTotals
where
    I: IntoIterator<Item = (DateRange, Rate)>,
{
    let mut deltas: BTreeMap<Day, Rate> = BTreeMap::new();
    for (span, rate) in intervals {
        let Some(clipped) = span.intersection(range) else {
            continue;
        };
        *deltas.entry(clipped.start).or_default() += rate;
        if let Some(after) = clipped.end.succ_opt() {
            let slot = deltas.entry(after).or_default();
            *slot = *slot - rate;
        }
    }

    let mut running = Rate::ZERO;
    range
        .days()
        .map(|day| {
            if let Some(delta) = deltas.get(&day) {
                running += *delta;
            }
            (day, running)
        })
        .collect()
}

/// `round(total / capacity * 100)`, or 0 on a non-working day or with no
/// capacity. Rounds half up.
pub fn compute_utilization_percent(total: Rate, capacity: Rate, is_working_day: bool) -> i64 {
    if !is_working_day || !capacity.is_positive() {
        return 0;
    }
    let (t, c) = (i128::from(total.units()), i128::from(capacity.units()));
    i64::try_from((t * 200 + c).div_euclid(2 * c)).unwrap_or(i64::MAX)
}

/// Date-wise sum of several totals maps (members → team, teams → department).
pub fn sum_totals<'a, I>(parts: I) -> DailyTotals
where
    I: IntoIterator<Item = &'a DailyTotals>,
{
    let mut sum = DailyTotals::new();
    for part in parts {
        for (day, rate) in part {
            *sum.entry(*day).or_default() += *rate;
        }
    }
    sum
}

pub fn utilization_series(totals: &DailyTotals, capacity: Rate, rules: &CalendarRules) -> Vec<DayLoad> {
    totals
        .iter()
        .map(|(&date, &total)| {
            let working = rules.is_working_day(date);
            DayLoad {
                date,
                total,
                capacity,
                percent: compute_utilization_percent(total, capacity, working),
                working,
            }
        })
        .collect()
}

/// Working days loaded above 100%.
pub fn overloaded_days(series: &[DayLoad]) -> Vec<Day> {
    series
        .iter()
        .filter(|load| load.working && load.percent > 100)
        .map(|load| load.date)
        .collect()
}
