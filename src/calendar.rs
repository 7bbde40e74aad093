use std::collections::HashMap;

use chrono::{Datelike, Weekday};

use crate::model::*;

/// Length of a working day used for hour estimates.
pub const WORK_HOURS_PER_DAY: f64 = 8.0;

// ── Rule evaluation ───────────────────────────────────────────────
//
// Precedence for a single date:
//   1. Transfer on the date → its `is_workday` flag, verbatim.
//   2. Holiday on the date  → non-working.
//   3. Otherwise            → Mon–Fri working, Sat/Sun not.
// Events without a date are ignored.

/// Which rule decided a date's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayRule {
    Transfer { is_workday: bool },
    Holiday,
    Weekday,
    Weekend,
}

impl DayRule {
    pub fn is_working(self) -> bool {
        match self {
            DayRule::Transfer { is_workday } => is_workday,
            DayRule::Holiday | DayRule::Weekend => false,
            DayRule::Weekday => true,
        }
    }
}

fn default_rule(date: Day) -> DayRule {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => DayRule::Weekend,
        _ => DayRule::Weekday,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Override {
    transfer: Option<bool>,
    holiday: bool,
}

/// Calendar events resolved into a per-date lookup table.
///
/// Only the first transfer seen for a date is kept; holidays collapse into
/// a flag. Build once per snapshot and query as often as needed.
#[derive(Debug, Clone, Default)]
pub struct CalendarRules {
    overrides: HashMap<Day, Override>,
}

impl CalendarRules {
    /// Plain Mon–Fri calendar with no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: &[CalendarEvent]) -> Self {
        let mut overrides: HashMap<Day, Override> = HashMap::new();
        for event in events {
            let Some(date) = event.date else { continue };
            let entry = overrides.entry(date).or_default();
            match event.kind {
                EventKind::Transfer => {
                    if entry.transfer.is_none() {
                        entry.transfer = Some(event.is_workday);
                    }
                }
                EventKind::Holiday => entry.holiday = true,
            }
        }
        Self { overrides }
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    pub fn day_rule(&self, date: Day) -> DayRule {
        match self.overrides.get(&date) {
            Some(Override {
                transfer: Some(is_workday),
                ..
            }) => DayRule::Transfer {
                is_workday: *is_workday,
            },
            Some(Override { holiday: true, .. }) => DayRule::Holiday,
            _ => default_rule(date),
        }
    }

    pub fn is_working_day(&self, date: Day) -> bool {
        self.day_rule(date).is_working()
    }

    pub fn working_days(&self, range: &DateRange) -> u32 {
        range.days().filter(|d| self.is_working_day(*d)).count() as u32
    }

    /// Like [`working_days`](Self::working_days) but total: a reversed range counts 0.
    pub fn working_days_between(&self, start: Day, end: Day) -> u32 {
        match DateRange::checked(start, end) {
            Some(range) => self.working_days(&range),
            None => 0,
        }
    }
}

/// Whether `date` is a working day under `events`. Never fails.
pub fn is_working_day(date: Day, events: &[CalendarEvent]) -> bool {
    CalendarRules::from_events(events).is_working_day(date)
}

/// Working days in `[start, end]`; 0 for a reversed range.
pub fn working_days_in_range(start: Day, end: Day, events: &[CalendarEvent]) -> u32 {
    CalendarRules::from_events(events).working_days_between(start, end)
}

/// `working days × 8 × rate`, rounded to two decimals.
pub fn working_hours(start: Day, end: Day, rate: Rate, events: &[CalendarEvent]) -> f64 {
    let days = working_days_in_range(start, end, events) as f64;
    round2(days * WORK_HOURS_PER_DAY * rate.as_f64())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
