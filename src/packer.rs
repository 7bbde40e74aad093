use ulid::Ulid;

use crate::calendar::CalendarRules;
use crate::model::*;

/// Height of a lane at weight 1.0 when the caller does not choose one.
pub const DEFAULT_LANE_HEIGHT: f64 = 24.0;

/// One bar to lay out for a single owner.
#[derive(Debug, Clone, PartialEq)]
pub struct PackInterval {
    pub id: Ulid,
    pub span: DateRange,
    pub weight: f64,
}

impl From<&Assignment> for PackInterval {
    fn from(a: &Assignment) -> Self {
        Self {
            id: a.id,
            span: a.span,
            weight: a.rate.as_f64(),
        }
    }
}

/// A visible calendar column. Widths may differ per day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub date: Day,
    pub width: f64,
}

/// A maximal run of days inside an interval sharing one working status.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub span: DateRange,
    pub working: bool,
    pub left: f64,
    pub width: f64,
}

/// Render geometry for one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneGeometry {
    pub id: Ulid,
    pub span: DateRange,
    pub lane: usize,
    pub top: f64,
    pub height: f64,
    pub left: f64,
    pub width: f64,
    pub segments: Vec<Segment>,
}

/// Lays out one owner's intervals into lanes.
///
/// Ordering contract: intervals are placed by `(start, id)`, so the same
/// input always yields the same lanes regardless of input order.
#[derive(Debug, Clone, Copy)]
pub struct IntervalPacker {
    base_height: f64,
}

impl Default for IntervalPacker {
    fn default() -> Self {
        Self::new(DEFAULT_LANE_HEIGHT)
    }
}

impl IntervalPacker {
    pub fn new(base_height: f64) -> Self {
        Self {
            base_height: base_height.max(0.0),
        }
    }

    pub fn base_height(&self) -> f64 {
        self.base_height
    }

    fn height_of(&self, interval: &PackInterval) -> f64 {
        self.base_height * interval.weight.max(0.0)
    }

    /// Geometry for every interval, returned in input order.
    pub fn pack(
        &self,
        intervals: &[PackInterval],
        columns: &[Column],
        rules: &CalendarRules,
    ) -> Vec<LaneGeometry> {
        let lanes = assign_lanes(intervals);
        let axis = ColumnAxis::new(columns);

        intervals
            .iter()
            .enumerate()
            .map(|(i, interval)| {
                let lane = lanes[i];
                // Every lower-lane interval overlapping this one adds its height.
                let top: f64 = intervals
                    .iter()
                    .enumerate()
                    .filter(|&(j, other)| lanes[j] < lane && other.span.overlaps(&interval.span))
                    .map(|(_, other)| self.height_of(other))
                    .sum();

                let (left, width) = axis.span_x(&interval.span);
                let segments = split_segments(&interval.span, rules)
                    .into_iter()
                    .map(|(span, working)| {
                        let (left, width) = axis.span_x(&span);
                        Segment {
                            span,
                            working,
                            left,
                            width,
                        }
                    })
                    .collect();

                LaneGeometry {
                    id: interval.id,
                    span: interval.span,
                    lane,
                    top,
                    height: self.height_of(interval),
                    left,
                    width,
                    segments,
                }
            })
            .collect()
    }
}

/// Greedy lane colouring by `(start, id)`. Returns one lane per input
/// interval, in input order.
///
/// A lane is free once its last occupant ended strictly before the current
/// start, so intersecting intervals never share a lane. Processing in start
/// order makes the lane count equal to the maximum overlap depth.
pub fn assign_lanes(intervals: &[PackInterval]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&intervals[a], &intervals[b]);
        x.span.start.cmp(&y.span.start).then(x.id.cmp(&y.id))
    });

    let mut lane_ends: Vec<Day> = Vec::new();
    let mut lanes = vec![0usize; intervals.len()];
    for i in order {
        let span = intervals[i].span;
        match lane_ends.iter().position(|end| *end < span.start) {
            Some(free) => {
                lane_ends[free] = span.end;
                lanes[i] = free;
            }
            None => {
                lane_ends.push(span.end);
                lanes[i] = lane_ends.len() - 1;
            }
        }
    }
    lanes
}

/// Number of lanes used by an [`assign_lanes`] result.
pub fn lane_count(lanes: &[usize]) -> usize {
    lanes.iter().max().map_or(0, |max| max + 1)
}

/// Split a span into maximal runs of equal working status.
pub fn split_segments(span: &DateRange, rules: &CalendarRules) -> Vec<(DateRange, bool)> {
    let mut runs: Vec<(DateRange, bool)> = Vec::new();
    for day in span.days() {
        let working = rules.is_working_day(day);
        if let Some((last, last_working)) = runs.last_mut()
            && *last_working == working
        {
            last.end = day;
            continue;
        }
        runs.push((DateRange::single(day), working));
    }
    runs
}

/// Prefix sums over the visible columns for day → x mapping.
struct ColumnAxis<'a> {
    columns: &'a [Column],
    prefix: Vec<f64>,
}

impl<'a> ColumnAxis<'a> {
    fn new(columns: &'a [Column]) -> Self {
        debug_assert!(
            columns.windows(2).all(|w| w[0].date < w[1].date),
            "columns must be ordered by date"
        );
        let mut prefix = Vec::with_capacity(columns.len() + 1);
        let mut acc = 0.0;
        prefix.push(acc);
        for c in columns {
            acc += c.width;
            prefix.push(acc);
        }
        Self { columns, prefix }
    }

    /// `(left, width)`: widths of visible days before `span.start`, and of
    /// visible days inside the span. Days outside the columns add nothing.
    fn span_x(&self, span: &DateRange) -> (f64, f64) {
        let lo = self.columns.partition_point(|c| c.date < span.start);
        let hi = self.columns.partition_point(|c| c.date <= span.end);
        let left = self.prefix[lo];
        (left, self.prefix[hi.max(lo)] - left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> Day {
        // January 2024: the 1st is a Monday, 6/7 and 13/14 are weekends.
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn id(n: u128) -> Ulid {
        Ulid::from_parts(0, n)
    }

    fn iv(n: u128, start: u32, end: u32, weight: f64) -> PackInterval {
        PackInterval {
            id: id(n),
            span: DateRange::new(d(start), d(end)),
            weight,
        }
    }

    fn columns(from: u32, to: u32, width: f64) -> Vec<Column> {
        (from..=to).map(|day| Column { date: d(day), width }).collect()
    }

    fn assert_no_shared_lane(intervals: &[PackInterval], lanes: &[usize]) {
        for i in 0..intervals.len() {
            for j in (i + 1)..intervals.len() {
                if intervals[i].span.overlaps(&intervals[j].span) {
                    assert_ne!(lanes[i], lanes[j], "{:?} vs {:?}", intervals[i], intervals[j]);
                }
            }
        }
    }

    // ── lanes ─────────────────────────────────────────────

    #[test]
    fn disjoint_intervals_share_one_lane() {
        let intervals = vec![iv(1, 1, 2, 1.0), iv(2, 3, 5, 1.0), iv(3, 8, 8, 0.5), iv(4, 20, 31, 2.0)];
        let lanes = assign_lanes(&intervals);
        assert_eq!(lane_count(&lanes), 1);
    }

    #[test]
    fn touching_days_overlap() {
        // Closed ranges: ending on the 3rd and starting on the 3rd collide.
        let intervals = vec![iv(1, 1, 3, 1.0), iv(2, 3, 4, 1.0)];
        let lanes = assign_lanes(&intervals);
        assert_eq!(lanes, vec![0, 1]);
    }

    #[test]
    fn lane_reused_after_end() {
        let intervals = vec![iv(1, 1, 3, 1.0), iv(2, 2, 6, 1.0), iv(3, 4, 5, 1.0)];
        let lanes = assign_lanes(&intervals);
        assert_eq!(lanes, vec![0, 1, 0]);
        assert_eq!(lane_count(&lanes), 2);
    }

    #[test]
    fn identical_intervals_ordered_by_id() {
        let intervals = vec![iv(9, 1, 5, 1.0), iv(3, 1, 5, 1.0)];
        let lanes = assign_lanes(&intervals);
        assert_eq!(lanes, vec![1, 0]); // id 3 goes first
    }

    #[test]
    fn lanes_independent_of_input_order() {
        let a = vec![iv(1, 1, 4, 1.0), iv(2, 2, 9, 1.0), iv(3, 5, 6, 1.0), iv(4, 3, 3, 1.0)];
        let mut b = a.clone();
        b.reverse();
        let la = assign_lanes(&a);
        let mut lb = assign_lanes(&b);
        lb.reverse();
        assert_eq!(la, lb);
    }

    #[test]
    fn pseudo_random_never_shares_lane() {
        // Small LCG keeps the test deterministic.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 33) as u32
        };
        for round in 0..50 {
            let intervals: Vec<PackInterval> = (0..25)
                .map(|n| {
                    let start = 1 + next() % 28;
                    let len = next() % 6;
                    iv(round * 100 + n, start, (start + len).min(31), 1.0)
                })
                .collect();
            let lanes = assign_lanes(&intervals);
            assert_no_shared_lane(&intervals, &lanes);

            // Lane count equals the deepest overlap on any single day.
            let depth = (1..=31)
                .map(|day| intervals.iter().filter(|i| i.span.contains(d(day))).count())
                .max()
                .unwrap();
            assert_eq!(lane_count(&lanes), depth);
        }
    }

    #[test]
    fn empty_input() {
        assert!(assign_lanes(&[]).is_empty());
        assert_eq!(lane_count(&[]), 0);
        let packed = IntervalPacker::default().pack(&[], &columns(1, 7, 10.0), &CalendarRules::new());
        assert!(packed.is_empty());
    }

    // ── offsets ───────────────────────────────────────────

    #[test]
    fn offset_stacks_weighted_heights() {
        let intervals = vec![iv(1, 1, 10, 1.0), iv(2, 2, 3, 0.5), iv(3, 2, 5, 1.0)];
        let packed = IntervalPacker::new(20.0).pack(&intervals, &columns(1, 31, 10.0), &CalendarRules::new());
        assert_eq!(packed[0].lane, 0);
        assert_eq!(packed[0].top, 0.0);
        assert_eq!(packed[1].lane, 1);
        assert_eq!(packed[1].top, 20.0);
        assert_eq!(packed[1].height, 10.0);
        assert_eq!(packed[2].lane, 2);
        assert_eq!(packed[2].top, 30.0);
    }

    #[test]
    fn offset_sums_every_lower_overlap() {
        // Lane 0 holds two bars that both overlap the lane-1 bar.
        let intervals = vec![iv(1, 1, 2, 1.0), iv(2, 4, 5, 0.5), iv(3, 1, 5, 1.0)];
        let packed = IntervalPacker::new(20.0).pack(&intervals, &columns(1, 31, 10.0), &CalendarRules::new());
        assert_eq!(packed[0].lane, 0);
        assert_eq!(packed[1].lane, 0);
        assert_eq!(packed[2].lane, 1);
        assert_eq!(packed[2].top, 30.0);
    }

    #[test]
    fn offset_ignores_non_overlapping_lower_lanes() {
        let intervals = vec![iv(1, 1, 9, 2.0), iv(2, 2, 4, 1.0), iv(3, 6, 8, 1.0)];
        let packed = IntervalPacker::new(10.0).pack(&intervals, &columns(1, 31, 10.0), &CalendarRules::new());
        assert_eq!(packed[2].lane, 1);
        assert_eq!(packed[2].top, 20.0);
    }

    // ── horizontal mapping ────────────────────────────────

    #[test]
    fn non_uniform_columns() {
        let cols = vec![
            Column { date: d(1), width: 10.0 },
            Column { date: d(2), width: 20.0 },
            Column { date: d(3), width: 30.0 },
            Column { date: d(4), width: 40.0 },
        ];
        let packed = IntervalPacker::default().pack(&[iv(1, 2, 3, 1.0)], &cols, &CalendarRules::new());
        assert_eq!(packed[0].left, 10.0);
        assert_eq!(packed[0].width, 50.0);
    }

    #[test]
    fn interval_clipped_to_visible_columns() {
        let cols = columns(3, 5, 10.0);
        let packer = IntervalPacker::default();
        let rules = CalendarRules::new();

        let before = packer.pack(&[iv(1, 1, 4, 1.0)], &cols, &rules);
        assert_eq!((before[0].left, before[0].width), (0.0, 20.0));

        let outside = packer.pack(&[iv(2, 10, 12, 1.0)], &cols, &rules);
        assert_eq!((outside[0].left, outside[0].width), (30.0, 0.0));
    }

    // ── segments ──────────────────────────────────────────

    #[test]
    fn ten_day_interval_splits_around_weekend() {
        let rules = CalendarRules::new();
        let span = DateRange::new(d(3), d(12));
        let runs = split_segments(&span, &rules);
        assert_eq!(
            runs,
            vec![
                (DateRange::new(d(3), d(5)), true),
                (DateRange::new(d(6), d(7)), false),
                (DateRange::new(d(8), d(12)), true),
            ]
        );
        // Union equals the interval, no gap or overlap.
        assert_eq!(runs.first().unwrap().0.start, span.start);
        assert_eq!(runs.last().unwrap().0.end, span.end);
        for pair in runs.windows(2) {
            assert_eq!(pair[0].0.end.succ_opt().unwrap(), pair[1].0.start);
        }
        let total: i64 = runs.iter().map(|(r, _)| r.len_days()).sum();
        assert_eq!(total, span.len_days());
    }

    #[test]
    fn single_day_single_segment() {
        let runs = split_segments(&DateRange::single(d(6)), &CalendarRules::new());
        assert_eq!(runs, vec![(DateRange::single(d(6)), false)]);
    }

    #[test]
    fn weekend_only_interval_keeps_full_width() {
        let packed = IntervalPacker::default().pack(&[iv(1, 6, 7, 1.0)], &columns(1, 14, 10.0), &CalendarRules::new());
        let geo = &packed[0];
        assert_eq!(geo.width, 20.0);
        assert_eq!(geo.segments.len(), 1);
        assert!(!geo.segments[0].working);
        assert_eq!(geo.segments[0].width, geo.width);
        assert_eq!(geo.segments[0].left, geo.left);
    }

    #[test]
    fn segments_follow_calendar_overrides() {
        let events = vec![
            CalendarEvent::holiday(d(3)),
            CalendarEvent::transfer(d(6), true),
        ];
        let rules = CalendarRules::from_events(&events);
        let packed = IntervalPacker::default().pack(&[iv(1, 2, 7, 1.0)], &columns(1, 14, 10.0), &rules);
        let flags: Vec<(u32, bool)> = packed[0]
            .segments
            .iter()
            .map(|s| (s.span.len_days() as u32, s.working))
            .collect();
        assert_eq!(flags, vec![(1, true), (1, false), (3, true), (1, false)]);
        // Segment geometry tiles the bar.
        let width: f64 = packed[0].segments.iter().map(|s| s.width).sum();
        assert_eq!(width, packed[0].width);
        assert_eq!(packed[0].lane, 0);
    }
}
