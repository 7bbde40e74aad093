use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A calendar day. The only time type.
pub type Day = NaiveDate;

/// Closed date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Day,
    pub end: Day,
}

impl DateRange {
    pub fn new(start: Day, end: Day) -> Self {
        debug_assert!(start <= end, "DateRange start must not be after end");
        Self { start, end }
    }

    /// `None` when `start > end`.
    pub fn checked(start: Day, end: Day) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(day: Day) -> Self {
        Self { start: day, end: day }
    }

    /// Number of days in the range, both ends included.
    pub fn len_days(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_days() + 1
    }

    pub fn contains(&self, day: Day) -> bool {
        self.start <= day && day <= self.end
    }

    /// Closed ranges: sharing a single day counts as overlapping.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Smallest range covering both.
    pub fn hull(&self, other: &DateRange) -> DateRange {
        DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        DateRange::checked(self.start.max(other.start), self.end.min(other.end))
    }

    pub fn days(&self) -> impl Iterator<Item = Day> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Full-time-equivalent fraction in fixed point, `Rate::SCALE` units per 1.0.
///
/// Integer units keep sums exact, so a total recomputed over a sub-range
/// always matches the same total computed from scratch. The precision is
/// 1/10000: anything below 0.00005 rounds to zero and is then rejected as
/// a non-positive rate. Arithmetic saturates at the `i64` bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Rate(i64);

impl Rate {
    pub const SCALE: i64 = 10_000;
    pub const ZERO: Rate = Rate(0);
    pub const FULL: Rate = Rate(Self::SCALE);

    pub const fn from_units(units: i64) -> Self {
        Rate(units)
    }

    pub fn units(self) -> i64 {
        self.0
    }

    /// Rounds to the nearest 1/10000. NaN maps to zero and out-of-range
    /// values saturate.
    pub fn from_f64(value: f64) -> Self {
        Rate((value * Self::SCALE as f64).round() as i64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl From<f64> for Rate {
    fn from(value: f64) -> Self {
        Rate::from_f64(value)
    }
}

impl From<Rate> for f64 {
    fn from(rate: Rate) -> Self {
        rate.as_f64()
    }
}

impl Add for Rate {
    type Output = Rate;
    fn add(self, rhs: Rate) -> Rate {
        Rate(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Rate {
    fn add_assign(&mut self, rhs: Rate) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Rate {
    type Output = Rate;
    fn sub(self, rhs: Rate) -> Rate {
        Rate(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Rate {
    fn sum<I: Iterator<Item = Rate>>(iter: I) -> Rate {
        iter.fold(Rate::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Rate> for Rate {
    fn sum<I: Iterator<Item = &'a Rate>>(iter: I) -> Rate {
        iter.copied().sum()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_f64())
    }
}

// ── Calendar ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Public holiday: the date is non-working.
    Holiday,
    /// Working-day transfer: `is_workday` decides the date verbatim.
    Transfer,
}

/// A holiday or transfer override. `date` is `None` when the source date
/// could not be parsed; such events never affect a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub date: Option<Day>,
    pub kind: EventKind,
    pub is_workday: bool,
    pub is_global: bool,
}

impl CalendarEvent {
    pub fn holiday(date: Day) -> Self {
        Self {
            date: Some(date),
            kind: EventKind::Holiday,
            is_workday: false,
            is_global: true,
        }
    }

    pub fn transfer(date: Day, is_workday: bool) -> Self {
        Self {
            date: Some(date),
            kind: EventKind::Transfer,
            is_workday,
            is_global: true,
        }
    }
}

// ── Assignments ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Archived,
}

/// A time-bounded capacity commitment of one employee to one work scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub scope_id: Ulid,
    pub span: DateRange,
    pub rate: Rate,
    pub status: AssignmentStatus,
    pub comment: Option<String>,
}

/// Input for a create command. Dates are kept apart so a reversed range
/// can be reported instead of constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub owner_id: Ulid,
    pub scope_id: Ulid,
    pub start: Day,
    pub end: Day,
    pub rate: Rate,
    pub comment: Option<String>,
}

/// Partial update. `None` leaves the field as is; `comment: Some(None)`
/// clears the comment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub owner_id: Option<Ulid>,
    pub scope_id: Option<Ulid>,
    pub start: Option<Day>,
    pub end: Option<Day>,
    pub rate: Option<Rate>,
    pub comment: Option<Option<String>>,
}

impl AssignmentPatch {
    pub fn scope(scope_id: Ulid) -> Self {
        Self {
            scope_id: Some(scope_id),
            ..Self::default()
        }
    }

    pub fn owner(owner_id: Ulid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn dates(start: Day, end: Day) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }
}

// ── Hierarchies ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Project,
    Stage,
    Object,
    Section,
    DecompositionStage,
}

/// One node of the work hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeNode {
    pub id: Ulid,
    pub parent_id: Option<Ulid>,
    pub level: ScopeLevel,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Ulid,
    pub department_id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Ulid,
    pub team_id: Ulid,
    pub name: String,
    /// Nominal capacity; 1.0 is a full-time position.
    pub employment_rate: Rate,
    pub manager_id: Option<Ulid>,
}

// ── Filters ──────────────────────────────────────────────────────

/// The user's current selection. Equal iff every field matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterSet {
    pub project: Option<Ulid>,
    pub department: Option<Ulid>,
    pub team: Option<Ulid>,
    pub manager: Option<Ulid>,
    pub employee: Option<Ulid>,
    pub stage: Option<Ulid>,
    pub object: Option<Ulid>,
}

impl FilterSet {
    /// Fields joined in name order, so equal sets always share a key.
    pub fn fingerprint(&self) -> Fingerprint {
        let fields = [
            ("department", self.department),
            ("employee", self.employee),
            ("manager", self.manager),
            ("object", self.object),
            ("project", self.project),
            ("stage", self.stage),
            ("team", self.team),
        ];
        let key = fields
            .iter()
            .map(|(name, value)| match value {
                Some(id) => format!("{name}={id}"),
                None => format!("{name}="),
            })
            .collect::<Vec<_>>()
            .join(";");
        Fingerprint(key)
    }

    pub fn is_empty(&self) -> bool {
        *self == FilterSet::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Change notifications ─────────────────────────────────────────

/// What a committed cache write did. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    AssignmentCreated {
        id: Ulid,
        owner_id: Ulid,
        scope_id: Ulid,
        span: DateRange,
        rate: Rate,
    },
    AssignmentUpdated {
        id: Ulid,
        owner_id: Ulid,
        previous_owner_id: Ulid,
        scope_id: Ulid,
        previous_scope_id: Ulid,
        span: DateRange,
        rate: Rate,
    },
    AssignmentDeleted {
        id: Ulid,
        owner_id: Ulid,
        span: DateRange,
    },
    AssignmentArchived {
        id: Ulid,
        owner_id: Ulid,
        span: DateRange,
    },
    SnapshotReplaced {
        fingerprint: Fingerprint,
        assignments: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_basics() {
        let r = DateRange::new(d(2024, 1, 1), d(2024, 1, 7));
        assert_eq!(r.len_days(), 7);
        assert!(r.contains(d(2024, 1, 1)));
        assert!(r.contains(d(2024, 1, 7))); // closed
        assert!(!r.contains(d(2024, 1, 8)));
        assert_eq!(r.days().count(), 7);
    }

    #[test]
    fn range_overlap_is_inclusive() {
        let a = DateRange::new(d(2024, 1, 1), d(2024, 1, 5));
        let b = DateRange::new(d(2024, 1, 5), d(2024, 1, 9));
        let c = DateRange::new(d(2024, 1, 6), d(2024, 1, 9));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.intersection(&b), Some(DateRange::single(d(2024, 1, 5))));
        assert_eq!(a.intersection(&c), None);
        assert_eq!(a.hull(&c), DateRange::new(d(2024, 1, 1), d(2024, 1, 9)));
    }

    #[test]
    fn checked_rejects_reversed() {
        assert!(DateRange::checked(d(2024, 2, 2), d(2024, 2, 1)).is_none());
        assert!(DateRange::checked(d(2024, 2, 1), d(2024, 2, 1)).is_some());
    }

    #[test]
    fn rate_fixed_point() {
        assert_eq!(Rate::from_f64(0.5).units(), 5_000);
        assert_eq!(Rate::from_f64(1.0), Rate::FULL);
        assert_eq!(Rate::from_f64(0.5) + Rate::from_f64(1.0), Rate::from_f64(1.5));
        assert_eq!(Rate::from_f64(f64::NAN), Rate::ZERO);
        assert!(!Rate::from_f64(-1.0).is_positive());
        let total: Rate = [Rate::from_f64(0.25), Rate::from_f64(0.75)].iter().sum();
        assert_eq!(total, Rate::FULL);
    }

    #[test]
    fn rate_precision_and_saturation() {
        assert_eq!(Rate::from_f64(0.00004), Rate::ZERO);
        assert_eq!(Rate::from_f64(0.00005).units(), 1);
        assert_eq!(Rate::from_f64(1e300).units(), i64::MAX);

        let huge = Rate::from_f64(1e300);
        assert_eq!(huge + huge, huge);
        let mut acc = huge;
        acc += Rate::FULL;
        assert_eq!(acc, huge);
        assert_eq!(Rate::from_units(i64::MIN) - Rate::FULL, Rate::from_units(i64::MIN));
        let total: Rate = [huge, huge, Rate::FULL].iter().sum();
        assert_eq!(total, huge);
    }

    #[test]
    fn rate_serializes_as_number() {
        let json = serde_json::to_string(&Rate::from_f64(0.75)).unwrap();
        assert_eq!(json, "0.75");
        let back: Rate = serde_json::from_str("1.25").unwrap();
        assert_eq!(back, Rate::from_units(12_500));
    }

    #[test]
    fn fingerprint_deterministic() {
        let team = Ulid::new();
        let a = FilterSet {
            team: Some(team),
            ..FilterSet::default()
        };
        let b = FilterSet {
            team: Some(team),
            ..FilterSet::default()
        };
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), FilterSet::default().fingerprint());
        assert!(a.fingerprint().as_str().contains(&format!("team={team}")));
    }

    #[test]
    fn fingerprint_distinguishes_fields() {
        let id = Ulid::new();
        let by_team = FilterSet {
            team: Some(id),
            ..FilterSet::default()
        };
        let by_department = FilterSet {
            department: Some(id),
            ..FilterSet::default()
        };
        assert_ne!(by_team.fingerprint(), by_department.fingerprint());
    }

    #[test]
    fn empty_filter_set() {
        assert!(FilterSet::default().is_empty());
        let f = FilterSet {
            stage: Some(Ulid::new()),
            ..FilterSet::default()
        };
        assert!(!f.is_empty());
    }
}
