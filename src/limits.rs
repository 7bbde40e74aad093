/// Longest assignment accepted, in days (ten years).
pub const MAX_ASSIGNMENT_DAYS: i64 = 3_660;

/// Longest window a totals or layout query may cover, in days.
pub const MAX_QUERY_DAYS: i64 = 3_660;

pub const MAX_COMMENT_LEN: usize = 4_096;

pub const MAX_ASSIGNMENTS_PER_OWNER: usize = 10_000;

/// Rows accepted from a single fetch.
pub const MAX_ROWS_PER_FETCH: usize = 1_000_000;

/// Upper bound on a single assignment's rate (conventionally ≤ 2.0).
pub const MAX_RATE_UNITS: i64 = 100_000;

/// Upper bound on an employee's employment rate; larger values are clamped.
pub const MAX_EMPLOYMENT_RATE_UNITS: i64 = 20_000;
