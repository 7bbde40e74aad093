use ulid::Ulid;

use crate::model::{Day, Rate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    NotFound(Ulid),
    InvalidRange { start: Day, end: Day },
    NonPositiveRate(Rate),
    UnknownOwner(Ulid),
    UnknownScope(Ulid),
    LimitExceeded(&'static str),
    /// The command service refused the mutation; local state is untouched.
    CommandRejected(String),
    /// The command service confirmed a create without returning an id.
    MissingId,
}

impl PlanError {
    /// Validation failures are detected locally, before any service call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PlanError::InvalidRange { .. }
                | PlanError::NonPositiveRate(_)
                | PlanError::UnknownOwner(_)
                | PlanError::UnknownScope(_)
                | PlanError::LimitExceeded(_)
        )
    }
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::NotFound(id) => write!(f, "not found: {id}"),
            PlanError::InvalidRange { start, end } => {
                write!(f, "invalid date range: start {start} is after end {end}")
            }
            PlanError::NonPositiveRate(rate) => write!(f, "rate must be positive, got {rate}"),
            PlanError::UnknownOwner(id) => write!(f, "unknown employee: {id}"),
            PlanError::UnknownScope(id) => write!(f, "unknown work scope: {id}"),
            PlanError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            PlanError::CommandRejected(msg) => write!(f, "command rejected: {msg}"),
            PlanError::MissingId => write!(f, "command service returned no id for created assignment"),
        }
    }
}

impl std::error::Error for PlanError {}
