use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};
use ulid::Ulid;

use crate::cache::{Cache, PlanError};
use crate::model::*;
use crate::observability::{command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS};

/// A single-assignment mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create(NewAssignment),
    Update { id: Ulid, patch: AssignmentPatch },
    Delete { id: Ulid },
    Archive { id: Ulid },
}

/// What the command service answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub id: Option<Ulid>,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok(id: Option<Ulid>) -> Self {
        Self {
            success: true,
            id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

/// The external service that owns the persistent assignment records.
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn execute(&self, command: &Command) -> CommandOutcome;
}

/// Result of a confirmed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReceipt {
    pub id: Ulid,
    /// False when the cache already reflected the command.
    pub applied: bool,
    /// The assignment after create/update, or the removed one.
    pub assignment: Option<Assignment>,
}

/// Routes mutations through the command service and applies them to the
/// cache only once the service confirms.
pub struct CommandGateway {
    cache: Arc<Cache>,
    service: Arc<dyn CommandService>,
}

impl CommandGateway {
    pub fn new(cache: Arc<Cache>, service: Arc<dyn CommandService>) -> Self {
        Self { cache, service }
    }

    pub async fn mutate(&self, command: Command) -> Result<MutationReceipt, PlanError> {
        let label = command_label(&command);

        // Reject locally before anything leaves the process.
        let snapshot = self.cache.snapshot().await;
        let checked = match &command {
            Command::Create(input) => snapshot.validate_new(input).map(|_| ()),
            Command::Update { id, patch } => snapshot.validate_patch(id, patch).map(|_| ()),
            Command::Delete { .. } | Command::Archive { .. } => Ok(()),
        };
        drop(snapshot);
        if let Err(e) = checked {
            metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "invalid").increment(1);
            return Err(e);
        }

        let started = Instant::now();
        let outcome = self.service.execute(&command).await;
        metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());

        if !outcome.success {
            let msg = outcome.error.unwrap_or_else(|| "unknown error".into());
            metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "rejected").increment(1);
            warn!(command = label, "command rejected: {msg}");
            return Err(PlanError::CommandRejected(msg));
        }
        metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => "ok").increment(1);

        let applied = match command {
            Command::Create(input) => {
                let id = outcome.id.ok_or(PlanError::MissingId)?;
                self.cache.create(id, input).await.map(|a| (id, a))
            }
            Command::Update { id, patch } => self.cache.update(id, patch).await.map(|a| (id, a)),
            Command::Delete { id } => self.cache.delete(id).await.map(|a| (id, a)),
            Command::Archive { id } => self.cache.archive(id).await.map(|a| (id, a)),
        };

        match applied {
            Ok((id, assignment)) => {
                info!(command = label, %id, applied = assignment.is_some(), "command confirmed");
                Ok(MutationReceipt {
                    id,
                    applied: assignment.is_some(),
                    assignment,
                })
            }
            Err(e) => {
                // The service accepted it; the next fetch brings the cache in line.
                warn!(command = label, "confirmed command not applied locally: {e}");
                Err(e)
            }
        }
    }
}
