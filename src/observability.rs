use std::net::SocketAddr;

use crate::cache::PlanError;
use crate::commands::Command;

// ── Request-driven metrics ──────────────────────────────────────

/// Counter: cache mutations. Labels: kind, status.
pub const MUTATIONS_TOTAL: &str = "planline_mutations_total";

/// Counter: commands sent to the command service. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "planline_commands_total";

/// Histogram: command service round-trip in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "planline_command_duration_seconds";

/// Counter: fetches issued by the filter controller. Labels: outcome.
pub const FETCHES_TOTAL: &str = "planline_fetches_total";

/// Histogram: fetch round-trip in seconds.
pub const FETCH_DURATION_SECONDS: &str = "planline_fetch_duration_seconds";

// ── State metrics ───────────────────────────────────────────────

/// Gauge: assignments in the committed snapshot.
pub const CACHE_ASSIGNMENTS: &str = "planline_cache_assignments";

/// Gauge: generation of the most recently issued fetch.
pub const FETCH_GENERATION: &str = "planline_fetch_generation";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Create(_) => "create",
        Command::Update { .. } => "update",
        Command::Delete { .. } => "delete",
        Command::Archive { .. } => "archive",
    }
}

/// Status label for a failed mutation.
pub fn mutation_outcome(err: &PlanError) -> &'static str {
    if err.is_validation() {
        "invalid"
    } else {
        match err {
            PlanError::NotFound(_) => "not_found",
            PlanError::CommandRejected(_) | PlanError::MissingId => "rejected",
            _ => "error",
        }
    }
}
