use std::sync::Arc;

use tracing::{info, warn};

use planline::cache::{Cache, Snapshot};
use planline::config::Config;
use planline::model::{DateRange, FilterSet};
use planline::notify::NotifyHub;
use planline::packer::{lane_count, Column, IntervalPacker};
use planline::source::JsonRowsSource;
use planline::sync::{FetchOutcome, FilterSyncController};
use planline::workload::{overloaded_days, DayLoad};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let today = chrono::Local::now().date_naive();
    let config = Config::from_env(today)?;
    planline::observability::init(config.metrics_port)?;

    info!("planline loading {}", config.rows_path.display());
    info!("  window: {}", config.window);
    info!("  lane_height: {}", config.lane_height);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let cache = Arc::new(Cache::new(Arc::new(NotifyHub::new())));
    let source = Arc::new(JsonRowsSource::new(config.rows_path.clone()));
    let controller = FilterSyncController::new(cache.clone(), source);

    match controller.apply_filters(FilterSet::default()).await {
        FetchOutcome::Applied | FetchOutcome::Unchanged => {}
        FetchOutcome::Cancelled => warn!("initial fetch superseded"),
        FetchOutcome::Failed(e) => return Err(e.into()),
    }

    let snapshot = cache.snapshot().await;
    report(&snapshot, &config.window, &IntervalPacker::new(config.lane_height))?;
    Ok(())
}

fn summarize(series: &[DayLoad]) -> String {
    let working: Vec<&DayLoad> = series.iter().filter(|d| d.working).collect();
    let avg = if working.is_empty() {
        0
    } else {
        working.iter().map(|d| d.percent).sum::<i64>() / working.len() as i64
    };
    let peak = working.iter().map(|d| d.percent).max().unwrap_or(0);
    format!("avg {avg}%, peak {peak}%, overloaded days {}", overloaded_days(series).len())
}

fn report(snapshot: &Snapshot, window: &DateRange, packer: &IntervalPacker) -> Result<(), planline::cache::PlanError> {
    let columns: Vec<Column> = window.days().map(|date| Column { date, width: 1.0 }).collect();
    println!(
        "{window}: {} assignments, {} working days",
        snapshot.assignment_count(),
        snapshot.calendar().working_days(window)
    );

    for dept in snapshot.org().departments() {
        let load = snapshot.department_utilization(&dept.department.id, window)?;
        println!("{} ({})", dept.department.name, summarize(&load));
        for team in dept.teams.values() {
            let load = snapshot.team_utilization(&team.team.id, window)?;
            println!("  {} ({})", team.team.name, summarize(&load));
            for node in team.employees.values() {
                let id = node.employee.id;
                let load = snapshot.employee_utilization(&id, window)?;
                let layout = snapshot.owner_layout(&id, &columns, packer)?;
                let lanes: Vec<usize> = layout.iter().map(|g| g.lane).collect();
                println!(
                    "    {} ({}; {} bars in {} lanes)",
                    node.employee.name,
                    summarize(&load),
                    layout.len(),
                    lane_count(&lanes)
                );
            }
        }
    }
    Ok(())
}
