// ABOUTME: Status command implementation.
// ABOUTME: Shows the last update run, the lock holder, the newest bundle, and component health.

use super::runtime_connection::connect;
use bulwark::config::Config;
use bulwark::error::Result;
use bulwark::lock::{ExecutionLock, LockInfo};
use bulwark::output::Output;
use bulwark::runtime::ComponentHealth;
use bulwark::snapshot::SnapshotCatalog;
use bulwark::types::{BundleId, ComponentName};
use bulwark::update::{RunStore, UpdateRun};
use serde::Serialize;

#[derive(Serialize)]
struct Status {
    project: ComponentName,
    lock: Option<LockInfo>,
    last_run: Option<UpdateRun>,
    bundles: usize,
    latest_bundle: Option<BundleId>,
    /// Absent when the runtime could not be reached.
    health: Option<Vec<(ComponentName, ComponentHealth)>>,
}

pub async fn status(config: Config, output: Output) -> Result<()> {
    let lock = ExecutionLock::new(config.lock_path()).holder()?;
    let last_run = RunStore::new(config.runs_dir()).latest()?;
    let bundles = SnapshotCatalog::new(&config.catalog.dir).list()?;
    let project = config.project.clone();

    let health = match connect(config, &output).await {
        Ok(ctx) => Some(ctx.health().report(&ctx.components()).await),
        Err(e) => {
            output.warning(&format!("component health unavailable: {}", e));
            None
        }
    };

    let status = Status {
        project,
        lock,
        last_run,
        latest_bundle: bundles.first().cloned(),
        bundles: bundles.len(),
        health,
    };
    output.data(&status, &render(&status));
    Ok(())
}

fn render(status: &Status) -> String {
    let mut lines = vec![format!("Project: {}", status.project)];

    lines.push(match &status.lock {
        Some(lock) => format!(
            "Lock: held by {} (pid {}) for {} since {}",
            lock.holder, lock.pid, lock.operation, lock.created_at
        ),
        None => "Lock: free".to_string(),
    });

    lines.push(match &status.last_run {
        Some(run) => format!("Last update: {} at {} ({})", run.id, run.started_at, run.summary()),
        None => "Last update: never".to_string(),
    });

    lines.push(match &status.latest_bundle {
        Some(id) => format!("Bundles: {} (latest {})", status.bundles, id),
        None => "Bundles: none".to_string(),
    });

    if let Some(health) = &status.health {
        for (component, state) in health {
            lines.push(format!("  {:<20} {}", component, state));
        }
    }
    lines.join("\n")
}
