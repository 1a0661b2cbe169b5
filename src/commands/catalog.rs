// ABOUTME: Catalog commands: listing bundles and pruning old ones.
// ABOUTME: Neither needs the container runtime.

use super::parse_name;
use bulwark::config::Config;
use bulwark::error::Result;
use bulwark::lock::ExecutionLock;
use bulwark::output::Output;
use bulwark::snapshot::SnapshotCatalog;
use serde::Serialize;

#[derive(Serialize)]
struct BundleSummary {
    id: String,
    status: Option<String>,
    size: Option<u64>,
    artifacts: Option<usize>,
}

pub fn list(config: Config, output: Output) -> Result<()> {
    let catalog = SnapshotCatalog::new(&config.catalog.dir);
    let ids = catalog.list()?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let row = match catalog.load(&id) {
            Ok(bundle) => BundleSummary {
                id: id.to_string(),
                status: Some(bundle.status().to_string()),
                size: Some(bundle.size()),
                artifacts: Some(bundle.artifacts().len()),
            },
            Err(e) => {
                tracing::debug!(bundle = %id, error = %e, "unreadable bundle");
                BundleSummary {
                    id: id.to_string(),
                    status: None,
                    size: None,
                    artifacts: None,
                }
            }
        };
        rows.push(row);
    }

    let human = rows
        .iter()
        .map(|r| match (&r.status, r.size, r.artifacts) {
            (Some(status), Some(size), Some(count)) => {
                format!("{:<40} {:<9} {:>4} artifacts {:>14} bytes", r.id, status, count, size)
            }
            _ => format!("{:<40} unreadable", r.id),
        })
        .collect::<Vec<_>>()
        .join("\n");

    if rows.is_empty() {
        output.progress("No bundles");
    }
    output.data(&rows, &human);
    Ok(())
}

pub fn prune(
    config: Config,
    output: Output,
    retention_days: Option<u32>,
    name: Option<&str>,
) -> Result<()> {
    let name = name.map(parse_name).transpose()?;
    let retention = retention_days.unwrap_or(config.catalog.retention_days);

    let _guard = ExecutionLock::new(config.lock_path()).acquire("prune")?;
    let catalog = SnapshotCatalog::new(&config.catalog.dir);
    let report = catalog.prune(retention, name.as_ref())?;

    output.data(
        &serde_json::json!({ "deleted": report.deleted, "kept": report.kept }),
        "",
    );
    output.success(&format!(
        "Pruned {} bundle(s), kept {}",
        report.deleted.len(),
        report.kept.len()
    ));
    Ok(())
}
