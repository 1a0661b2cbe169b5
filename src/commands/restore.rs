// ABOUTME: Restore command implementation.
// ABOUTME: Resolves and validates the bundle, asks for confirmation, then restores under the execution lock.

use super::runtime_connection::connect;
use crate::cli::RestoreArgs;
use bulwark::config::Config;
use bulwark::error::{Error, Result};
use bulwark::output::Output;
use bulwark::restore::{RestoreError, RestoreOptions};
use bulwark::snapshot::{Bundle, SnapshotCatalog, Validation};
use bulwark::types::BundleId;
use std::io::{BufRead, Write};
use tokio_util::sync::CancellationToken;

pub async fn restore(
    config: Config,
    mut output: Output,
    args: RestoreArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let catalog = SnapshotCatalog::new(&config.catalog.dir);
    let id = match &args.bundle {
        Some(raw) => BundleId::parse(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        None => catalog
            .latest(None)?
            .ok_or_else(|| Error::NoBundles(catalog.dir().to_path_buf()))?,
    };

    // Ask before touching the runtime; the answer is read on a blocking thread.
    if !args.force {
        if let Validation::Invalid(reasons) = catalog.validate(&id) {
            return Err(Error::BundleInvalid {
                id: id.to_string(),
                reasons: reasons.join("; "),
            });
        }
        let bundle = catalog.load(&id)?;
        let confirmed = tokio::task::spawn_blocking(move || ask(&bundle))
            .await
            .unwrap_or(false);
        if !confirmed {
            return Err(RestoreError::NotConfirmed(id).into());
        }
    }

    // Confirmed above or forced
    let options = RestoreOptions {
        skip_data: args.skip_data,
        skip_db: args.skip_db,
        skip_kv: args.skip_kv,
        skip_config: args.skip_config,
        force: true,
    };

    output.start_timer();
    let ctx = connect(config, &output).await?;
    let _guard = ctx.lock().acquire("restore")?;

    output.progress(&format!("  → Restoring {}...", id));
    let result = ctx
        .restore_executor()
        .restore(&id, options, None, cancel)
        .await?;

    if !result.skipped.is_empty() {
        let skipped: Vec<&str> = result.skipped.iter().map(|c| c.as_str()).collect();
        output.progress(&format!("  → Skipped {}", skipped.join(", ")));
    }
    output.success(&format!(
        "Restored {} ({} artifacts)",
        result.bundle,
        result.restored.len()
    ));
    Ok(())
}

/// Ask on the terminal before live data is replaced.
fn ask(bundle: &Bundle) -> bool {
    let sources: Vec<&str> = bundle.artifacts().iter().map(|a| a.source.as_str()).collect();
    eprint!(
        "Restore {} (created {}) over live data for {}? [y/N] ",
        bundle.id(),
        bundle.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        sources.join(", ")
    );
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
