// ABOUTME: Capture command implementation.
// ABOUTME: Takes the execution lock and writes one bundle from the configured sources.

use super::parse_name;
use super::runtime_connection::connect;
use bulwark::config::Config;
use bulwark::diagnostics::{Diagnostics, Warning};
use bulwark::error::{Error, Result};
use bulwark::notify::Event;
use bulwark::output::Output;
use bulwark::types::ComponentName;
use tokio_util::sync::CancellationToken;

pub async fn capture(
    config: Config,
    mut output: Output,
    name: &str,
    only: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    let name = parse_name(name)?;
    let filter = only
        .iter()
        .map(|s| parse_name(s))
        .collect::<Result<Vec<ComponentName>>>()?;

    output.start_timer();
    let mut diag = Diagnostics::default();
    let ctx = connect(config, &output).await?;
    let _guard = ctx.lock().acquire("capture")?;

    output.progress(&format!("  → Capturing bundle {}...", name));
    let filter = (!filter.is_empty()).then_some(filter.as_slice());
    let report = ctx.capture().capture(&name, filter, cancel).await?;

    if !report.is_complete() {
        let failures = report.failures().join("; ");
        diag.warn(Warning::partial_bundle(format!(
            "bundle {} is partial: {}",
            report.id, failures
        )));

        let sent = ctx
            .notifier()?
            .notify(&Event::warning(
                format!("[{}] partial backup", ctx.config().project),
                format!("{}: {}", report.id, failures),
            ))
            .await;
        diag.notifications(&sent);

        for warning in diag.warnings() {
            output.warning(&warning.message);
        }
        return Err(Error::PartialBundle {
            id: report.id.to_string(),
            failures,
        });
    }

    let size: u64 = report.artifacts.iter().map(|a| a.size).sum();
    output.data(
        &serde_json::json!({
            "bundle": report.id,
            "status": report.status,
            "size": size,
            "artifacts": report.artifacts,
        }),
        "",
    );
    output.success(&format!(
        "Captured {} ({} artifacts, {} bytes)",
        report.id,
        report.artifacts.len(),
        size
    ));
    Ok(())
}
