// ABOUTME: Apply command implementation.
// ABOUTME: Runs one update through the orchestrator and maps the terminal phase to an exit code.

use super::runtime_connection::connect;
use bulwark::config::Config;
use bulwark::error::{Error, Result};
use bulwark::output::Output;
use tokio_util::sync::CancellationToken;

pub async fn apply(config: Config, mut output: Output, force: bool, cancel: &CancellationToken) -> Result<()> {
    output.start_timer();
    let ctx = connect(config, &output).await?;

    output.progress("  → Checking for updates...");
    let run = ctx.orchestrator()?.run(force, cancel).await?;

    for change in &run.changes {
        output.progress(&format!(
            "  → {}: {} -> {}",
            change.component, change.from, change.to
        ));
    }
    output.data(&run, "");

    if run.phase.is_success() {
        output.success(&run.summary());
        Ok(())
    } else {
        Err(Error::RunNotCommitted {
            phase: run.phase.to_string(),
            summary: run.summary(),
        })
    }
}
