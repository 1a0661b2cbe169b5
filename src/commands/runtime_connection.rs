// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Detects the socket, connects, and builds the command Context around it.

use bulwark::config::Config;
use bulwark::context::{Context, ExecStores};
use bulwark::error::Result;
use bulwark::output::Output;
use bulwark::runtime::{BollardRuntime, RuntimeError, detect_local};
use std::sync::Arc;

/// Connect to the container runtime on this host.
///
/// This handles the common pattern of:
/// 1. Detecting the runtime type and socket path
/// 2. Outputting progress messages
/// 3. Wiring stores and services onto the connection
pub async fn connect(config: Config, output: &Output) -> Result<Context> {
    output.progress("  → Detecting runtime...");
    let info = detect_local(&config.runtime).map_err(RuntimeError::from)?;

    output.progress(&format!("  → Found {}", info));

    let runtime = Arc::new(BollardRuntime::connect(&info, config.runtime.api_timeout).await?);
    Context::new(config, runtime.clone(), &ExecStores::new(runtime))
}
