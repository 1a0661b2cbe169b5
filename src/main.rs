// ABOUTME: Entry point for the bulwark CLI application.
// ABOUTME: Sets up logging and cancellation, dispatches commands, and maps errors to exit codes.

mod cli;
mod commands;

use bulwark::config::{self, Config};
use bulwark::error::Result;
use bulwark::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    if let Err(e) = run(cli, mode, &cancel).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, mode: OutputMode, cancel: &CancellationToken) -> Result<()> {
    let output = Output::new(mode);

    if let Commands::Init { project, force } = &cli.command {
        let cwd = env::current_dir()?;
        config::init_config(&cwd, project.as_deref(), *force)?;
        output.success(&format!("Created {}", config::CONFIG_FILENAME));
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover(&env::current_dir()?)?,
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Capture { name, only } => commands::capture(config, output, &name, &only, cancel).await,
        Commands::Restore(args) => commands::restore(config, output, args, cancel).await,
        Commands::List => commands::list(config, output),
        Commands::Prune {
            retention_days,
            name,
        } => commands::prune(config, output, retention_days, name.as_deref()),
        Commands::Check { updates, bundle } => {
            commands::check(config, output, updates, bundle.as_deref()).await
        }
        Commands::Apply { force } => commands::apply(config, output, force, cancel).await,
        Commands::Status => commands::status(config, output).await,
    }
}

/// Cancel in-flight work on SIGINT or SIGTERM. A second signal exits immediately.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("interrupted, cancelling current operation");
        cancel.cancel();
        wait_for_signal().await;
        std::process::exit(130);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
