// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global output flags.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(about = "Backups, restores and self-healing updates for stateful container deployments")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (default: discover bulwark.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results and problems
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit JSON lines instead of human output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter bulwark.yml in the current directory
    Init {
        /// Project name written into the template
        #[arg(long)]
        project: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Capture a bundle from the configured data sources
    Capture {
        /// Bundle name; the timestamp is appended
        #[arg(short, long, default_value = "manual")]
        name: String,

        /// Only capture these sources (repeatable)
        #[arg(long = "only", value_name = "SOURCE")]
        only: Vec<String>,
    },

    /// Restore a bundle into the live data stores
    Restore(RestoreArgs),

    /// List bundles in the catalog, newest first
    List,

    /// Delete bundles older than the retention period
    Prune {
        /// Override the configured retention in days
        #[arg(long)]
        retention_days: Option<u32>,

        /// Only prune bundles with this name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Check component health, available updates, or a bundle's integrity
    Check {
        /// Report components with a newer image available
        #[arg(long)]
        updates: bool,

        /// Validate a bundle and verify its checksums
        #[arg(long, value_name = "BUNDLE", conflicts_with = "updates")]
        bundle: Option<String>,
    },

    /// Update components with a safety backup and automatic rollback
    Apply {
        /// Recreate components even when no newer version is available
        #[arg(short, long)]
        force: bool,
    },

    /// Show the last update run, lock holder, bundles and component health
    Status,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Bundle to restore (default: the newest bundle)
    pub bundle: Option<String>,

    /// Skip filesystem archives
    #[arg(long)]
    pub skip_data: bool,

    /// Skip relational database dumps
    #[arg(long)]
    pub skip_db: bool,

    /// Skip key-value store snapshots
    #[arg(long)]
    pub skip_kv: bool,

    /// Skip configuration copies
    #[arg(long)]
    pub skip_config: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub force: bool,
}
