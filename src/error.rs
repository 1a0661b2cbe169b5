// ABOUTME: Application-wide error types for bulwark.
// ABOUTME: Uses thiserror for ergonomic error handling and maps errors to exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::lock::LockError;
use crate::restore::RestoreError;
use crate::runtime::RuntimeError;
use crate::snapshot::SnapshotError;
use crate::update::UpdateError;

/// Process exit code for a successful command.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit code for an operational failure.
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code for a usage or configuration error.
pub const EXIT_USAGE: i32 = 2;
/// Process exit code when a required dependency (container runtime) is missing.
pub const EXIT_MISSING_DEPENDENCY: i32 = 3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("components not healthy: {0}")]
    NotHealthy(String),

    #[error("no bundles in catalog {0}")]
    NoBundles(PathBuf),

    #[error("bundle {id} is partial: {failures}")]
    PartialBundle { id: String, failures: String },

    #[error("bundle {id} failed verification: {reasons}")]
    BundleInvalid { id: String, reasons: String },

    #[error("update run ended in {phase}: {summary}")]
    RunNotCommitted { phase: String, summary: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Exit code reported to the calling shell for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AlreadyExists(_)
            | Error::ConfigNotFound(_)
            | Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::Yaml(_) => EXIT_USAGE,
            // Every runtime error means the engine could not be reached
            Error::Runtime(_) => EXIT_MISSING_DEPENDENCY,
            _ => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
