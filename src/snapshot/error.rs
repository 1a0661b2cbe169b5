// ABOUTME: Error types for bundle capture and catalog operations.
// ABOUTME: Each variant maps to a coarse kind so callers can decide the next step.

use crate::types::{BundleId, ComponentName};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("data source {name} is unavailable: {message}")]
    ServiceUnavailable { name: ComponentName, message: String },

    #[error("capture of {name} failed: {message}")]
    DumpFailed { name: ComponentName, message: String },

    #[error("{name} did not finish its snapshot within {timeout:?}")]
    SnapshotTimeout {
        name: ComponentName,
        timeout: Duration,
    },

    #[error("not enough free space in {}: {available} bytes available, {required} required", .path.display())]
    DiskFull {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    #[error("unknown data source: {0}")]
    UnknownSource(String),

    #[error("capture cancelled")]
    Cancelled,

    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    #[error("bundle {id} has unreadable metadata: {message}")]
    InvalidMetadata { id: BundleId, message: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error categories for snapshot failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotErrorKind {
    ServiceUnavailable,
    DumpFailed,
    SnapshotTimeout,
    DiskFull,
    Config,
    Cancelled,
    NotFound,
    Io,
}

impl SnapshotError {
    pub fn kind(&self) -> SnapshotErrorKind {
        match self {
            SnapshotError::ServiceUnavailable { .. } => SnapshotErrorKind::ServiceUnavailable,
            SnapshotError::DumpFailed { .. } => SnapshotErrorKind::DumpFailed,
            SnapshotError::SnapshotTimeout { .. } => SnapshotErrorKind::SnapshotTimeout,
            SnapshotError::DiskFull { .. } => SnapshotErrorKind::DiskFull,
            SnapshotError::UnknownSource(_) => SnapshotErrorKind::Config,
            SnapshotError::Cancelled => SnapshotErrorKind::Cancelled,
            SnapshotError::NotFound(_) | SnapshotError::InvalidMetadata { .. } => {
                SnapshotErrorKind::NotFound
            }
            SnapshotError::Io { .. } => SnapshotErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}
