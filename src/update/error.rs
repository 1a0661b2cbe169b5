// ABOUTME: Error types for update runs.
// ABOUTME: Failures inside a run end in the Failed phase; these are the ones that stop a run from being recorded at all.

use super::Phase;
use crate::lock::LockError;
use crate::runtime::ServiceError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("failed to check versions: {0}")]
    Check(#[from] ServiceError),

    #[error("failed to persist run record {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error categories for update failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateErrorKind {
    /// A bug: the orchestrator tried an impossible transition.
    Internal,
    /// Another operation holds the execution lock.
    LockContention,
    /// The service collaborator failed.
    Service,
    /// The run record could not be written.
    Io,
}

impl UpdateError {
    pub fn kind(&self) -> UpdateErrorKind {
        match self {
            UpdateError::IllegalTransition { .. } => UpdateErrorKind::Internal,
            UpdateError::Lock(_) => UpdateErrorKind::LockContention,
            UpdateError::Check(_) => UpdateErrorKind::Service,
            UpdateError::Persist { .. } => UpdateErrorKind::Io,
        }
    }
}
