// ABOUTME: Errors reaching the container engine, in snafu style.
// ABOUTME: Separates "no engine on this host" from "engine present but not answering".

use snafu::Snafu;
use std::path::PathBuf;

use super::detection::DetectionError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("no usable container engine: {source}"))]
    Detection { source: DetectionError },

    #[snafu(display("cannot open engine socket {}: {source}", socket.display()))]
    Connect {
        socket: PathBuf,
        source: bollard::errors::Error,
    },

    #[snafu(display("engine at {} did not answer: {source}", socket.display()))]
    Unresponsive {
        socket: PathBuf,
        source: bollard::errors::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    /// Nothing listening where an engine was expected.
    NoRuntimeFound,
    /// A socket exists but the engine behind it failed.
    ConnectionFailed,
}

impl RuntimeError {
    pub fn kind(&self) -> RuntimeErrorKind {
        match self {
            RuntimeError::Detection { .. } => RuntimeErrorKind::NoRuntimeFound,
            RuntimeError::Connect { .. } | RuntimeError::Unresponsive { .. } => {
                RuntimeErrorKind::ConnectionFailed
            }
        }
    }
}

impl From<DetectionError> for RuntimeError {
    fn from(source: DetectionError) -> Self {
        RuntimeError::Detection { source }
    }
}
