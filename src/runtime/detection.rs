// ABOUTME: Finds the container engine socket on the local host.
// ABOUTME: Explicit config wins; otherwise Podman sockets are tried before Docker's.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container engine socket found (checked {})", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    NoRuntimeFound(Vec<PathBuf>),

    #[error("configured engine socket does not exist: {}", .0.display())]
    SocketMissing(PathBuf),
}

/// Resolve the engine socket.
///
/// A configured socket or engine must exist as given. Without either, the
/// first existing socket among rootless Podman, rootful Podman and Docker
/// is used.
pub fn detect_local(config: &RuntimeConfig) -> Result<RuntimeInfo, DetectionError> {
    let explicit = match (&config.socket, config.engine) {
        (Some(socket), engine) => Some((engine.unwrap_or(RuntimeType::Docker), socket.clone())),
        (None, Some(engine)) => Some((engine, engine.default_socket().to_path_buf())),
        (None, None) => None,
    };
    if let Some((runtime_type, socket)) = explicit {
        if !socket.exists() {
            return Err(DetectionError::SocketMissing(socket));
        }
        return Ok(RuntimeInfo {
            runtime_type,
            socket,
        });
    }

    let candidates = candidates(rootless_podman_socket());
    if let Some((runtime_type, socket)) = candidates.iter().find(|(_, socket)| socket.exists()) {
        return Ok(RuntimeInfo {
            runtime_type: *runtime_type,
            socket: socket.clone(),
        });
    }
    Err(DetectionError::NoRuntimeFound(
        candidates.into_iter().map(|(_, socket)| socket).collect(),
    ))
}

fn candidates(rootless: Option<PathBuf>) -> Vec<(RuntimeType, PathBuf)> {
    rootless
        .map(|socket| (RuntimeType::Podman, socket))
        .into_iter()
        .chain([RuntimeType::Podman, RuntimeType::Docker].map(|t| (t, t.default_socket().to_path_buf())))
        .collect()
}

/// `$XDG_RUNTIME_DIR/podman/podman.sock`, falling back to `/run/user/<uid>`.
fn rootless_podman_socket() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return Some(Path::new(&dir).join("podman/podman.sock"));
    }
    let uid = uid()?;
    Some(PathBuf::from(format!("/run/user/{}/podman/podman.sock", uid)))
}

#[cfg(unix)]
fn uid() -> Option<u32> {
    // SAFETY: getuid has no preconditions and cannot fail.
    Some(unsafe { libc::getuid() })
}

#[cfg(not(unix))]
fn uid() -> Option<u32> {
    None
}
