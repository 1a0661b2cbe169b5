// ABOUTME: Which container engine bulwark talks to and how to reach it.
// ABOUTME: Holds the `runtime:` config section and the outcome of socket detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine behind the Docker-compatible API socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl RuntimeType {
    /// System-wide socket the engine listens on out of the box.
    pub fn default_socket(self) -> &'static Path {
        match self {
            RuntimeType::Docker => Path::new("/var/run/docker.sock"),
            RuntimeType::Podman => Path::new("/run/podman/podman.sock"),
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Docker => f.write_str("docker"),
            RuntimeType::Podman => f.write_str("podman"),
        }
    }
}

/// Where an engine was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub runtime_type: RuntimeType,
    pub socket: PathBuf,
}

impl fmt::Display for RuntimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.runtime_type, self.socket.display())
    }
}

/// The `runtime:` section. Anything left out is detected.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub engine: Option<RuntimeType>,

    #[serde(default)]
    pub socket: Option<PathBuf>,

    /// Bound on a single engine API request. A database dump streams
    /// through one exec call, so this must cover the largest dump.
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub api_timeout: Duration,
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            engine: None,
            socket: None,
            api_timeout: default_api_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_defaults_to_detection() {
        let config: RuntimeConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.engine.is_none());
        assert!(config.socket.is_none());
        assert_eq!(config.api_timeout, Duration::from_secs(600));
    }

    #[test]
    fn explicit_engine_and_socket() {
        let config: RuntimeConfig = serde_yaml::from_str(
            "engine: podman\nsocket: /run/user/1000/podman/podman.sock\napi_timeout: 30m\n",
        )
        .unwrap();
        assert_eq!(config.engine, Some(RuntimeType::Podman));
        assert_eq!(
            config.socket.as_deref(),
            Some(Path::new("/run/user/1000/podman/podman.sock"))
        );
        assert_eq!(config.api_timeout, Duration::from_secs(1800));
    }

    #[test]
    fn info_names_engine_and_socket() {
        let info = RuntimeInfo {
            runtime_type: RuntimeType::Docker,
            socket: RuntimeType::Docker.default_socket().to_path_buf(),
        };
        assert_eq!(info.to_string(), "docker at /var/run/docker.sock");
    }
}
