// ABOUTME: Container lifecycle collaborator used by updates, restores and health probes.
// ABOUTME: Stop, start, version lookup, image pulls, recreation and health queries.

use crate::types::{ComponentName, ImageId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle operations on the deployment's running components.
///
/// Components are addressed by name; the runtime decides how a name maps to
/// a container.
#[async_trait]
pub trait ServiceOps: Send + Sync {
    /// Gracefully stop the given services, killing them after `timeout`.
    async fn stop(&self, services: &[ComponentName], timeout: Duration)
    -> Result<(), ServiceError>;

    /// Start the given services.
    async fn start(&self, services: &[ComponentName]) -> Result<(), ServiceError>;

    /// Version identifier of the image the service currently runs.
    async fn current_version(&self, service: &ComponentName) -> Result<ImageId, ServiceError>;

    /// Pull the newest image for the service's reference and return its version.
    async fn pull_latest(&self, service: &ComponentName) -> Result<ImageId, ServiceError>;

    /// Replace the service's container with one running `version`.
    async fn recreate(&self, service: &ComponentName, version: &ImageId)
    -> Result<(), ServiceError>;

    /// Current readiness of the service.
    async fn health(&self, service: &ComponentName) -> Result<ComponentHealth, ServiceError>;
}

/// Readiness reported by a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentHealth {
    Healthy,
    Unhealthy,
    Starting,
    Unknown,
}

impl fmt::Display for ComponentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentHealth::Healthy => "healthy",
            ComponentHealth::Unhealthy => "unhealthy",
            ComponentHealth::Starting => "starting",
            ComponentHealth::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Errors from lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("failed to pull image for {service}: {message}")]
    PullFailed { service: String, message: String },

    #[error("invalid container configuration for {service}: {message}")]
    InvalidConfig { service: String, message: String },

    #[error("runtime error: {0}")]
    Runtime(String),
}
