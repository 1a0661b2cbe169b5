// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Drives component containers and runs store commands via the Docker-compatible API.

use crate::runtime::error::{ConnectSnafu, RuntimeError, UnresponsiveSnafu};
use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    ComponentHealth, ExecConfig, ExecError, ExecOps, ExecResult, ServiceError, ServiceOps,
};
use crate::runtime::types::{RuntimeInfo, RuntimeType};
use crate::types::{ComponentName, ContainerId, ImageId};
use async_trait::async_trait;
use bollard::Docker;
use snafu::ResultExt;
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerStateStatusEnum, EndpointSettings,
    HealthStatusEnum, NetworkingConfig,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_service_error(e: bollard::errors::Error, service: &ComponentName) -> ServiceError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ServiceError::NotFound(service.to_string())
        }
        _ => ServiceError::Runtime(format!("{}: {}", service, e)),
    }
}

fn map_stop_error(e: bollard::errors::Error, service: &ComponentName) -> Option<ServiceError> {
    match &e {
        // Already stopped
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 304 =>
        {
            None
        }
        _ => Some(map_service_error(e, service)),
    }
}

fn map_start_error(e: bollard::errors::Error, service: &ComponentName) -> Option<ServiceError> {
    match &e {
        // Already running
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 304 =>
        {
            None
        }
        _ => Some(map_service_error(e, service)),
    }
}

fn map_exec_create_error(e: bollard::errors::Error) -> ExecError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ExecError::ContainerNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ExecError::ContainerNotRunning(message.clone()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

fn map_exec_not_found_error(e: bollard::errors::Error) -> ExecError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ExecError::ExecNotFound(message.clone()),
        _ => ExecError::Runtime(e.to_string()),
    }
}

/// Derive component health from a container inspection.
///
/// Containers with a healthcheck report its status; containers without one
/// are healthy while running.
fn health_from_inspect(details: &ContainerInspectResponse) -> ComponentHealth {
    let Some(state) = details.state.as_ref() else {
        return ComponentHealth::Unknown;
    };

    if let Some(status) = state.health.as_ref().and_then(|h| h.status) {
        match status {
            HealthStatusEnum::HEALTHY => return ComponentHealth::Healthy,
            HealthStatusEnum::UNHEALTHY => return ComponentHealth::Unhealthy,
            HealthStatusEnum::STARTING => return ComponentHealth::Starting,
            // No healthcheck configured: fall through to the run state.
            _ => {}
        }
    }

    match state.status {
        Some(ContainerStateStatusEnum::RUNNING) => ComponentHealth::Healthy,
        Some(ContainerStateStatusEnum::CREATED) | Some(ContainerStateStatusEnum::RESTARTING) => {
            ComponentHealth::Starting
        }
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            ComponentHealth::Unhealthy
        }
        _ => ComponentHealth::Unknown,
    }
}

/// Build a creation body that reproduces an inspected container on another image.
fn recreate_body(details: &ContainerInspectResponse, version: &ImageId) -> ContainerCreateBody {
    let config = details.config.clone().unwrap_or_default();

    // Keep network membership and aliases (compose service discovery), drop
    // runtime-assigned endpoint state.
    let endpoints: Option<HashMap<String, EndpointSettings>> = details
        .network_settings
        .as_ref()
        .and_then(|s| s.networks.as_ref())
        .map(|networks| {
            networks
                .iter()
                .map(|(name, endpoint)| {
                    (
                        name.clone(),
                        EndpointSettings {
                            aliases: endpoint.aliases.clone(),
                            ..Default::default()
                        },
                    )
                })
                .collect()
        });

    ContainerCreateBody {
        image: Some(version.to_string()),
        env: config.env,
        labels: config.labels,
        cmd: config.cmd,
        entrypoint: config.entrypoint,
        working_dir: config.working_dir,
        user: config.user,
        healthcheck: config.healthcheck,
        stop_timeout: config.stop_timeout,
        host_config: details.host_config.clone(),
        networking_config: endpoints.map(|endpoints_config| NetworkingConfig {
            endpoints_config: Some(endpoints_config),
        }),
        ..Default::default()
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
///
/// Supports both Docker and Podman via the Docker-compatible API. Each
/// component maps to the container with the same name.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to the engine found by [`detect_local`](super::detect_local)
    /// and make sure it answers.
    pub async fn connect(info: &RuntimeInfo, api_timeout: Duration) -> Result<Self, RuntimeError> {
        let socket = info.socket.to_string_lossy();
        let client = Docker::connect_with_unix(
            &socket,
            api_timeout.as_secs().max(1),
            bollard::API_DEFAULT_VERSION,
        )
        .context(ConnectSnafu {
            socket: info.socket.clone(),
        })?;

        client.ping().await.context(UnresponsiveSnafu {
            socket: info.socket.clone(),
        })?;

        Ok(Self::new(client, info.runtime_type))
    }

    /// Get the runtime type (Docker or Podman).
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }

    async fn inspect(
        &self,
        service: &ComponentName,
    ) -> Result<ContainerInspectResponse, ServiceError> {
        self.client
            .inspect_container(service.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_service_error(e, service))
    }

    async fn stop_one(&self, service: &ComponentName, timeout: Duration) -> Result<(), ServiceError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs().min(i32::MAX as u64) as i32),
            signal: None,
        };

        match self.client.stop_container(service.as_str(), Some(opts)).await {
            Ok(()) => Ok(()),
            Err(e) => map_stop_error(e, service).map_or(Ok(()), Err),
        }
    }

    async fn start_one(&self, service: &ComponentName) -> Result<(), ServiceError> {
        match self
            .client
            .start_container(
                service.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => map_start_error(e, service).map_or(Ok(()), Err),
        }
    }

    async fn exec_inspect_exit_code(&self, exec_id: &str) -> Result<i64, ExecError> {
        let details = self
            .client
            .inspect_exec(exec_id)
            .await
            .map_err(map_exec_not_found_error)?;

        if details.running.unwrap_or(false) {
            return Err(ExecError::Failed(format!(
                "exec {} still running after output closed",
                exec_id
            )));
        }

        Ok(details.exit_code.unwrap_or(0))
    }
}

// Implement Sealed trait to allow runtime trait implementations
impl Sealed for BollardRuntime {}

#[async_trait]
impl ServiceOps for BollardRuntime {
    async fn stop(
        &self,
        services: &[ComponentName],
        timeout: Duration,
    ) -> Result<(), ServiceError> {
        let results =
            futures::future::join_all(services.iter().map(|s| self.stop_one(s, timeout))).await;
        results.into_iter().collect()
    }

    async fn start(&self, services: &[ComponentName]) -> Result<(), ServiceError> {
        for service in services {
            self.start_one(service).await?;
        }
        Ok(())
    }

    async fn current_version(&self, service: &ComponentName) -> Result<ImageId, ServiceError> {
        let details = self.inspect(service).await?;
        details
            .image
            .map(ImageId::new)
            .ok_or_else(|| ServiceError::InvalidConfig {
                service: service.to_string(),
                message: "container reports no image".to_string(),
            })
    }

    async fn pull_latest(&self, service: &ComponentName) -> Result<ImageId, ServiceError> {
        let details = self.inspect(service).await?;
        let reference = details
            .config
            .and_then(|c| c.image)
            .ok_or_else(|| ServiceError::InvalidConfig {
                service: service.to_string(),
                message: "container has no image reference".to_string(),
            })?;

        let opts = CreateImageOptions {
            from_image: Some(reference.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| ServiceError::PullFailed {
                service: service.to_string(),
                message: format!("{}: {}", reference, e),
            })?;
        }

        let image = self
            .client
            .inspect_image(&reference)
            .await
            .map_err(|e| ServiceError::PullFailed {
                service: service.to_string(),
                message: format!("failed to inspect {}: {}", reference, e),
            })?;

        image
            .id
            .map(ImageId::new)
            .ok_or_else(|| ServiceError::PullFailed {
                service: service.to_string(),
                message: format!("{} has no image id", reference),
            })
    }

    async fn recreate(
        &self,
        service: &ComponentName,
        version: &ImageId,
    ) -> Result<(), ServiceError> {
        let details = self.inspect(service).await?;
        let body = recreate_body(&details, version);
        let stop_timeout = details
            .config
            .as_ref()
            .and_then(|c| c.stop_timeout)
            .map(|t| Duration::from_secs(t.max(0) as u64))
            .unwrap_or(Duration::from_secs(10));

        self.stop_one(service, stop_timeout).await?;

        let opts = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.client
            .remove_container(service.as_str(), Some(opts))
            .await
            .map_err(|e| map_service_error(e, service))?;

        let opts = CreateContainerOptions {
            name: Some(service.to_string()),
            ..Default::default()
        };
        self.client
            .create_container(Some(opts), body)
            .await
            .map_err(|e| ServiceError::InvalidConfig {
                service: service.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(%service, %version, "recreated container");
        self.start_one(service).await
    }

    async fn health(&self, service: &ComponentName) -> Result<ComponentHealth, ServiceError> {
        match self.inspect(service).await {
            Ok(details) => Ok(health_from_inspect(&details)),
            Err(ServiceError::NotFound(_)) => Ok(ComponentHealth::Unknown),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ExecOps for BollardRuntime {
    async fn exec(
        &self,
        container: &ContainerId,
        config: &ExecConfig,
        stdin: Option<Bytes>,
    ) -> Result<ExecResult, ExecError> {
        let opts = bollard::models::ExecConfig {
            cmd: Some(config.cmd.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            user: config.user.clone(),
            attach_stdin: Some(stdin.is_some()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let response = self
            .client
            .create_exec(container.as_str(), opts)
            .await
            .map_err(map_exec_create_error)?;
        let exec_id = response.id;

        let opts = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let result = self
            .client
            .start_exec(&exec_id, Some(opts))
            .await
            .map_err(map_exec_not_found_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached { mut output, input } = result {
            // Feed stdin concurrently so a chatty command cannot stall on a full pipe.
            let writer = stdin.map(|data| {
                let mut input = input;
                tokio::spawn(async move {
                    input.write_all(&data).await?;
                    input.shutdown().await
                })
            });

            while let Some(item) = output.next().await {
                match item {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.extend(message);
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.extend(message);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(ExecError::Failed(e.to_string()));
                    }
                }
            }

            if let Some(writer) = writer {
                writer
                    .await
                    .map_err(|e| ExecError::Failed(format!("stdin writer panicked: {}", e)))?
                    .map_err(|e| ExecError::Failed(format!("failed to write stdin: {}", e)))?;
            }
        }

        let exit_code = self.exec_inspect_exit_code(&exec_id).await?;

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerState, Health};

    fn inspect_with(
        status: Option<ContainerStateStatusEnum>,
        health: Option<HealthStatusEnum>,
    ) -> ContainerInspectResponse {
        ContainerInspectResponse {
            state: Some(ContainerState {
                status,
                health: health.map(|h| Health {
                    status: Some(h),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn healthcheck_status_wins_over_run_state() {
        let details = inspect_with(
            Some(ContainerStateStatusEnum::RUNNING),
            Some(HealthStatusEnum::STARTING),
        );
        assert_eq!(health_from_inspect(&details), ComponentHealth::Starting);

        let details = inspect_with(
            Some(ContainerStateStatusEnum::RUNNING),
            Some(HealthStatusEnum::UNHEALTHY),
        );
        assert_eq!(health_from_inspect(&details), ComponentHealth::Unhealthy);
    }

    #[test]
    fn running_without_healthcheck_is_healthy() {
        let details = inspect_with(Some(ContainerStateStatusEnum::RUNNING), None);
        assert_eq!(health_from_inspect(&details), ComponentHealth::Healthy);
    }

    #[test]
    fn exited_container_is_unhealthy() {
        let details = inspect_with(Some(ContainerStateStatusEnum::EXITED), None);
        assert_eq!(health_from_inspect(&details), ComponentHealth::Unhealthy);
    }

    #[test]
    fn missing_state_is_unknown() {
        let details = ContainerInspectResponse::default();
        assert_eq!(health_from_inspect(&details), ComponentHealth::Unknown);
    }

    #[test]
    fn recreate_body_pins_version() {
        let details = inspect_with(Some(ContainerStateStatusEnum::RUNNING), None);
        let body = recreate_body(&details, &ImageId::new("sha256:abc"));
        assert_eq!(body.image.as_deref(), Some("sha256:abc"));
        assert!(body.networking_config.is_none());
    }
}
