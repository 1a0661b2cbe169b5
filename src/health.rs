// ABOUTME: Bounded polling of component readiness.
// ABOUTME: Succeeds once every component is healthy and fails fast on the first unhealthy one.

use crate::poll::{Poller, Tick};
use crate::runtime::{ComponentHealth, ServiceOps};
use crate::types::ComponentName;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of waiting for a set of components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthOutcome {
    /// Every component reported healthy.
    Healthy,
    /// This component reported unhealthy; the wait stopped there.
    Unhealthy(ComponentName),
    /// The deadline passed with these components still starting or unknown.
    TimedOut(Vec<ComponentName>),
    /// The wait was cancelled.
    Cancelled,
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy)
    }
}

impl std::fmt::Display for HealthOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthOutcome::Healthy => write!(f, "all components healthy"),
            HealthOutcome::Unhealthy(c) => write!(f, "{} is unhealthy", c),
            HealthOutcome::TimedOut(pending) => {
                let names: Vec<&str> = pending.iter().map(|c| c.as_str()).collect();
                write!(f, "timed out waiting for {}", names.join(", "))
            }
            HealthOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Polls component health through the service collaborator.
#[derive(Clone)]
pub struct HealthProbe {
    services: Arc<dyn ServiceOps>,
}

impl HealthProbe {
    pub fn new(services: Arc<dyn ServiceOps>) -> Self {
        Self { services }
    }

    /// Poll until every component is healthy, one is unhealthy, the timeout
    /// elapses, or `cancel` fires.
    pub async fn await_healthy(
        &self,
        components: &[ComponentName],
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> HealthOutcome {
        if components.is_empty() {
            return HealthOutcome::Healthy;
        }

        let mut ticks = Poller::new(poll_interval, timeout).start();
        let mut pending: Vec<ComponentName> = components.to_vec();

        loop {
            match ticks.next(cancel).await {
                Tick::Poll => {}
                Tick::Deadline => return HealthOutcome::TimedOut(pending),
                Tick::Cancelled => return HealthOutcome::Cancelled,
            }

            let report = self.report(components).await;
            if let Some((component, _)) = report
                .iter()
                .find(|(_, h)| *h == ComponentHealth::Unhealthy)
            {
                tracing::debug!(%component, "component unhealthy");
                return HealthOutcome::Unhealthy(component.clone());
            }

            pending = report
                .into_iter()
                .filter(|(_, h)| *h != ComponentHealth::Healthy)
                .map(|(c, _)| c)
                .collect();

            if pending.is_empty() {
                return HealthOutcome::Healthy;
            }
            tracing::debug!(pending = pending.len(), "waiting for components");
        }
    }

    /// One pass, no waiting: true only if every component is healthy right now.
    pub async fn quick_check(&self, components: &[ComponentName]) -> bool {
        self.report(components)
            .await
            .iter()
            .all(|(_, h)| *h == ComponentHealth::Healthy)
    }

    /// Current health of each component, in input order.
    ///
    /// A collaborator error counts as [`ComponentHealth::Unknown`].
    pub async fn report(&self, components: &[ComponentName]) -> Vec<(ComponentName, ComponentHealth)> {
        let checks = components.iter().map(|component| async move {
            let health = match self.services.health(component).await {
                Ok(health) => health,
                Err(e) => {
                    tracing::debug!(%component, error = %e, "health query failed");
                    ComponentHealth::Unknown
                }
            };
            (component.clone(), health)
        });
        futures::future::join_all(checks).await
    }
}
