// ABOUTME: Drives one unattended update: check, back up, apply, verify, then commit or roll back.
// ABOUTME: Holds the execution lock for the whole run and persists the record after every phase.

use super::run::{RunStore, UpdateRun, VersionChange};
use super::{Phase, UpdateError};
use crate::config::PRE_UPDATE_BUNDLE;
use crate::health::{HealthOutcome, HealthProbe};
use crate::lock::ExecutionLock;
use crate::notify::{Event, NotificationSink};
use crate::restore::{RestoreExecutor, RestoreOptions};
use crate::runtime::ServiceOps;
use crate::snapshot::{SnapshotCapture, SnapshotCatalog, SnapshotError};
use crate::types::{ComponentName, ImageId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CANCELLED: &str = "cancelled";

/// Availability of a newer version for one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentUpdate {
    pub component: ComponentName,
    pub current: ImageId,
    pub latest: ImageId,
}

impl ComponentUpdate {
    pub fn is_available(&self) -> bool {
        self.current != self.latest
    }
}

/// Timing and scope taken from configuration.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub project: ComponentName,
    /// Components that are replaced by an update.
    pub components: Vec<ComponentName>,
    /// Components that must be healthy before an update is committed.
    pub health_components: Vec<ComponentName>,
    pub stop_timeout: Duration,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
    /// Age after which pre-update bundles are pruned on commit.
    pub retention_days: u32,
    pub lock_path: PathBuf,
    pub runs_dir: PathBuf,
}

pub struct UpdateOrchestrator {
    services: Arc<dyn ServiceOps>,
    capture: SnapshotCapture,
    restore: RestoreExecutor,
    catalog: SnapshotCatalog,
    health: HealthProbe,
    notifier: NotificationSink,
    lock: ExecutionLock,
    runs: RunStore,
    settings: UpdateSettings,
}

impl UpdateOrchestrator {
    pub fn new(
        services: Arc<dyn ServiceOps>,
        capture: SnapshotCapture,
        restore: RestoreExecutor,
        settings: UpdateSettings,
    ) -> Self {
        Self {
            catalog: SnapshotCatalog::new(capture.catalog_dir()),
            health: HealthProbe::new(services.clone()),
            notifier: NotificationSink::disabled(),
            lock: ExecutionLock::new(&settings.lock_path),
            runs: RunStore::new(&settings.runs_dir),
            services,
            capture,
            restore,
            settings,
        }
    }

    pub fn with_notifications(mut self, notifier: NotificationSink) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    /// Compare running and latest versions without changing anything but
    /// the local image cache.
    pub async fn check_updates(&self) -> Result<Vec<ComponentUpdate>, UpdateError> {
        let mut updates = Vec::with_capacity(self.settings.components.len());
        for component in &self.settings.components {
            let current = self.services.current_version(component).await?;
            let latest = self.services.pull_latest(component).await?;
            tracing::debug!(%component, %current, %latest, "compared versions");
            updates.push(ComponentUpdate {
                component: component.clone(),
                current,
                latest,
            });
        }
        Ok(updates)
    }

    /// Run one update to a terminal phase.
    ///
    /// Returns `Err` only when the run could not start (lock contention) or
    /// the state machine was misused. Every other outcome, including a
    /// failed rollback, is a finished [`UpdateRun`].
    pub async fn run(&self, force: bool, cancel: &CancellationToken) -> Result<UpdateRun, UpdateError> {
        let _guard = self.lock.acquire("apply")?;
        let mut run = UpdateRun::new();
        tracing::info!(run = %run.id, force, "starting update run");
        self.persist(&run);

        self.transition(&mut run, Phase::Checking)?;
        if cancel.is_cancelled() {
            return self.failed(run, CANCELLED).await;
        }
        let updates = match self.check_updates().await {
            Ok(updates) => updates,
            Err(e) => return self.failed(run, format!("version check failed: {}", e)).await,
        };

        run.changes = updates
            .into_iter()
            .filter(|u| force || u.is_available())
            .map(|u| VersionChange {
                component: u.component,
                from: u.current,
                to: u.latest,
            })
            .collect();
        if run.changes.is_empty() {
            self.transition(&mut run, Phase::NoUpdate)?;
            tracing::info!(run = %run.id, "no updates available");
            return Ok(run);
        }

        self.transition(&mut run, Phase::BackingUp)?;
        let name = match ComponentName::new(PRE_UPDATE_BUNDLE) {
            Ok(name) => name,
            Err(e) => return self.failed(run, e.to_string()).await,
        };
        match self.capture.capture(&name, None, cancel).await {
            Ok(report) if report.is_complete() => run.bundle = Some(report.id),
            Ok(report) => {
                let reason = format!(
                    "pre-update bundle {} is partial: {}",
                    report.id,
                    report.failures().join("; ")
                );
                return self.failed(run, reason).await;
            }
            Err(SnapshotError::Cancelled) => return self.failed(run, CANCELLED).await,
            Err(e) => return self.failed(run, format!("pre-update capture failed: {}", e)).await,
        }

        if cancel.is_cancelled() {
            return self.failed(run, CANCELLED).await;
        }
        self.transition(&mut run, Phase::Applying)?;
        if let Err(reason) = self.apply(&run.changes).await {
            return self.rollback(run, reason, cancel).await;
        }

        self.transition(&mut run, Phase::Verifying)?;
        match self
            .health
            .await_healthy(
                &self.settings.health_components,
                self.settings.health_timeout,
                self.settings.poll_interval,
                cancel,
            )
            .await
        {
            HealthOutcome::Healthy => self.commit(run).await,
            HealthOutcome::Cancelled => self.failed(run, CANCELLED).await,
            outcome => self.rollback(run, outcome.to_string(), cancel).await,
        }
    }

    /// Stop every component being updated, then recreate each at its new version.
    async fn apply(&self, changes: &[VersionChange]) -> Result<(), String> {
        let components: Vec<ComponentName> = changes.iter().map(|c| c.component.clone()).collect();
        self.services
            .stop(&components, self.settings.stop_timeout)
            .await
            .map_err(|e| format!("failed to stop components: {}", e))?;

        for change in changes {
            tracing::info!(component = %change.component, from = %change.from, to = %change.to, "recreating component");
            self.services
                .recreate(&change.component, &change.to)
                .await
                .map_err(|e| format!("failed to recreate {}: {}", change.component, e))?;
        }
        Ok(())
    }

    async fn commit(&self, mut run: UpdateRun) -> Result<UpdateRun, UpdateError> {
        self.transition(&mut run, Phase::Committed)?;

        match self
            .catalog
            .prune(self.settings.retention_days, run.bundle.as_ref().map(|b| b.name()))
        {
            Ok(report) if !report.deleted.is_empty() => {
                tracing::info!(deleted = report.deleted.len(), "pruned pre-update bundles");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to prune pre-update bundles"),
        }

        let body = run
            .changes
            .iter()
            .map(|c| format!("{}: {} -> {}", c.component, c.from, c.to))
            .collect::<Vec<_>>()
            .join("\n");
        self.notifier
            .notify(&Event::info(self.subject("update committed"), body))
            .await;
        Ok(run)
    }

    /// Put the previous versions back, then restore the pre-update bundle.
    async fn rollback(
        &self,
        mut run: UpdateRun,
        reason: String,
        cancel: &CancellationToken,
    ) -> Result<UpdateRun, UpdateError> {
        tracing::warn!(run = %run.id, reason = %reason, "rolling back update");
        run.error = Some(reason.clone());
        self.transition(&mut run, Phase::RollingBack)?;
        self.notifier
            .notify(&Event::warning(self.subject("rolling back update"), reason.clone()))
            .await;

        let Some(bundle) = run.bundle.clone() else {
            return self.failed(run, format!("{}; no pre-update bundle to restore", reason)).await;
        };

        for change in &run.changes {
            if let Err(e) = self.services.recreate(&change.component, &change.from).await {
                let detail = format!(
                    "{}; rollback failed to recreate {} at {}: {}",
                    reason, change.component, change.from, e
                );
                return self.failed(run, detail).await;
            }
        }

        let options = RestoreOptions {
            force: true,
            ..Default::default()
        };
        match self.restore.restore(&bundle, options, None, cancel).await {
            Ok(_) => {
                self.transition(&mut run, Phase::RolledBack)?;
                self.notifier
                    .notify(&Event::warning(self.subject("update rolled back"), run.summary()))
                    .await;
                Ok(run)
            }
            Err(e) => {
                self.failed(run, format!("{}; rollback restore failed: {}", reason, e))
                    .await
            }
        }
    }

    async fn failed(&self, mut run: UpdateRun, reason: impl Into<String>) -> Result<UpdateRun, UpdateError> {
        run.fail(reason)?;
        self.persist(&run);
        tracing::error!(run = %run.id, "{}", run.summary());
        self.notifier
            .notify(&Event::critical(self.subject("update failed"), run.summary()))
            .await;
        Ok(run)
    }

    fn transition(&self, run: &mut UpdateRun, next: Phase) -> Result<(), UpdateError> {
        run.advance(next)?;
        self.persist(run);
        Ok(())
    }

    /// A record that cannot be written must not abandon a half-applied update.
    fn persist(&self, run: &UpdateRun) {
        if let Err(e) = self.runs.save(run) {
            tracing::warn!(run = %run.id, error = %e, "failed to persist run record");
        }
    }

    fn subject(&self, what: &str) -> String {
        format!("[{}] {}", self.settings.project, what)
    }
}
