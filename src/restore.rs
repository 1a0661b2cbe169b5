// ABOUTME: Reverses a bundle back into the live data stores.
// ABOUTME: Moves live data aside to sidecars, imports each artifact, then restarts and health-checks.

use crate::health::{HealthOutcome, HealthProbe};
use crate::runtime::{ServiceError, ServiceOps};
use crate::snapshot::{
    ArtifactKind, ArtifactSource, Bundle, DataSource, RestoreContext, SnapshotCatalog,
    SnapshotError, Validation,
};
use crate::types::{BundleId, ComponentName};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("bundle {id} is not restorable: {}", .reasons.join("; "))]
    InvalidBundle { id: BundleId, reasons: Vec<String> },

    #[error("restore of {0} was not confirmed")]
    NotConfirmed(BundleId),

    #[error("failed to stop services: {0}")]
    Stop(#[source] ServiceError),

    #[error(
        "restoring {artifact} ({kind}) failed: {message}; restored so far: [{}]; live data kept at: [{}]",
        .restored.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "),
        .sidecars.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    ArtifactFailed {
        artifact: ComponentName,
        kind: ArtifactKind,
        message: String,
        restored: Vec<ComponentName>,
        sidecars: Vec<PathBuf>,
    },

    #[error("{0} is unhealthy after restore")]
    Unhealthy(ComponentName),

    #[error("timed out waiting for {} after restore", .0.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", "))]
    HealthTimeout(Vec<ComponentName>),

    #[error("restore cancelled")]
    Cancelled,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Error categories for restore failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorKind {
    InvalidBundle,
    NotConfirmed,
    Service,
    ArtifactFailed,
    Unhealthy,
    HealthTimeout,
    Cancelled,
}

impl RestoreError {
    pub fn kind(&self) -> RestoreErrorKind {
        match self {
            RestoreError::InvalidBundle { .. } | RestoreError::Snapshot(_) => {
                RestoreErrorKind::InvalidBundle
            }
            RestoreError::NotConfirmed(_) => RestoreErrorKind::NotConfirmed,
            RestoreError::Stop(_) => RestoreErrorKind::Service,
            RestoreError::ArtifactFailed { .. } => RestoreErrorKind::ArtifactFailed,
            RestoreError::Unhealthy(_) => RestoreErrorKind::Unhealthy,
            RestoreError::HealthTimeout(_) => RestoreErrorKind::HealthTimeout,
            RestoreError::Cancelled => RestoreErrorKind::Cancelled,
        }
    }
}

/// Which artifact kinds to leave alone, and whether to skip confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub skip_data: bool,
    pub skip_db: bool,
    pub skip_kv: bool,
    pub skip_config: bool,
    pub force: bool,
}

impl RestoreOptions {
    fn skips(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::FilesystemArchive => self.skip_data,
            ArtifactKind::RelationalDump => self.skip_db,
            ArtifactKind::KvSnapshot => self.skip_kv,
            ArtifactKind::ConfigCopy => self.skip_config,
        }
    }
}

/// Asked before live data is replaced unless the restore is forced.
pub type Confirm = dyn Fn(&Bundle) -> bool + Send + Sync;

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub bundle: BundleId,
    pub restored: Vec<ComponentName>,
    pub skipped: Vec<ComponentName>,
}

/// Timing and scope taken from configuration.
#[derive(Debug, Clone)]
pub struct RestoreSettings {
    /// Services stopped while live data is replaced.
    pub stop: Vec<ComponentName>,
    /// Components that must be healthy once the restore is done.
    pub components: Vec<ComponentName>,
    pub stop_timeout: Duration,
    pub health_timeout: Duration,
    pub poll_interval: Duration,
    /// Where database sidecar dumps are written.
    pub sidecar_dir: PathBuf,
}

pub struct RestoreExecutor {
    catalog: SnapshotCatalog,
    sources: Vec<DataSource>,
    services: Arc<dyn ServiceOps>,
    health: HealthProbe,
    settings: RestoreSettings,
}

impl RestoreExecutor {
    pub fn new(
        catalog: SnapshotCatalog,
        sources: Vec<DataSource>,
        services: Arc<dyn ServiceOps>,
        settings: RestoreSettings,
    ) -> Self {
        Self {
            catalog,
            sources,
            health: HealthProbe::new(services.clone()),
            services,
            settings,
        }
    }

    /// Restore bundle `id`.
    ///
    /// Nothing live is touched unless the bundle validates and the restore is
    /// forced or confirmed. A failed artifact stops the restore: earlier
    /// artifacts stay restored and every sidecar is kept for manual recovery.
    pub async fn restore(
        &self,
        id: &BundleId,
        options: RestoreOptions,
        confirm: Option<&Confirm>,
        cancel: &CancellationToken,
    ) -> Result<RestoreResult, RestoreError> {
        if let Validation::Invalid(reasons) = self.catalog.validate(id) {
            return Err(RestoreError::InvalidBundle {
                id: id.clone(),
                reasons,
            });
        }
        let bundle = self.catalog.load(id)?;
        let (plan, skipped) = self.plan(&bundle, options)?;

        if !options.force && !confirm.is_some_and(|c| c(&bundle)) {
            return Err(RestoreError::NotConfirmed(id.clone()));
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let suffix = format!("pre-restore-{}", stamp);
        let ctx = RestoreContext {
            services: self.services.as_ref(),
            stop_timeout: self.settings.stop_timeout,
            sidecar_suffix: &suffix,
            sidecar_dir: &self.settings.sidecar_dir,
        };

        tracing::info!(bundle = %id, artifacts = plan.len(), "restoring bundle");

        if let Err(e) = self
            .services
            .stop(&self.settings.stop, self.settings.stop_timeout)
            .await
        {
            self.restart().await;
            return Err(RestoreError::Stop(e));
        }

        let mut restored = Vec::new();
        let mut sidecars = Vec::new();
        let mut failure = None;
        for (source, record) in &plan {
            if cancel.is_cancelled() {
                failure = Some(RestoreError::Cancelled);
                break;
            }
            tracing::debug!(source = %record.source, kind = %record.kind, "restoring artifact");
            match source.restore(&bundle.dir, record, &ctx, &mut sidecars).await {
                Ok(()) => restored.push(record.source.clone()),
                Err(e) => {
                    failure = Some(RestoreError::ArtifactFailed {
                        artifact: record.source.clone(),
                        kind: record.kind,
                        message: e.to_string(),
                        restored: restored.clone(),
                        sidecars: sidecars.clone(),
                    });
                    break;
                }
            }
        }

        if failure.is_none() {
            remove_sidecars(&sidecars);
        } else if !sidecars.is_empty() {
            tracing::warn!(sidecars = ?sidecars, "keeping live data moved aside for manual recovery");
        }

        self.restart().await;
        if let Some(e) = failure {
            return Err(e);
        }

        match self
            .health
            .await_healthy(
                &self.settings.components,
                self.settings.health_timeout,
                self.settings.poll_interval,
                cancel,
            )
            .await
        {
            HealthOutcome::Healthy => {}
            HealthOutcome::Unhealthy(component) => return Err(RestoreError::Unhealthy(component)),
            HealthOutcome::TimedOut(pending) => return Err(RestoreError::HealthTimeout(pending)),
            HealthOutcome::Cancelled => return Err(RestoreError::Cancelled),
        }

        tracing::info!(bundle = %id, "restore finished");
        Ok(RestoreResult {
            bundle: id.clone(),
            restored,
            skipped,
        })
    }

    /// Pair each restorable artifact with its configured source, in bundle order.
    #[allow(clippy::type_complexity)]
    fn plan<'a>(
        &'a self,
        bundle: &'a Bundle,
        options: RestoreOptions,
    ) -> Result<(Vec<(&'a DataSource, &'a crate::snapshot::ArtifactRecord)>, Vec<ComponentName>), RestoreError> {
        let mut plan = Vec::new();
        let mut skipped = Vec::new();
        let mut reasons = Vec::new();

        for record in bundle.artifacts() {
            if options.skips(record.kind) {
                skipped.push(record.source.clone());
                continue;
            }
            let Some(source) = self.sources.iter().find(|s| s.name() == &record.source) else {
                reasons.push(format!("{} is not a configured source", record.source));
                continue;
            };
            match source.validate(&bundle.dir, record) {
                Ok(()) => plan.push((source, record)),
                Err(reason) => reasons.push(reason),
            }
        }

        if reasons.is_empty() {
            Ok((plan, skipped))
        } else {
            Err(RestoreError::InvalidBundle {
                id: bundle.id().clone(),
                reasons,
            })
        }
    }

    async fn restart(&self) {
        if let Err(e) = self.services.start(&self.settings.stop).await {
            tracing::warn!(error = %e, "failed to restart services after restore");
        }
    }
}

fn remove_sidecars(sidecars: &[PathBuf]) {
    for sidecar in sidecars {
        let removed = if sidecar.is_dir() {
            std::fs::remove_dir_all(sidecar)
        } else {
            std::fs::remove_file(sidecar)
        };
        if let Err(e) = removed {
            tracing::warn!(path = %sidecar.display(), error = %e, "failed to remove sidecar");
        }
    }
}
