// ABOUTME: Builds the lifecycle components from one loaded Config.
// ABOUTME: Commands and tests construct everything through here instead of wiring by hand.

use crate::config::Config;
use crate::error::Result;
use crate::health::HealthProbe;
use crate::lock::ExecutionLock;
use crate::notify::NotificationSink;
use crate::restore::{RestoreExecutor, RestoreSettings};
use crate::runtime::{ExecOps, ExecPostgres, ExecRedis, KvStore, RelationalStore, ServiceOps};
use crate::snapshot::{CaptureSettings, DataSource, SnapshotCapture, SnapshotCatalog, StoreFactory};
use crate::types::{ComponentName, ContainerId};
use crate::update::{UpdateOrchestrator, UpdateSettings};
use std::sync::Arc;

/// Stores reached by running their CLI tools inside the component's container.
pub struct ExecStores<E> {
    exec: Arc<E>,
}

impl<E> ExecStores<E> {
    pub fn new(exec: Arc<E>) -> Self {
        Self { exec }
    }
}

impl<E: ExecOps + 'static> StoreFactory for ExecStores<E> {
    fn relational(
        &self,
        container: &ComponentName,
        user: &str,
        database: &str,
        password: Option<String>,
    ) -> Arc<dyn RelationalStore> {
        Arc::new(ExecPostgres::new(
            self.exec.clone(),
            ContainerId::new(container.as_str()),
            user,
            database,
            password,
        ))
    }

    fn kv(&self, container: &ComponentName, password: Option<String>) -> Arc<dyn KvStore> {
        Arc::new(ExecRedis::new(
            self.exec.clone(),
            ContainerId::new(container.as_str()),
            password,
        ))
    }
}

/// A loaded configuration plus the collaborators it runs against.
pub struct Context {
    config: Config,
    services: Arc<dyn ServiceOps>,
    sources: Vec<DataSource>,
}

impl Context {
    /// Resolve every data source now so missing secrets fail before any work.
    pub fn new(config: Config, services: Arc<dyn ServiceOps>, stores: &dyn StoreFactory) -> Result<Self> {
        let sources = config
            .sources
            .iter()
            .map(|source| DataSource::from_config(source, stores))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            services,
            sources,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> Arc<dyn ServiceOps> {
        self.services.clone()
    }

    pub fn components(&self) -> Vec<ComponentName> {
        self.config.components.iter().cloned().collect()
    }

    pub fn lock(&self) -> ExecutionLock {
        ExecutionLock::new(self.config.lock_path())
    }

    pub fn catalog(&self) -> SnapshotCatalog {
        SnapshotCatalog::new(&self.config.catalog.dir)
    }

    pub fn health(&self) -> HealthProbe {
        HealthProbe::new(self.services.clone())
    }

    pub fn notifier(&self) -> Result<NotificationSink> {
        NotificationSink::from_config(&self.config.notify)
    }

    pub fn capture(&self) -> SnapshotCapture {
        let settings = CaptureSettings {
            min_free_space: self.config.catalog.min_free_space,
            kv_snapshot_timeout: self.config.capture.kv_snapshot_timeout,
            kv_poll_interval: self.config.capture.kv_poll_interval,
        };
        SnapshotCapture::new(&self.config.catalog.dir, self.sources.clone(), settings)
            .with_versions(self.services.clone(), self.components())
    }

    pub fn restore_executor(&self) -> RestoreExecutor {
        let settings = RestoreSettings {
            stop: self.config.restore_stop_set(),
            components: self.components(),
            stop_timeout: self.config.update.stop_timeout,
            health_timeout: self.config.health.timeout,
            poll_interval: self.config.health.interval,
            sidecar_dir: self.config.state_dir.join("sidecars"),
        };
        RestoreExecutor::new(
            self.catalog(),
            self.sources.clone(),
            self.services.clone(),
            settings,
        )
    }

    pub fn orchestrator(&self) -> Result<UpdateOrchestrator> {
        let settings = UpdateSettings {
            project: self.config.project.clone(),
            components: self.config.update_set(),
            health_components: self.components(),
            stop_timeout: self.config.update.stop_timeout,
            health_timeout: self.config.health.timeout,
            poll_interval: self.config.health.interval,
            retention_days: self.config.catalog.retention_days,
            lock_path: self.config.lock_path(),
            runs_dir: self.config.runs_dir(),
        };
        Ok(UpdateOrchestrator::new(
            self.services.clone(),
            self.capture(),
            self.restore_executor(),
            settings,
        )
        .with_notifications(self.notifier()?))
    }
}
