// ABOUTME: A small on-disk deployment wired to the in-memory fakes.
// ABOUTME: Builds capture, restore and update components the same way the CLI does.

use super::fakes::{FakeDatabase, FakeKv, FakeServices, name};
use bulwark::restore::{RestoreExecutor, RestoreSettings};
use bulwark::runtime::ServiceOps;
use bulwark::snapshot::{CaptureSettings, DataSource, SnapshotCapture, SnapshotCatalog};
use bulwark::update::{UpdateOrchestrator, UpdateSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const POLL: Duration = Duration::from_millis(20);

pub struct Deployment {
    pub root: TempDir,
    pub services: Arc<FakeServices>,
    pub db: Arc<FakeDatabase>,
    pub kv: Arc<FakeKv>,
}

impl Deployment {
    /// `app` and `db` components, uploads on disk, a database, a KV store and one config file.
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let uploads = root.path().join("uploads");
        std::fs::create_dir_all(uploads.join("avatars")).unwrap();
        std::fs::write(uploads.join("avatars/alice.png"), b"png-bytes").unwrap();
        std::fs::write(uploads.join("report.pdf"), b"pdf-bytes").unwrap();

        let kv_data = root.path().join("kv");
        std::fs::create_dir_all(&kv_data).unwrap();
        std::fs::write(kv_data.join("dump.rdb"), b"REDIS0011").unwrap();

        let etc = root.path().join("etc");
        std::fs::create_dir_all(&etc).unwrap();
        std::fs::write(etc.join("app.env"), b"MODE=production\n").unwrap();

        let services = FakeServices::new()
            .with_component("app", "sha256:app-v1", "sha256:app-v2");
        services.with_component("db", "sha256:db-v1", "sha256:db-v1");

        Self {
            root,
            services,
            db: FakeDatabase::with_rows(&["alice", "bob"]),
            kv: FakeKv::new(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.path("backups")
    }

    pub fn catalog(&self) -> SnapshotCatalog {
        SnapshotCatalog::new(self.catalog_dir())
    }

    pub fn services(&self) -> Arc<dyn ServiceOps> {
        self.services.clone()
    }

    pub fn sources(&self) -> Vec<DataSource> {
        vec![
            DataSource::Filesystem {
                name: name("uploads"),
                path: self.path("uploads"),
            },
            DataSource::Relational {
                name: name("db"),
                store: self.db.clone(),
            },
            DataSource::Kv {
                name: name("cache"),
                container: name("cache"),
                store: self.kv.clone(),
                data_dir: self.path("kv"),
            },
            DataSource::Config {
                name: name("settings"),
                root: self.path("etc"),
                paths: vec![PathBuf::from("app.env")],
            },
        ]
    }

    pub fn capture(&self) -> SnapshotCapture {
        self.capture_from(self.sources())
    }

    pub fn capture_from(&self, sources: Vec<DataSource>) -> SnapshotCapture {
        let settings = CaptureSettings {
            min_free_space: 0,
            kv_snapshot_timeout: Duration::from_millis(300),
            kv_poll_interval: Duration::from_millis(10),
        };
        SnapshotCapture::new(self.catalog_dir(), sources, settings)
            .with_versions(self.services(), vec![name("app"), name("db")])
    }

    pub fn restore(&self) -> RestoreExecutor {
        let settings = RestoreSettings {
            stop: vec![name("app")],
            components: vec![name("app"), name("db")],
            stop_timeout: Duration::from_secs(1),
            health_timeout: Duration::from_secs(2),
            poll_interval: POLL,
            sidecar_dir: self.path(".bulwark/sidecars"),
        };
        RestoreExecutor::new(self.catalog(), self.sources(), self.services(), settings)
    }

    pub fn orchestrator(&self, health_timeout: Duration) -> UpdateOrchestrator {
        let settings = UpdateSettings {
            project: name("shop"),
            components: vec![name("app"), name("db")],
            health_components: vec![name("app"), name("db")],
            stop_timeout: Duration::from_secs(1),
            health_timeout,
            poll_interval: POLL,
            retention_days: 14,
            lock_path: self.path(".bulwark/bulwark.lock"),
            runs_dir: self.path(".bulwark/runs"),
        };
        UpdateOrchestrator::new(self.services(), self.capture(), self.restore(), settings)
    }
}

/// Read a file relative to `dir` as a string.
pub fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel)).unwrap()
}
