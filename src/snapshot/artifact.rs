// ABOUTME: Data sources that turn live state into bundle artifacts and back.
// ABOUTME: A closed enum of source kinds behind the ArtifactSource capability trait.

use super::archive;
use super::bundle::{ArtifactKind, ArtifactRecord};
use super::error::SnapshotError;
use crate::config::{SourceConfig, SourceKindConfig};
use crate::poll::{PollOutcome, Poller};
use crate::runtime::{KvStore, RelationalStore, ServiceOps, StoreError};
use crate::types::ComponentName;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Failure while restoring one artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Layout(String),

    #[error("service error: {0}")]
    Service(String),
}

impl ArtifactError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Settings shared by every artifact capture of one bundle.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub kv_snapshot_timeout: Duration,
    pub kv_poll_interval: Duration,
    pub cancel: CancellationToken,
}

/// What a restore step needs besides the artifact itself.
pub struct RestoreContext<'a> {
    pub services: &'a dyn ServiceOps,
    pub stop_timeout: Duration,
    /// Suffix appended to live paths moved aside, e.g. `pre-restore-20250101T000000Z`.
    pub sidecar_suffix: &'a str,
    /// Directory for sidecars that have no live path of their own (database dumps).
    pub sidecar_dir: &'a Path,
}

/// A captured artifact file or directory inside the staging bundle.
#[derive(Debug, Clone)]
pub struct Captured {
    pub path: PathBuf,
    pub size: u64,
    pub checksum: String,
}

/// Capability shared by every data source kind.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    fn name(&self) -> &ComponentName;

    fn kind(&self) -> ArtifactKind;

    /// Check that the source can be captured right now.
    async fn ping(&self) -> Result<(), SnapshotError>;

    /// Write this source's artifact into `staging` and describe it.
    async fn capture(
        &self,
        staging: &Path,
        ctx: &CaptureContext,
    ) -> Result<Captured, SnapshotError>;

    /// Replace live state with the artifact in `bundle_dir`.
    ///
    /// Any sidecar created is pushed to `sidecars` before the live state is
    /// replaced, so it is reported even when the step fails.
    async fn restore(
        &self,
        bundle_dir: &Path,
        record: &ArtifactRecord,
        ctx: &RestoreContext<'_>,
        sidecars: &mut Vec<PathBuf>,
    ) -> Result<(), ArtifactError>;

    /// Check that `record` belongs to this source and is usable in `bundle_dir`.
    fn validate(&self, bundle_dir: &Path, record: &ArtifactRecord) -> Result<(), String> {
        if record.kind != self.kind() {
            return Err(format!(
                "{} holds a {} but the source produces a {}",
                record.source,
                record.kind,
                self.kind()
            ));
        }
        let problems = record.problems(bundle_dir);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }
}

/// A configured data source.
#[derive(Clone)]
pub enum DataSource {
    Filesystem {
        name: ComponentName,
        path: PathBuf,
    },
    Relational {
        name: ComponentName,
        store: Arc<dyn RelationalStore>,
    },
    Kv {
        name: ComponentName,
        /// Container running the store; stopped while its data is replaced.
        container: ComponentName,
        store: Arc<dyn KvStore>,
        data_dir: PathBuf,
    },
    Config {
        name: ComponentName,
        root: PathBuf,
        paths: Vec<PathBuf>,
    },
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Store handles for the sources that need a live connection.
pub trait StoreFactory {
    fn relational(
        &self,
        container: &ComponentName,
        user: &str,
        database: &str,
        password: Option<String>,
    ) -> Arc<dyn RelationalStore>;

    fn kv(&self, container: &ComponentName, password: Option<String>) -> Arc<dyn KvStore>;
}

impl DataSource {
    /// Build a data source from configuration, resolving secrets now.
    pub fn from_config(
        config: &SourceConfig,
        stores: &dyn StoreFactory,
    ) -> crate::error::Result<Self> {
        let name = config.name.clone();
        Ok(match &config.kind {
            SourceKindConfig::Filesystem { path } => DataSource::Filesystem {
                name,
                path: path.clone(),
            },
            SourceKindConfig::Relational {
                container,
                user,
                database,
                password,
            } => {
                let password = password.as_ref().map(|p| p.resolve()).transpose()?;
                DataSource::Relational {
                    name,
                    store: stores.relational(container, user, database, password),
                }
            }
            SourceKindConfig::Kv {
                container,
                data_dir,
                password,
            } => {
                let password = password.as_ref().map(|p| p.resolve()).transpose()?;
                DataSource::Kv {
                    name,
                    container: container.clone(),
                    store: stores.kv(container, password),
                    data_dir: data_dir.clone(),
                }
            }
            SourceKindConfig::Config { root, paths } => DataSource::Config {
                name,
                root: root.clone(),
                paths: paths.clone(),
            },
        })
    }

    fn unavailable(&self, message: impl Into<String>) -> SnapshotError {
        SnapshotError::ServiceUnavailable {
            name: self.name().clone(),
            message: message.into(),
        }
    }

    fn dump_failed(&self, message: impl Into<String>) -> SnapshotError {
        SnapshotError::DumpFailed {
            name: self.name().clone(),
            message: message.into(),
        }
    }

    /// Describe a finished artifact at `staging/rel`.
    async fn describe(&self, staging: &Path, rel: PathBuf) -> Result<Captured, SnapshotError> {
        let full = staging.join(&rel);
        let (size, checksum) = blocking(move || {
            let size = archive::measure(&full)?;
            let checksum = archive::digest(&full)?;
            Ok((size, checksum))
        })
        .await
        .map_err(|e| self.dump_failed(e.to_string()))?;

        if size == 0 {
            return Err(self.dump_failed("artifact is empty"));
        }
        Ok(Captured {
            path: rel,
            size,
            checksum,
        })
    }

    async fn wait_for_kv_save(
        &self,
        store: &dyn KvStore,
        ctx: &CaptureContext,
    ) -> Result<(), SnapshotError> {
        let before = store
            .last_save_marker()
            .await
            .map_err(|e| self.dump_failed(e.to_string()))?;
        store
            .trigger_async_save()
            .await
            .map_err(|e| self.dump_failed(e.to_string()))?;

        let poller = Poller::new(ctx.kv_poll_interval, ctx.kv_snapshot_timeout);
        let outcome = poller
            .until(&ctx.cancel, move || async move {
                let marker = store.last_save_marker().await?;
                Ok::<_, StoreError>((marker != before).then_some(marker))
            })
            .await
            .map_err(|e| self.dump_failed(e.to_string()))?;

        match outcome {
            PollOutcome::Ready(marker) => {
                tracing::debug!(source = %self.name(), marker, "kv snapshot finished");
                Ok(())
            }
            PollOutcome::TimedOut => Err(SnapshotError::SnapshotTimeout {
                name: self.name().clone(),
                timeout: ctx.kv_snapshot_timeout,
            }),
            PollOutcome::Cancelled => Err(SnapshotError::Cancelled),
        }
    }
}

/// Run blocking file work off the async runtime.
async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::other(format!("blocking task failed: {}", e)))?
}

/// Move `live` aside to `<live>.<suffix>` if it exists, recording the sidecar.
fn move_aside(
    live: &Path,
    suffix: &str,
    sidecars: &mut Vec<PathBuf>,
) -> Result<(), ArtifactError> {
    if std::fs::symlink_metadata(live).is_err() {
        return Ok(());
    }
    let mut sidecar = live.as_os_str().to_owned();
    sidecar.push(".");
    sidecar.push(suffix);
    let sidecar = PathBuf::from(sidecar);

    std::fs::rename(live, &sidecar).map_err(|e| ArtifactError::io(live, e))?;
    tracing::debug!(live = %live.display(), sidecar = %sidecar.display(), "moved live data aside");
    sidecars.push(sidecar);
    Ok(())
}

fn artifact_path(bundle_dir: &Path, record: &ArtifactRecord) -> Result<PathBuf, ArtifactError> {
    record
        .path
        .as_ref()
        .map(|p| bundle_dir.join(p))
        .ok_or_else(|| ArtifactError::Layout(format!("{} has no captured artifact", record.source)))
}

#[async_trait]
impl ArtifactSource for DataSource {
    fn name(&self) -> &ComponentName {
        match self {
            DataSource::Filesystem { name, .. }
            | DataSource::Relational { name, .. }
            | DataSource::Kv { name, .. }
            | DataSource::Config { name, .. } => name,
        }
    }

    fn kind(&self) -> ArtifactKind {
        match self {
            DataSource::Filesystem { .. } => ArtifactKind::FilesystemArchive,
            DataSource::Relational { .. } => ArtifactKind::RelationalDump,
            DataSource::Kv { .. } => ArtifactKind::KvSnapshot,
            DataSource::Config { .. } => ArtifactKind::ConfigCopy,
        }
    }

    async fn ping(&self) -> Result<(), SnapshotError> {
        match self {
            DataSource::Filesystem { path, .. } => {
                if path.is_dir() {
                    Ok(())
                } else {
                    Err(self.unavailable(format!("{} is not a directory", path.display())))
                }
            }
            DataSource::Relational { store, .. } => {
                store.ping().await.map_err(|e| self.unavailable(e.to_string()))
            }
            DataSource::Kv { store, data_dir, .. } => {
                store.ping().await.map_err(|e| self.unavailable(e.to_string()))?;
                if data_dir.is_dir() {
                    Ok(())
                } else {
                    Err(self.unavailable(format!("{} is not a directory", data_dir.display())))
                }
            }
            DataSource::Config { root, paths, .. } => {
                match paths.iter().map(|p| root.join(p)).find(|p| !p.exists()) {
                    Some(missing) => {
                        Err(self.unavailable(format!("{} does not exist", missing.display())))
                    }
                    None => Ok(()),
                }
            }
        }
    }

    async fn capture(
        &self,
        staging: &Path,
        ctx: &CaptureContext,
    ) -> Result<Captured, SnapshotError> {
        let rel = self.kind().file_name(self.name());
        let dest = staging.join(&rel);

        match self {
            DataSource::Filesystem { path, .. } => {
                let src = path.clone();
                blocking(move || archive::pack_dir(&src, &dest))
                    .await
                    .map_err(|e| self.dump_failed(e.to_string()))?;
            }
            DataSource::Relational { store, .. } => {
                let dump = store
                    .dump()
                    .await
                    .map_err(|e| self.dump_failed(e.to_string()))?;
                if dump.is_empty() {
                    return Err(self.dump_failed("dump produced no output"));
                }
                blocking(move || archive::gzip_to(&dump, &dest))
                    .await
                    .map_err(|e| self.dump_failed(e.to_string()))?;
            }
            DataSource::Kv {
                store, data_dir, ..
            } => {
                self.wait_for_kv_save(store.as_ref(), ctx).await?;
                let src = data_dir.clone();
                blocking(move || archive::pack_dir(&src, &dest))
                    .await
                    .map_err(|e| self.dump_failed(e.to_string()))?;
            }
            DataSource::Config { root, paths, .. } => {
                let root = root.clone();
                let paths = paths.clone();
                blocking(move || {
                    std::fs::create_dir_all(&dest)?;
                    for p in &paths {
                        archive::copy_tree(&root.join(p), &dest.join(p))?;
                    }
                    Ok(())
                })
                .await
                .map_err(|e| self.dump_failed(e.to_string()))?;
            }
        }

        self.describe(staging, rel).await
    }

    async fn restore(
        &self,
        bundle_dir: &Path,
        record: &ArtifactRecord,
        ctx: &RestoreContext<'_>,
        sidecars: &mut Vec<PathBuf>,
    ) -> Result<(), ArtifactError> {
        let artifact = artifact_path(bundle_dir, record)?;

        match self {
            DataSource::Filesystem { path, .. } => {
                move_aside(path, ctx.sidecar_suffix, sidecars)?;
                let live = path.clone();
                blocking(move || archive::unpack(&artifact, &live))
                    .await
                    .map_err(|e| ArtifactError::io(path, e))
            }
            DataSource::Relational { name, store } => {
                // The live database cannot be renamed; its sidecar is a fresh dump.
                let current = store.dump().await?;
                let sidecar = ctx
                    .sidecar_dir
                    .join(format!("{}.sql.{}", name, ctx.sidecar_suffix));
                std::fs::create_dir_all(ctx.sidecar_dir)
                    .map_err(|e| ArtifactError::io(ctx.sidecar_dir, e))?;
                std::fs::write(&sidecar, &current).map_err(|e| ArtifactError::io(&sidecar, e))?;
                sidecars.push(sidecar);

                let dump = blocking(move || archive::gunzip(&artifact))
                    .await
                    .map_err(|e| ArtifactError::io(bundle_dir, e))?;
                store.load(Bytes::from(dump)).await?;
                Ok(())
            }
            DataSource::Kv {
                container,
                data_dir,
                ..
            } => {
                // The store rewrites its data on shutdown, so it must be down while
                // the directory is swapped.
                let containers = std::slice::from_ref(container);
                ctx.services
                    .stop(containers, ctx.stop_timeout)
                    .await
                    .map_err(|e| ArtifactError::Service(e.to_string()))?;

                let swapped = match move_aside(data_dir, ctx.sidecar_suffix, sidecars) {
                    Ok(()) => {
                        let live = data_dir.clone();
                        blocking(move || archive::unpack(&artifact, &live))
                            .await
                            .map_err(|e| ArtifactError::io(data_dir, e))
                    }
                    Err(e) => Err(e),
                };

                let started = ctx
                    .services
                    .start(containers)
                    .await
                    .map_err(|e| ArtifactError::Service(e.to_string()));
                swapped.and(started)
            }
            DataSource::Config { root, paths, .. } => {
                for p in paths {
                    let src = artifact.join(p);
                    if !src.exists() {
                        return Err(ArtifactError::Layout(format!(
                            "{} is missing from the bundle",
                            p.display()
                        )));
                    }
                    let live = root.join(p);
                    move_aside(&live, ctx.sidecar_suffix, sidecars)?;
                    let dest = live.clone();
                    blocking(move || archive::copy_tree(&src, &dest))
                        .await
                        .map_err(|e| ArtifactError::io(&live, e))?;
                }
                Ok(())
            }
        }
    }
}
