// ABOUTME: Produces one bundle from the configured data sources.
// ABOUTME: Preflights everything, captures concurrently into staging, then promotes by rename.

use super::artifact::{ArtifactSource, CaptureContext, DataSource};
use super::bundle::{ArtifactRecord, BundleMetadata, BundleStatus, METADATA_FILE};
use super::error::SnapshotError;
use crate::runtime::ServiceOps;
use crate::types::{BundleId, ComponentName};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Capture limits taken from configuration.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub min_free_space: u64,
    pub kv_snapshot_timeout: Duration,
    pub kv_poll_interval: Duration,
}

/// Outcome of a capture that got as far as promoting a bundle.
#[derive(Debug, Clone)]
pub struct CaptureReport {
    pub id: BundleId,
    pub status: BundleStatus,
    pub dir: PathBuf,
    pub artifacts: Vec<ArtifactRecord>,
}

impl CaptureReport {
    pub fn is_complete(&self) -> bool {
        self.status == BundleStatus::Complete
    }

    /// `source: error` for each artifact that failed.
    pub fn failures(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.source, e)))
            .collect()
    }
}

/// Writes bundles into a catalog directory.
pub struct SnapshotCapture {
    catalog_dir: PathBuf,
    sources: Vec<DataSource>,
    settings: CaptureSettings,
    versions: Option<(Arc<dyn ServiceOps>, Vec<ComponentName>)>,
}

impl SnapshotCapture {
    pub fn new(catalog_dir: impl Into<PathBuf>, sources: Vec<DataSource>, settings: CaptureSettings) -> Self {
        Self {
            catalog_dir: catalog_dir.into(),
            sources,
            settings,
            versions: None,
        }
    }

    /// Record the running version of `components` in each bundle's metadata.
    pub fn with_versions(mut self, services: Arc<dyn ServiceOps>, components: Vec<ComponentName>) -> Self {
        self.versions = Some((services, components));
        self
    }

    pub fn catalog_dir(&self) -> &Path {
        &self.catalog_dir
    }

    /// Capture a bundle named `name` from every source, or only those in `filter`.
    ///
    /// Nothing is written until every targeted source answers and the
    /// catalog has room. A source that fails mid-capture makes the bundle
    /// `Partial`; it is still promoted so the failure is on record.
    pub async fn capture(
        &self,
        name: &ComponentName,
        filter: Option<&[ComponentName]>,
        cancel: &CancellationToken,
    ) -> Result<CaptureReport, SnapshotError> {
        let targets = self.targets(filter)?;

        std::fs::create_dir_all(&self.catalog_dir)
            .map_err(|e| SnapshotError::io(&self.catalog_dir, e))?;
        self.check_free_space()?;
        for source in &targets {
            source.ping().await?;
        }

        let id = self.next_id(name);
        let staging = self.catalog_dir.join(format!(".staging-{}", id));
        let final_dir = self.catalog_dir.join(id.to_string());
        std::fs::create_dir_all(&staging).map_err(|e| SnapshotError::io(&staging, e))?;

        tracing::debug!(bundle = %id, sources = targets.len(), "capturing bundle");

        let result = self.capture_into(&id, &staging, &targets, cancel).await;
        let metadata = match result {
            Ok(metadata) => metadata,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = write_metadata(&staging, &metadata) {
            discard(&staging);
            return Err(e);
        }
        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            discard(&staging);
            return Err(SnapshotError::io(&final_dir, e));
        }

        if metadata.status == BundleStatus::Partial {
            tracing::warn!(bundle = %id, failures = ?metadata.failures(), "bundle is partial");
        } else {
            tracing::info!(bundle = %id, "bundle captured");
        }

        Ok(CaptureReport {
            id,
            status: metadata.status,
            dir: final_dir,
            artifacts: metadata.artifacts,
        })
    }

    fn targets(&self, filter: Option<&[ComponentName]>) -> Result<Vec<&DataSource>, SnapshotError> {
        let Some(filter) = filter else {
            return Ok(self.sources.iter().collect());
        };

        filter
            .iter()
            .map(|wanted| {
                self.sources
                    .iter()
                    .find(|s| s.name() == wanted)
                    .ok_or_else(|| SnapshotError::UnknownSource(wanted.to_string()))
            })
            .collect()
    }

    fn check_free_space(&self) -> Result<(), SnapshotError> {
        if self.settings.min_free_space == 0 {
            return Ok(());
        }
        let available = fs4::available_space(&self.catalog_dir)
            .map_err(|e| SnapshotError::io(&self.catalog_dir, e))?;
        if available < self.settings.min_free_space {
            return Err(SnapshotError::DiskFull {
                path: self.catalog_dir.clone(),
                available,
                required: self.settings.min_free_space,
            });
        }
        Ok(())
    }

    /// A fresh id; bumps the timestamp if a bundle with this second's id exists.
    fn next_id(&self, name: &ComponentName) -> BundleId {
        let mut at = Utc::now();
        loop {
            let id = BundleId::new(name.clone(), at);
            let taken = self.catalog_dir.join(id.to_string()).exists()
                || self.catalog_dir.join(format!(".staging-{}", id)).exists();
            if !taken {
                return id;
            }
            at = id.created_at() + chrono::Duration::seconds(1);
        }
    }

    async fn capture_into(
        &self,
        id: &BundleId,
        staging: &Path,
        targets: &[&DataSource],
        cancel: &CancellationToken,
    ) -> Result<BundleMetadata, SnapshotError> {
        let ctx = CaptureContext {
            kv_snapshot_timeout: self.settings.kv_snapshot_timeout,
            kv_poll_interval: self.settings.kv_poll_interval,
            cancel: cancel.clone(),
        };

        let captures = targets.iter().map(|source| {
            let ctx = &ctx;
            async move { (*source, source.capture(staging, ctx).await) }
        });
        let results = futures::future::join_all(captures).await;

        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let mut artifacts = Vec::with_capacity(results.len());
        for (source, result) in results {
            match result {
                Ok(captured) => artifacts.push(ArtifactRecord::captured(
                    source.name().clone(),
                    source.kind(),
                    captured.path,
                    captured.size,
                    captured.checksum,
                )),
                Err(SnapshotError::Cancelled) => return Err(SnapshotError::Cancelled),
                Err(e) => {
                    tracing::warn!(source = %source.name(), error = %e, "artifact capture failed");
                    artifacts.push(ArtifactRecord::failed(
                        source.name().clone(),
                        source.kind(),
                        e.to_string(),
                    ));
                }
            }
        }

        let status = if artifacts.iter().all(|a| a.is_captured()) {
            BundleStatus::Complete
        } else {
            BundleStatus::Partial
        };

        Ok(BundleMetadata {
            id: id.clone(),
            created_at: id.created_at(),
            status,
            versions: self.component_versions().await,
            artifacts,
        })
    }

    async fn component_versions(&self) -> BTreeMap<ComponentName, String> {
        let Some((services, components)) = &self.versions else {
            return BTreeMap::new();
        };

        let mut versions = BTreeMap::new();
        for component in components {
            match services.current_version(component).await {
                Ok(version) => {
                    versions.insert(component.clone(), version.into_inner());
                }
                Err(e) => {
                    tracing::warn!(%component, error = %e, "could not record component version");
                }
            }
        }
        versions
    }
}

/// Write metadata through a temp file so a reader never sees a torn file.
fn write_metadata(dir: &Path, metadata: &BundleMetadata) -> Result<(), SnapshotError> {
    let path = dir.join(METADATA_FILE);
    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| SnapshotError::io(&path, std::io::Error::other(e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SnapshotError::io(dir, e))?;
    std::io::Write::write_all(&mut tmp, &json).map_err(|e| SnapshotError::io(&path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| SnapshotError::io(&path, e))?;
    tmp.persist(&path)
        .map_err(|e| SnapshotError::io(&path, e.error))?;
    Ok(())
}

fn discard(staging: &Path) {
    if let Err(e) = std::fs::remove_dir_all(staging) {
        tracing::warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
    }
}
