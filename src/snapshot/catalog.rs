// ABOUTME: Reads, validates and retires bundles in the catalog directory.
// ABOUTME: Dot-prefixed entries are in-flight writes or deletions and are never listed.

use super::archive;
use super::bundle::{Bundle, BundleMetadata, BundleStatus, METADATA_FILE};
use super::error::SnapshotError;
use crate::types::{BundleId, ComponentName};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Result of validating a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(Vec<String>),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    fn from_problems(problems: Vec<String>) -> Self {
        if problems.is_empty() {
            Validation::Valid
        } else {
            Validation::Invalid(problems)
        }
    }
}

/// What a prune pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<BundleId>,
    pub kept: Vec<BundleId>,
}

#[derive(Debug, Clone)]
pub struct SnapshotCatalog {
    dir: PathBuf,
}

impl SnapshotCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_dir(&self, id: &BundleId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Bundle ids, newest first. A missing catalog directory is empty.
    pub fn list(&self) -> Result<Vec<BundleId>, SnapshotError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SnapshotError::io(&self.dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SnapshotError::io(&self.dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match BundleId::parse(name) {
                Ok(id) => ids.push(id),
                Err(e) => tracing::debug!(entry = name, error = %e, "ignoring catalog entry"),
            }
        }

        ids.sort_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    /// Read a bundle's metadata.
    pub fn load(&self, id: &BundleId) -> Result<Bundle, SnapshotError> {
        let dir = self.bundle_dir(id);
        if !dir.is_dir() {
            return Err(SnapshotError::NotFound(id.clone()));
        }

        let path = dir.join(METADATA_FILE);
        let content = std::fs::read(&path).map_err(|e| SnapshotError::InvalidMetadata {
            id: id.clone(),
            message: format!("{}: {}", METADATA_FILE, e),
        })?;
        let metadata: BundleMetadata =
            serde_json::from_slice(&content).map_err(|e| SnapshotError::InvalidMetadata {
                id: id.clone(),
                message: e.to_string(),
            })?;

        if &metadata.id != id {
            return Err(SnapshotError::InvalidMetadata {
                id: id.clone(),
                message: format!("metadata belongs to {}", metadata.id),
            });
        }

        Ok(Bundle { dir, metadata })
    }

    /// A bundle is valid when its metadata reads, it is complete, and every
    /// listed artifact is present and non-empty at its recorded size.
    pub fn validate(&self, id: &BundleId) -> Validation {
        let bundle = match self.load(id) {
            Ok(bundle) => bundle,
            Err(e) => return Validation::Invalid(vec![e.to_string()]),
        };

        let mut problems = Vec::new();
        if bundle.status() == BundleStatus::Partial {
            problems.push("bundle is partial".to_string());
        }
        for artifact in bundle.artifacts() {
            problems.extend(artifact.problems(&bundle.dir));
        }
        Validation::from_problems(problems)
    }

    /// [`SnapshotCatalog::validate`] plus a sha256 check of every artifact.
    pub fn verify_checksums(&self, id: &BundleId) -> Validation {
        let structural = self.validate(id);
        if !structural.is_valid() {
            return structural;
        }
        let bundle = match self.load(id) {
            Ok(bundle) => bundle,
            Err(e) => return Validation::Invalid(vec![e.to_string()]),
        };

        let mut problems = Vec::new();
        for artifact in bundle.artifacts() {
            let (Some(path), Some(expected)) = (&artifact.path, &artifact.checksum) else {
                continue;
            };
            match archive::digest(&bundle.dir.join(path)) {
                Ok(actual) if &actual == expected => {}
                Ok(_) => problems.push(format!("{} checksum mismatch", path.display())),
                Err(e) => problems.push(format!("{} is unreadable: {}", path.display(), e)),
            }
        }
        Validation::from_problems(problems)
    }

    /// Newest bundle, optionally only among bundles called `name`.
    pub fn latest(&self, name: Option<&ComponentName>) -> Result<Option<BundleId>, SnapshotError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|id| name.is_none_or(|n| id.name() == n)))
    }

    /// Delete bundles older than `retention_days`, keeping the newest one.
    pub fn prune(
        &self,
        retention_days: u32,
        name: Option<&ComponentName>,
    ) -> Result<PruneReport, SnapshotError> {
        self.prune_at(retention_days, name, Utc::now())
    }

    /// [`SnapshotCatalog::prune`] against an explicit clock.
    ///
    /// Only bundles matching `name` are considered. The newest of those is
    /// always kept, whatever its age.
    pub fn prune_at(
        &self,
        retention_days: u32,
        name: Option<&ComponentName>,
        now: DateTime<Utc>,
    ) -> Result<PruneReport, SnapshotError> {
        let cutoff = now - chrono::Duration::days(i64::from(retention_days));
        let candidates: Vec<BundleId> = self
            .list()?
            .into_iter()
            .filter(|id| name.is_none_or(|n| id.name() == n))
            .collect();

        let mut report = PruneReport::default();
        for (index, id) in candidates.into_iter().enumerate() {
            if index == 0 || id.created_at() >= cutoff {
                report.kept.push(id);
                continue;
            }
            self.delete(&id)?;
            tracing::info!(bundle = %id, "pruned bundle");
            report.deleted.push(id);
        }
        Ok(report)
    }

    /// Hide the bundle with a rename first so readers never see it half-deleted.
    fn delete(&self, id: &BundleId) -> Result<(), SnapshotError> {
        let dir = self.bundle_dir(id);
        let doomed = self.dir.join(format!(".deleting-{}", id));
        std::fs::rename(&dir, &doomed).map_err(|e| SnapshotError::io(&dir, e))?;
        std::fs::remove_dir_all(&doomed).map_err(|e| SnapshotError::io(&doomed, e))
    }
}
