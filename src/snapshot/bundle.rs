// ABOUTME: Bundle and artifact records as stored in a bundle's metadata.json.
// ABOUTME: Metadata is the last file written, so its presence marks a finished bundle.

use crate::types::{BundleId, ComponentName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the metadata file inside every bundle directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Kind of payload an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FilesystemArchive,
    RelationalDump,
    KvSnapshot,
    ConfigCopy,
}

impl ArtifactKind {
    /// Path of this artifact inside a bundle, relative to the bundle root.
    pub fn file_name(&self, source: &ComponentName) -> PathBuf {
        match self {
            ArtifactKind::FilesystemArchive => PathBuf::from(format!("{}.tar.gz", source)),
            ArtifactKind::RelationalDump => PathBuf::from(format!("{}.sql.gz", source)),
            ArtifactKind::KvSnapshot => PathBuf::from(format!("{}.kv.tar.gz", source)),
            ArtifactKind::ConfigCopy => PathBuf::from(source.as_str()),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::FilesystemArchive => write!(f, "filesystem archive"),
            ArtifactKind::RelationalDump => write!(f, "relational dump"),
            ArtifactKind::KvSnapshot => write!(f, "kv snapshot"),
            ArtifactKind::ConfigCopy => write!(f, "config copy"),
        }
    }
}

/// Whether every artifact of a bundle was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Complete,
    Partial,
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleStatus::Complete => write!(f, "complete"),
            BundleStatus::Partial => write!(f, "partial"),
        }
    }
}

/// One artifact entry in bundle metadata.
///
/// A failed capture is recorded with its error and without a path, so a
/// partial bundle still explains what is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub source: ComponentName,
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArtifactRecord {
    pub fn captured(
        source: ComponentName,
        kind: ArtifactKind,
        path: PathBuf,
        size: u64,
        checksum: String,
    ) -> Self {
        Self {
            source,
            kind,
            path: Some(path),
            size,
            checksum: Some(checksum),
            error: None,
        }
    }

    pub fn failed(source: ComponentName, kind: ArtifactKind, error: String) -> Self {
        Self {
            source,
            kind,
            path: None,
            size: 0,
            checksum: None,
            error: Some(error),
        }
    }

    pub fn is_captured(&self) -> bool {
        self.error.is_none() && self.path.is_some()
    }

    /// Problems that make this artifact unusable inside `bundle_dir`.
    pub fn problems(&self, bundle_dir: &Path) -> Vec<String> {
        if let Some(error) = &self.error {
            return vec![format!("{} ({}) failed to capture: {}", self.source, self.kind, error)];
        }
        let Some(path) = &self.path else {
            return vec![format!("{} ({}) has no path", self.source, self.kind)];
        };

        let full = bundle_dir.join(path);
        match super::archive::measure(&full) {
            Ok(0) => vec![format!("{} is empty", path.display())],
            Ok(size) if size != self.size => vec![format!(
                "{} is {} bytes, expected {}",
                path.display(),
                size,
                self.size
            )],
            Ok(_) => Vec::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                vec![format!("{} is missing", path.display())]
            }
            Err(e) => vec![format!("{} is unreadable: {}", path.display(), e)],
        }
    }
}

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub id: BundleId,
    pub created_at: DateTime<Utc>,
    pub status: BundleStatus,
    /// Running version of each component at capture time.
    #[serde(default)]
    pub versions: BTreeMap<ComponentName, String>,
    pub artifacts: Vec<ArtifactRecord>,
}

impl BundleMetadata {
    /// Human-readable reasons for a partial status, one per failed artifact.
    pub fn failures(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter_map(|a| a.error.as_ref().map(|e| format!("{}: {}", a.source, e)))
            .collect()
    }
}

/// A bundle on disk.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub dir: PathBuf,
    pub metadata: BundleMetadata,
}

impl Bundle {
    pub fn id(&self) -> &BundleId {
        &self.metadata.id
    }

    pub fn status(&self) -> BundleStatus {
        self.metadata.status
    }

    pub fn artifacts(&self) -> &[ArtifactRecord] {
        &self.metadata.artifacts
    }

    /// Total bytes of captured artifacts.
    pub fn size(&self) -> u64 {
        self.metadata.artifacts.iter().map(|a| a.size).sum()
    }
}
