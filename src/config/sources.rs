// ABOUTME: Data source configuration for bundle capture.
// ABOUTME: One tagged entry per filesystem tree, relational store, KV store or config subtree.

use serde::Deserialize;
use std::path::PathBuf;

use super::EnvValue;
use crate::types::ComponentName;

/// A configured data source. The name becomes the artifact's file stem.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: ComponentName,

    #[serde(flatten)]
    pub kind: SourceKindConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKindConfig {
    /// A directory tree archived recursively.
    Filesystem { path: PathBuf },

    /// A PostgreSQL database running in a managed container.
    Relational {
        container: ComponentName,
        #[serde(default = "default_db_user")]
        user: String,
        database: String,
        #[serde(default)]
        password: Option<EnvValue>,
    },

    /// A Redis-compatible store running in a managed container whose data
    /// directory is bind-mounted at `data_dir` on the host.
    Kv {
        container: ComponentName,
        data_dir: PathBuf,
        #[serde(default)]
        password: Option<EnvValue>,
    },

    /// Individual config files or directories copied relative to `root`.
    Config { root: PathBuf, paths: Vec<PathBuf> },
}

fn default_db_user() -> String {
    "postgres".to_string()
}

impl SourceKindConfig {
    /// Container backing this source, if the source lives in one.
    pub fn container(&self) -> Option<&ComponentName> {
        match self {
            SourceKindConfig::Relational { container, .. }
            | SourceKindConfig::Kv { container, .. } => Some(container),
            SourceKindConfig::Filesystem { .. } | SourceKindConfig::Config { .. } => None,
        }
    }
}
