// ABOUTME: Configuration types and parsing for bulwark.yml.
// ABOUTME: Handles YAML parsing, defaults, path resolution and cross-field validation.

mod deserialize;
mod env_value;
mod health;
mod init;
mod notify;
mod sources;

pub use deserialize::parse_byte_size;
pub use env_value::EnvValue;
pub use health::HealthConfig;
pub use init::init_config;
pub use notify::{ChannelConfig, NotifyConfig};
pub use sources::{SourceConfig, SourceKindConfig};

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::types::ComponentName;
use deserialize::{deserialize_byte_size, deserialize_components};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "bulwark.yml";
pub const CONFIG_FILENAME_ALT: &str = "bulwark.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".bulwark/config.yml";

/// Name given to the safety bundle captured before every update.
pub const PRE_UPDATE_BUNDLE: &str = "pre-update";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub project: ComponentName,

    #[serde(deserialize_with = "deserialize_components")]
    pub components: NonEmpty<ComponentName>,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub restore: RestoreConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Capture refuses to start below this much free space in `dir`.
    #[serde(
        default = "default_min_free_space",
        deserialize_with = "deserialize_byte_size"
    )]
    pub min_free_space: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            dir: default_catalog_dir(),
            retention_days: default_retention_days(),
            min_free_space: default_min_free_space(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_kv_snapshot_timeout", with = "humantime_serde")]
    pub kv_snapshot_timeout: Duration,

    #[serde(default = "default_kv_poll_interval", with = "humantime_serde")]
    pub kv_poll_interval: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            kv_snapshot_timeout: default_kv_snapshot_timeout(),
            kv_poll_interval: default_kv_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConfig {
    /// Graceful stop timeout before a component is recreated.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Components eligible for updates. Defaults to all components.
    #[serde(default)]
    pub components: Option<Vec<ComponentName>>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        UpdateConfig {
            stop_timeout: default_stop_timeout(),
            components: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestoreConfig {
    /// Services stopped while live data is replaced. Defaults to every
    /// component that does not back a relational or KV source.
    #[serde(default)]
    pub stop: Option<Vec<ComponentName>>,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".bulwark")
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_retention_days() -> u32 {
    14
}

fn default_min_free_space() -> u64 {
    1024 * 1024 * 1024
}

fn default_kv_snapshot_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_kv_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Parse and validate a config. Relative paths stay relative to the
    /// current directory; use [`Config::load`] to anchor them to the file.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.anchor_paths(base);
        }
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Make every relative path in the config relative to `base`.
    pub fn anchor_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        anchor(&mut self.state_dir);
        anchor(&mut self.catalog.dir);
        for source in &mut self.sources {
            match &mut source.kind {
                SourceKindConfig::Filesystem { path } => anchor(path),
                SourceKindConfig::Kv { data_dir, .. } => anchor(data_dir),
                SourceKindConfig::Config { root, .. } => anchor(root),
                SourceKindConfig::Relational { .. } => {}
            }
        }
        for channel in &mut self.notify.channels {
            if let ChannelConfig::Command { path } = channel {
                anchor(path);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate source name: {}",
                    source.name
                )));
            }
            if let SourceKindConfig::Config { paths, .. } = &source.kind {
                if paths.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "config source {} lists no paths",
                        source.name
                    )));
                }
                if paths.iter().any(|p| p.is_absolute()) {
                    return Err(Error::InvalidConfig(format!(
                        "config source {} paths must be relative to its root",
                        source.name
                    )));
                }
            }
        }

        let known: HashSet<&ComponentName> = self.components.iter().collect();
        let subsets = [
            ("update.components", self.update.components.as_ref()),
            ("restore.stop", self.restore.stop.as_ref()),
        ];
        for (field, names) in subsets {
            if let Some(unknown) = names
                .into_iter()
                .flatten()
                .find(|name| !known.contains(name))
            {
                return Err(Error::InvalidConfig(format!(
                    "{} names unknown component: {}",
                    field, unknown
                )));
            }
        }

        if self.health.interval.is_zero() || self.capture.kv_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the single-flight lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("bulwark.lock")
    }

    /// Directory where update run records are kept.
    pub fn runs_dir(&self) -> PathBuf {
        self.state_dir.join("runs")
    }

    /// Components that an update replaces.
    pub fn update_set(&self) -> Vec<ComponentName> {
        self.update
            .components
            .clone()
            .unwrap_or_else(|| self.components.iter().cloned().collect())
    }

    /// Services stopped while a restore replaces live data.
    pub fn restore_stop_set(&self) -> Vec<ComponentName> {
        if let Some(stop) = &self.restore.stop {
            return stop.clone();
        }

        let stores: HashSet<&ComponentName> = self
            .sources
            .iter()
            .filter_map(|s| s.kind.container())
            .collect();

        self.components
            .iter()
            .filter(|c| !stores.contains(c))
            .cloned()
            .collect()
    }
}
