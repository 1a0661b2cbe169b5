// ABOUTME: Bundle identifier combining a validated name with a UTC capture timestamp.
// ABOUTME: Formats as `<name>-<YYYYMMDDTHHMMSSZ>` and doubles as the bundle directory name.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use super::component_name::{ComponentName, NameError};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const TIMESTAMP_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseBundleIdError {
    #[error("bundle id is missing a timestamp suffix: {0}")]
    MissingTimestamp(String),

    #[error("invalid bundle timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid bundle name: {0}")]
    InvalidName(#[from] NameError),
}

/// Identifier of a captured bundle.
///
/// Bundles sort by capture time first, then by name, so the newest bundle
/// compares greatest regardless of naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleId {
    name: ComponentName,
    created_at: DateTime<Utc>,
}

impl BundleId {
    /// Create an id for a bundle captured at `created_at`, truncated to whole seconds.
    pub fn new(name: ComponentName, created_at: DateTime<Utc>) -> Self {
        let secs = created_at.timestamp();
        let created_at = DateTime::from_timestamp(secs, 0).unwrap_or(created_at);
        Self { name, created_at }
    }

    pub fn parse(input: &str) -> Result<Self, ParseBundleIdError> {
        // name + '-' + timestamp
        if input.len() < TIMESTAMP_LEN + 2 || !input.is_char_boundary(input.len() - TIMESTAMP_LEN)
        {
            return Err(ParseBundleIdError::MissingTimestamp(input.to_string()));
        }

        let (head, stamp) = input.split_at(input.len() - TIMESTAMP_LEN);
        let name = head
            .strip_suffix('-')
            .ok_or_else(|| ParseBundleIdError::MissingTimestamp(input.to_string()))?;

        let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|_| ParseBundleIdError::InvalidTimestamp(stamp.to_string()))?;

        Ok(Self {
            name: ComponentName::new(name)?,
            created_at: naive.and_utc(),
        })
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.name,
            self.created_at.format(TIMESTAMP_FORMAT)
        )
    }
}

impl Ord for BundleId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for BundleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for BundleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BundleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BundleId::parse(&s).map_err(serde::de::Error::custom)
    }
}
