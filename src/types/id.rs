// ABOUTME: Phantom-typed identifiers for containers, image versions and update runs.
// ABOUTME: All three are opaque strings; the marker keeps them from being swapped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub enum ContainerMarker {}
pub enum ImageMarker {}
pub enum RunMarker {}

/// An opaque identifier tagged with what it identifies.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

/// Container handle used for exec calls.
pub type ContainerId = Id<ContainerMarker>;
/// Version identifier of a component: the image ID its container runs.
pub type ImageId = Id<ImageMarker>;
/// Identifier of one update run; also the stem of its record file.
pub type RunId = Id<RunMarker>;

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl ImageId {
    /// First 12 hex characters of the digest, as `docker images` shows them.
    pub fn short(&self) -> &str {
        let hex = self.value.strip_prefix("sha256:").unwrap_or(&self.value);
        hex.get(..12).unwrap_or(hex)
    }
}

impl RunId {
    /// Millisecond resolution so back-to-back runs get distinct records.
    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self::new(format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")))
    }
}

// Written by hand so that T needs no bounds.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn short_trims_digest() {
        assert_eq!(ImageId::new("sha256:0123456789abcdef").short(), "0123456789ab");
        assert_eq!(ImageId::new("abc").short(), "abc");
    }

    #[test]
    fn run_id_carries_milliseconds() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(RunId::at(at).as_str(), "run-20250601T120000.042Z");
    }
}
