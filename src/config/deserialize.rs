// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles non-empty component lists and human-readable byte sizes.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::ComponentName;

pub fn deserialize_components<'de, D>(deserializer: D) -> Result<NonEmpty<ComponentName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<ComponentName> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one component is required"))
}

pub fn deserialize_byte_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SizeEntry {
        Bytes(u64),
        Text(String),
    }

    match SizeEntry::deserialize(deserializer)? {
        SizeEntry::Bytes(n) => Ok(n),
        SizeEntry::Text(s) => parse_byte_size(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid byte size: {}", s))),
    }
}

/// Parse a size string like "512m", "1G" or "1GiB" into bytes.
pub fn parse_byte_size(input: &str) -> Option<u64> {
    let lower = input.trim().to_lowercase();
    let spec = lower
        .strip_suffix("ib")
        .or_else(|| lower.strip_suffix('b'))
        .unwrap_or(lower.as_str());

    let (num_str, multiplier) = if let Some(n) = spec.strip_suffix('t') {
        (n, 1024u64 * 1024 * 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = spec.strip_suffix('k') {
        (n, 1024)
    } else {
        (spec, 1)
    };

    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}
