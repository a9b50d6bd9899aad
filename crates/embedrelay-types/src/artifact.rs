//! Upstream artifact key parsing.
//!
//! Artifacts are write-once objects named `<timestamp>-<64-char-hash>.json`,
//! where the timestamp prefix is ISO-8601 so lexicographic key order equals
//! chronological order. Keys that don't match the convention are skipped by
//! the scanner, not treated as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Expected file extension for status artifacts.
pub const ARTIFACT_EXTENSION: &str = "json";

/// Length of the hex content hash in artifact keys.
pub const ARTIFACT_HASH_LEN: usize = 64;

/// A validated artifact key: `<ISO-8601 timestamp>-<64 hex chars>.json`.
///
/// Ordering on `ArtifactKey` is the raw key's lexicographic order, which by
/// construction is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(String);

impl ArtifactKey {
    /// Parse a raw object key against the strict naming convention.
    ///
    /// Returns `None` for anything that doesn't match; callers decide
    /// whether a non-match is "skip" (scanner) or "fall back" (dead-letter
    /// handler).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let stem = raw.strip_suffix(&format!(".{ARTIFACT_EXTENSION}"))?;
        // The hash is the fixed-width suffix; everything before the joining
        // dash is the timestamp.
        if stem.len() < ARTIFACT_HASH_LEN + 2 {
            return None;
        }
        let (prefix, hash) = stem.split_at(stem.len() - ARTIFACT_HASH_LEN);
        let timestamp = prefix.strip_suffix('-')?;
        if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        DateTime::parse_from_rfc3339(timestamp).ok()?;
        Some(Self(raw.to_string()))
    }

    /// Borrow the raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ISO-8601 timestamp portion of the key.
    #[must_use]
    pub fn timestamp_str(&self) -> &str {
        let stem_len = self.0.len() - ARTIFACT_EXTENSION.len() - 1;
        // Key validity is established in `parse`; the slice bounds hold.
        &self.0[..stem_len - ARTIFACT_HASH_LEN - 1]
    }

    /// The timestamp portion parsed to UTC.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(self.timestamp_str())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default()
    }

    /// The 64-char hex content hash portion of the key.
    #[must_use]
    pub fn hash_str(&self) -> &str {
        let stem_len = self.0.len() - ARTIFACT_EXTENSION.len() - 1;
        &self.0[stem_len - ARTIFACT_HASH_LEN..stem_len]
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
