//! Feature and batch identity types.
//!
//! A batch is identified by the name of its file, which is the creation
//! timestamp in milliseconds since the Unix epoch. Metadata files share
//! the batch name with a `_metadata` suffix.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Error;

/// Suffix appended to a batch file name to build its metadata file name.
pub const METADATA_SUFFIX: &str = "_metadata";

/// Name of a telemetry stream with its own storage root and task queue.
///
/// Format: non-empty, at most 64 chars of `[a-z0-9_-]`.
/// Example: `logs`, `rum`, `session-replay`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureName(String);

impl FeatureName {
    /// Maximum accepted length.
    pub const MAX_LEN: usize = 64;

    /// Parse and validate a feature name.
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(Error::InvalidFeatureName(s.to_string()));
        }
        if !s
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_' | '-'))
        {
            return Err(Error::InvalidFeatureName(s.to_string()));
        }
        Ok(FeatureName(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FeatureName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FeatureName::parse(&value)
    }
}

impl From<FeatureName> for String {
    fn from(name: FeatureName) -> Self {
        name.0
    }
}

/// Identifier of a batch handed to an uploader.
///
/// Derived from the batch file name, so it survives process restarts and
/// stays stable while the file lives in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Build the id of the batch stored at `path`.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        BatchId(name)
    }

    /// Whether `path` points at the batch this id was built from.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name.to_string_lossy() == self.0)
    }

    /// Creation timestamp encoded in the batch name, if well formed.
    pub fn timestamp_millis(&self) -> Option<u64> {
        parse_batch_timestamp(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse the creation timestamp out of a batch file name.
///
/// Returns `None` for metadata files, temp files and anything that is not
/// a plain decimal number.
pub fn parse_batch_timestamp(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Metadata file name for a batch file name.
pub fn metadata_file_name(batch_name: &str) -> String {
    format!("{}{}", batch_name, METADATA_SUFFIX)
}
