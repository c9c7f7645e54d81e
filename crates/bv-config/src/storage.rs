//! Storage-wide configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bv_common::FeatureName;
use serde::{Deserialize, Serialize};

use crate::persistence::{PersistenceConfig, PersistenceOverrides};

/// Configuration shared by every feature storage of one host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each feature gets `<root>/<feature>/<bucket>/`.
    pub root_dir: PathBuf,

    /// Limits used by features without an override.
    pub persistence: PersistenceConfig,

    /// Per-feature overrides keyed by feature name.
    pub features: HashMap<String, PersistenceOverrides>,

    /// Maximum number of queued tasks per feature before submissions are rejected.
    pub queue_capacity: usize,

    /// How long shutdown waits for queued tasks to drain.
    pub shutdown_timeout_ms: u64,

    /// Wipe the pending bucket when a storage is created.
    pub purge_pending_on_start: bool,

    /// Directory for the JSONL batch deletion log (None disables it).
    pub event_log_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root_dir: default_storage_dir(),
            persistence: PersistenceConfig::default(),
            features: HashMap::new(),
            queue_capacity: 1024,
            shutdown_timeout_ms: 5_000,
            purge_pending_on_start: true,
            event_log_dir: None,
        }
    }
}

impl StorageConfig {
    /// Create config with defaults rooted at `root_dir`.
    pub fn new(root_dir: PathBuf) -> Self {
        StorageConfig {
            root_dir,
            ..Default::default()
        }
    }

    /// Limits in effect for `feature` (base config plus its override, if any).
    pub fn effective_persistence(&self, feature: &FeatureName) -> PersistenceConfig {
        match self.features.get(feature.as_str()) {
            Some(overrides) => overrides.apply(&self.persistence),
            None => self.persistence.clone(),
        }
    }

    /// Shutdown drain timeout as a Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Directory of one feature.
    pub fn feature_dir(&self, feature: &FeatureName) -> PathBuf {
        self.root_dir.join(feature.as_str())
    }

    /// Replace the base persistence limits.
    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// Register a per-feature override.
    pub fn with_feature_override(
        mut self,
        feature: &FeatureName,
        overrides: PersistenceOverrides,
    ) -> Self {
        self.features.insert(feature.as_str().to_string(), overrides);
        self
    }

    /// Set the task queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the shutdown drain timeout.
    pub fn with_shutdown_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.shutdown_timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable the startup pending purge.
    pub fn with_purge_pending_on_start(mut self, enabled: bool) -> Self {
        self.purge_pending_on_start = enabled;
        self
    }

    /// Write a JSONL deletion log into `dir`.
    pub fn with_event_log_dir(mut self, dir: PathBuf) -> Self {
        self.event_log_dir = Some(dir);
        self
    }
}

/// Default storage root under the XDG data dir.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("batchvault")
        .join("storage")
}
