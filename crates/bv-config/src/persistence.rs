//! Persistence limits for batch files.

use serde::{Deserialize, Serialize};

use crate::preset::BatchSizePreset;

/// Writers stop reusing a batch slightly before the window ends...
const WRITE_WINDOW_FACTOR: f64 = 0.95;
/// ...and readers wait slightly longer, so the two never overlap.
const READ_WINDOW_FACTOR: f64 = 1.05;

/// Limits applied by the file orchestrator and the batch writer.
///
/// Sizes are in bytes, durations in milliseconds. A `max_batch_count` of 0
/// means the number of files is unbounded (only `max_disk_space` applies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Batches younger than this accept appends and are not readable.
    pub recent_delay_ms: u64,

    /// A batch file at or above this size is rotated.
    pub max_batch_size: u64,

    /// Largest single event payload or batch metadata blob.
    pub max_item_size: u64,

    /// A batch holding this many events is rotated.
    pub max_items_per_batch: u64,

    /// Batches older than this are deleted without being uploaded.
    pub old_file_threshold_ms: u64,

    /// Total bytes (batches + metadata) kept per consent bucket.
    pub max_disk_space: u64,

    /// Maximum number of batch files per consent bucket (0 = unlimited).
    pub max_batch_count: u64,

    /// Minimum delay between two footprint/obsolescence sweeps.
    pub cleanup_frequency_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            recent_delay_ms: BatchSizePreset::default().window_duration_ms(),
            max_batch_size: 4 * 1024 * 1024,      // 4 MiB
            max_item_size: 512 * 1024,            // 512 KiB
            max_items_per_batch: 500,
            old_file_threshold_ms: 18 * 60 * 60 * 1000, // 18 hours
            max_disk_space: 512 * 1024 * 1024,           // 512 MiB
            max_batch_count: 0,
            cleanup_frequency_ms: 5_000,
        }
    }
}

impl PersistenceConfig {
    /// Window during which a writer may keep appending to the latest batch.
    pub fn recent_write_window_ms(&self) -> u64 {
        (self.recent_delay_ms as f64 * WRITE_WINDOW_FACTOR).round() as u64
    }

    /// Minimum age before a reader may pick up a batch.
    pub fn recent_read_window_ms(&self) -> u64 {
        (self.recent_delay_ms as f64 * READ_WINDOW_FACTOR).round() as u64
    }

    /// Use the recent window of a preset.
    pub fn with_preset(mut self, preset: BatchSizePreset) -> Self {
        self.recent_delay_ms = preset.window_duration_ms();
        self
    }

    /// Set a custom recent window.
    pub fn with_recent_delay_ms(mut self, delay_ms: u64) -> Self {
        self.recent_delay_ms = delay_ms;
        self
    }

    /// Set the maximum batch file size.
    pub fn with_max_batch_size(mut self, bytes: u64) -> Self {
        self.max_batch_size = bytes;
        self
    }

    /// Set the maximum item size.
    pub fn with_max_item_size(mut self, bytes: u64) -> Self {
        self.max_item_size = bytes;
        self
    }

    /// Set the maximum number of events per batch.
    pub fn with_max_items_per_batch(mut self, count: u64) -> Self {
        self.max_items_per_batch = count;
        self
    }

    /// Set the obsolescence threshold.
    pub fn with_old_file_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.old_file_threshold_ms = threshold_ms;
        self
    }

    /// Set the per-bucket disk budget.
    pub fn with_max_disk_space(mut self, bytes: u64) -> Self {
        self.max_disk_space = bytes;
        self
    }

    /// Set the per-bucket file count budget (0 = unlimited).
    pub fn with_max_batch_count(mut self, count: u64) -> Self {
        self.max_batch_count = count;
        self
    }

    /// Set the cleanup throttle.
    pub fn with_cleanup_frequency_ms(mut self, frequency_ms: u64) -> Self {
        self.cleanup_frequency_ms = frequency_ms;
        self
    }
}

/// Per-feature partial overrides of [`PersistenceConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<BatchSizePreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_item_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_per_batch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_file_threshold_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_disk_space: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch_count: Option<u64>,
}

impl PersistenceOverrides {
    /// Layer these overrides on top of `base`.
    pub fn apply(&self, base: &PersistenceConfig) -> PersistenceConfig {
        let mut config = base.clone();
        if let Some(preset) = self.batch_size {
            config.recent_delay_ms = preset.window_duration_ms();
        }
        if let Some(v) = self.max_batch_size {
            config.max_batch_size = v;
        }
        if let Some(v) = self.max_item_size {
            config.max_item_size = v;
        }
        if let Some(v) = self.max_items_per_batch {
            config.max_items_per_batch = v;
        }
        if let Some(v) = self.old_file_threshold_ms {
            config.old_file_threshold_ms = v;
        }
        if let Some(v) = self.max_disk_space {
            config.max_disk_space = v;
        }
        if let Some(v) = self.max_batch_count {
            config.max_batch_count = v;
        }
        config
    }
}
