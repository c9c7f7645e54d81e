//! Batch lifecycle metrics.
//!
//! The storage reports every batch deletion and every rotation to a
//! [`MetricsSink`]. Sinks are fire-and-forget: they run on the feature
//! worker and must not block or fail storage operations.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bv_common::{Error, FeatureName, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::logging::{MAINTAINER_TARGET, TELEMETRY_TARGET};

/// Why a batch was removed from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RemovalReason {
    /// The intake answered with this HTTP status.
    IntakeCode { code: u16 },
    /// The batch could not be decoded or was rejected as invalid.
    Invalid,
    /// Evicted to keep the bucket under its footprint limits.
    Purged,
    /// Older than the obsolescence threshold.
    Obsolete,
    /// Wiped by a data-clearing request.
    Flushed,
}

impl RemovalReason {
    /// Whether sampling-oriented sinks should report this removal.
    ///
    /// Flushes are requested by the host, not caused by storage health.
    pub fn includes_in_metrics(&self) -> bool {
        !matches!(self, RemovalReason::Flushed)
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalReason::IntakeCode { code } => write!(f, "intake-code-{}", code),
            RemovalReason::Invalid => write!(f, "invalid"),
            RemovalReason::Purged => write!(f, "purged"),
            RemovalReason::Obsolete => write!(f, "obsolete"),
            RemovalReason::Flushed => write!(f, "flushed"),
        }
    }
}

/// State of a batch at the moment the writer rotated away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchClosedInfo {
    /// Last time a writer was handed this batch (ms since epoch).
    pub last_used_ms: u64,
    /// Writer sessions opened on this batch.
    pub events_count: u64,
    /// Whether rotation was requested by the producer.
    pub forced_new: bool,
}

/// Receiver of batch lifecycle events.
pub trait MetricsSink: Send + Sync {
    fn on_batch_deleted(&self, batch: &Path, reason: &RemovalReason, remaining_pending: u64);

    fn on_batch_closed(&self, batch: &Path, info: &BatchClosedInfo);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsSink for NoOpMetrics {
    fn on_batch_deleted(&self, _batch: &Path, _reason: &RemovalReason, _remaining_pending: u64) {}

    fn on_batch_closed(&self, _batch: &Path, _info: &BatchClosedInfo) {}
}

/// Emits one structured log line per event on the telemetry target.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    feature: Option<String>,
}

impl TracingMetrics {
    pub fn new(feature: &FeatureName) -> Self {
        TracingMetrics {
            feature: Some(feature.to_string()),
        }
    }
}

impl MetricsSink for TracingMetrics {
    fn on_batch_deleted(&self, batch: &Path, reason: &RemovalReason, remaining_pending: u64) {
        if !reason.includes_in_metrics() {
            return;
        }
        info!(
            target: TELEMETRY_TARGET,
            feature = self.feature.as_deref().unwrap_or(""),
            batch = %batch.display(),
            reason = %reason,
            remaining_pending,
            "batch deleted"
        );
    }

    fn on_batch_closed(&self, batch: &Path, info: &BatchClosedInfo) {
        info!(
            target: TELEMETRY_TARGET,
            feature = self.feature.as_deref().unwrap_or(""),
            batch = %batch.display(),
            last_used_ms = info.last_used_ms,
            events_count = info.events_count,
            forced_new = info.forced_new,
            "batch closed"
        );
    }
}

/// A deletion observed by [`InMemoryMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionEvent {
    pub batch: PathBuf,
    pub reason: RemovalReason,
    pub remaining_pending: u64,
}

/// Keeps every event in memory, for inspection by the host.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    deleted: Mutex<Vec<DeletionEvent>>,
    closed: Mutex<Vec<(PathBuf, BatchClosedInfo)>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        InMemoryMetrics::default()
    }

    pub fn deleted(&self) -> Vec<DeletionEvent> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn closed(&self) -> Vec<(PathBuf, BatchClosedInfo)> {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deleted batches carrying `reason`.
    pub fn deleted_with(&self, reason: &RemovalReason) -> Vec<PathBuf> {
        self.deleted()
            .into_iter()
            .filter(|event| &event.reason == reason)
            .map(|event| event.batch)
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn on_batch_deleted(&self, batch: &Path, reason: &RemovalReason, remaining_pending: u64) {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DeletionEvent {
                batch: batch.to_path_buf(),
                reason: reason.clone(),
                remaining_pending,
            });
    }

    fn on_batch_closed(&self, batch: &Path, info: &BatchClosedInfo) {
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((batch.to_path_buf(), *info));
    }
}

/// One line of the deletion log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchDeletionRecord {
    pub timestamp: DateTime<Utc>,
    pub feature: String,
    /// Batch file name.
    pub batch: String,
    pub reason: RemovalReason,
    pub remaining_pending: u64,
}

/// Appends one JSON line per deleted batch, so no deletion goes unrecorded.
///
/// Every reason is written, including flushes. Records are stamped with
/// the storage clock so they line up with batch names.
pub struct JsonlMetricsSink {
    feature: String,
    path: PathBuf,
    clock: Arc<dyn Clock>,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlMetricsSink {
    /// Open (or create) `<log_dir>/batch_events_<feature>.jsonl` for appending.
    pub fn open(log_dir: &Path, feature: &FeatureName, clock: Arc<dyn Clock>) -> Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("batch_events_{}.jsonl", feature));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "batch deletion log opened");
        Ok(JsonlMetricsSink {
            feature: feature.to_string(),
            path,
            clock,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.clock.now_millis()).unwrap_or(i64::MAX);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn persist(&self, record: &BatchDeletionRecord) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Debug for JsonlMetricsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonlMetricsSink")
            .field("feature", &self.feature)
            .field("path", &self.path)
            .finish()
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn on_batch_deleted(&self, batch: &Path, reason: &RemovalReason, remaining_pending: u64) {
        let record = BatchDeletionRecord {
            timestamp: self.timestamp(),
            feature: self.feature.clone(),
            batch: batch
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            reason: reason.clone(),
            remaining_pending,
        };
        if let Err(e) = self.persist(&record) {
            warn!(
                target: MAINTAINER_TARGET,
                path = %self.path.display(),
                error = %e,
                "failed to append batch deletion record"
            );
        }
    }

    fn on_batch_closed(&self, _batch: &Path, _info: &BatchClosedInfo) {}
}

/// Read back a deletion log.
pub fn read_deletion_log(path: &Path) -> Result<Vec<BatchDeletionRecord>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<BatchDeletionRecord>(line).map_err(Error::from))
        .collect()
}
