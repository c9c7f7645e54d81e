//! Consent-aware batching storage for telemetry events.
//!
//! Producers append events to on-disk batches through
//! [`ConsentAwareStorage::write_current_batch`]; a single uploader drains
//! them with [`ConsentAwareStorage::read_next_batch`] and
//! [`ConsentAwareStorage::confirm_batch_read`]. Every mutating operation of
//! one feature runs on that feature's [`FeatureWorker`], so appends,
//! metadata read-modify-write cycles, reads and deletions never interleave.
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<feature>/granted/<timestamp>
//! <root>/<feature>/granted/<timestamp>_metadata
//! <root>/<feature>/pending/<timestamp>
//! ```

pub mod clock;
pub mod codec;
pub mod context;
pub mod event;
pub mod fs_util;
pub mod logging;
pub mod metrics;
pub mod migration;
pub mod orchestrator;
pub mod storage;
pub mod worker;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{BatchCodec, Encryption, TlvCodec};
pub use context::StorageContext;
pub use event::{BatchData, EventKind, RawEvent};
pub use metrics::{
    BatchClosedInfo, DeletionEvent, InMemoryMetrics, JsonlMetricsSink, MetricsSink, NoOpMetrics,
    RemovalReason, TracingMetrics,
};
pub use orchestrator::BatchFileOrchestrator;
pub use storage::ConsentAwareStorage;
pub use worker::{FeatureWorker, SubmitError};
pub use writer::{EventBatchWriter, FileEventBatchWriter};

/// Directory of the granted consent bucket inside a feature directory.
pub const GRANTED_DIR: &str = "granted";

/// Directory of the pending consent bucket inside a feature directory.
pub const PENDING_DIR: &str = "pending";
