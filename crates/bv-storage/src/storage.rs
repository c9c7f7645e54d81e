//! Consent-aware storage façade for one feature.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bv_common::{
    BatchId, ConsentObserver, ConsentProvider, ConsentState, Error, FeatureName, Result,
    Subscription,
};
use bv_config::{validate_storage, PersistenceConfig, StorageConfig};
use tracing::{debug, info, Level};

use crate::context::StorageContext;
use crate::event::BatchData;
use crate::fs_util;
use crate::logging::{log_internal, LogTarget};
use crate::metrics::RemovalReason;
use crate::migration;
use crate::orchestrator::BatchFileOrchestrator;
use crate::worker::{FeatureWorker, SubmitError};
use crate::writer::{EventBatchWriter, FileEventBatchWriter};
use crate::{GRANTED_DIR, PENDING_DIR};

/// State owned by a feature worker. Only ever touched from its thread.
pub(crate) struct StorageCore {
    feature: FeatureName,
    config: PersistenceConfig,
    ctx: StorageContext,
    consent: Arc<ConsentProvider>,
    granted: BatchFileOrchestrator,
    pending: BatchFileOrchestrator,
    /// Batches handed to the uploader and not yet confirmed.
    checked_out: HashSet<PathBuf>,
}

impl StorageCore {
    fn write(&mut self, force_new: bool, callback: impl FnOnce(&EventBatchWriter)) {
        let consent = self.consent.current();
        let writer = match consent {
            ConsentState::NotGranted => EventBatchWriter::NotGranted,
            ConsentState::Granted | ConsentState::Pending => {
                let max_item_size = self.config.max_item_size;
                let codec = self.ctx.codec.clone();
                let orchestrator = match consent {
                    ConsentState::Granted => &mut self.granted,
                    _ => &mut self.pending,
                };
                match orchestrator.get_writable_file(force_new, &self.checked_out) {
                    Some(batch) => {
                        let metadata = orchestrator.get_metadata_file(&batch);
                        EventBatchWriter::Active(FileEventBatchWriter::new(
                            batch,
                            metadata,
                            max_item_size,
                            codec,
                        ))
                    }
                    None => EventBatchWriter::Unavailable,
                }
            }
        };
        callback(&writer);
    }

    fn read_next(&mut self) -> Option<BatchData> {
        let batch = self.granted.get_readable_file(&self.checked_out)?;
        let metadata_file = self.granted.get_metadata_file(&batch);
        self.checked_out.insert(batch.clone());

        let events = match fs_util::read_bytes(&batch) {
            Ok(bytes) => self.ctx.codec.decode_events(&bytes),
            Err(e) => {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::Maintainer, LogTarget::Telemetry],
                    &format!("Unable to read batch {}: {}", batch.display(), e),
                );
                Vec::new()
            }
        };
        let metadata = metadata_file
            .filter(|path| path.exists())
            .and_then(|path| fs_util::read_bytes(&path).ok())
            .and_then(|bytes| self.ctx.codec.decode_metadata(&bytes));

        Some(BatchData {
            id: BatchId::from_path(&batch),
            events,
            metadata,
        })
    }

    fn confirm(&mut self, id: &BatchId, reason: RemovalReason, delete: bool) {
        let Some(batch) = self.checked_out.iter().find(|f| id.matches(f)).cloned() else {
            debug!(feature = %self.feature, batch = %id, "confirm for a batch that is not checked out");
            return;
        };

        if delete && !self.granted.delete_batch(&batch, reason) {
            log_internal(
                Level::WARN,
                &[LogTarget::Maintainer],
                &format!("Unable to delete batch {}", batch.display()),
            );
        }
        // Released even when the delete failed, so the batch can be retried
        self.checked_out.remove(&batch);
    }

    fn drop_all(&mut self) {
        let granted = self.granted.drop_all();
        let pending = self.pending.drop_all();
        self.checked_out.clear();
        info!(feature = %self.feature, granted, pending, "all batches dropped");
    }

    fn on_consent_updated(&mut self, previous: ConsentState, current: ConsentState) {
        debug!(feature = %self.feature, %previous, %current, "consent transition");
        migration::migrate(previous, current, &mut self.pending, &mut self.granted);
    }

    fn purge_pending(&mut self) {
        let wiped = self.pending.wipe();
        if wiped > 0 {
            info!(feature = %self.feature, wiped, "pending batches from a previous session purged");
        }
    }
}

/// Forwards consent transitions onto the feature worker.
struct ConsentForwarder {
    feature: FeatureName,
    worker: Weak<FeatureWorker<StorageCore>>,
}

impl ConsentObserver for ConsentForwarder {
    fn on_consent_updated(&self, previous: ConsentState, current: ConsentState) {
        if let Some(worker) = self.worker.upgrade() {
            schedule(&worker, &self.feature, "Consent migration", move |core| {
                core.on_consent_updated(previous, current)
            });
        }
    }
}

fn schedule<F>(
    worker: &FeatureWorker<StorageCore>,
    feature: &FeatureName,
    operation: &str,
    task: F,
) -> bool
where
    F: FnOnce(&mut StorageCore) + Send + 'static,
{
    match worker.submit(task) {
        Ok(()) => true,
        Err(e) => {
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!(
                    "Unable to schedule {} task on the executor for {}: {}",
                    operation, feature, e
                ),
            );
            false
        }
    }
}

/// Durable, consent-aware event staging for one feature.
///
/// Every method only queues work on the feature worker or waits for it;
/// none of them return errors. Failures are logged and turn into a
/// definite empty or no-op result.
pub struct ConsentAwareStorage {
    // Dropped first so no transition is queued while the worker stops
    subscription: Option<Subscription>,
    worker: Arc<FeatureWorker<StorageCore>>,
    feature: FeatureName,
    feature_dir: PathBuf,
}

impl ConsentAwareStorage {
    /// Create the storage of `feature` under `config.root_dir`.
    pub fn new(
        feature: FeatureName,
        config: &StorageConfig,
        consent: Arc<ConsentProvider>,
    ) -> Result<Self> {
        let ctx = StorageContext::from_config(config, &feature)?;
        Self::with_context(feature, config, consent, ctx)
    }

    /// Same as [`ConsentAwareStorage::new`] with explicit collaborators.
    pub fn with_context(
        feature: FeatureName,
        config: &StorageConfig,
        consent: Arc<ConsentProvider>,
        ctx: StorageContext,
    ) -> Result<Self> {
        validate_storage(config).map_err(|e| Error::Config(e.to_string()))?;
        let feature_dir = config.feature_dir(&feature);
        fs_util::ensure_writable_dir(&feature_dir)?;

        let persistence = config.effective_persistence(&feature);
        let core = StorageCore {
            feature: feature.clone(),
            granted: BatchFileOrchestrator::new(
                feature_dir.join(GRANTED_DIR),
                persistence.clone(),
                ctx.clone(),
            ),
            pending: BatchFileOrchestrator::new(
                feature_dir.join(PENDING_DIR),
                persistence.clone(),
                ctx.clone(),
            ),
            config: persistence,
            ctx,
            consent: consent.clone(),
            checked_out: HashSet::new(),
        };

        let worker = Arc::new(FeatureWorker::spawn(
            feature.as_str(),
            core,
            config.queue_capacity,
            config.shutdown_timeout(),
        )?);

        if config.purge_pending_on_start {
            schedule(&worker, &feature, "Pending purge", StorageCore::purge_pending);
        }

        let subscription = consent.subscribe(Arc::new(ConsentForwarder {
            feature: feature.clone(),
            worker: Arc::downgrade(&worker),
        }));

        info!(feature = %feature, dir = %feature_dir.display(), "storage ready");
        Ok(ConsentAwareStorage {
            subscription: Some(subscription),
            worker,
            feature,
            feature_dir,
        })
    }

    pub fn feature(&self) -> &FeatureName {
        &self.feature
    }

    pub fn granted_dir(&self) -> PathBuf {
        self.feature_dir.join(GRANTED_DIR)
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.feature_dir.join(PENDING_DIR)
    }

    pub fn feature_dir(&self) -> &Path {
        &self.feature_dir
    }

    /// Run `callback` with a writer for the current batch.
    ///
    /// The callback runs on the feature worker, so everything it does
    /// (including metadata read-modify-write) is atomic with respect to
    /// other storage operations of this feature. If the task cannot be
    /// queued, the callback is never invoked.
    pub fn write_current_batch<F>(&self, force_new: bool, callback: F)
    where
        F: FnOnce(&EventBatchWriter) + Send + 'static,
    {
        schedule(&self.worker, &self.feature, "Data write", move |core| {
            core.write(force_new, callback)
        });
    }

    /// Next batch ready for upload, checked out until confirmed.
    ///
    /// Blocks until the worker has run every previously submitted task.
    /// Only granted data is ever returned.
    pub fn read_next_batch(&self) -> Option<BatchData> {
        match self.worker.submit_and_wait(StorageCore::read_next) {
            Ok(batch) => batch,
            Err(SubmitError::Reentrant) => {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::User, LogTarget::Maintainer],
                    "read_next_batch called from inside a storage callback",
                );
                None
            }
            Err(e) => {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::Maintainer, LogTarget::Telemetry],
                    &format!("Unable to read next batch for {}: {}", self.feature, e),
                );
                None
            }
        }
    }

    /// Release a checked-out batch, deleting it first when `delete` is set.
    pub fn confirm_batch_read(&self, id: &BatchId, reason: RemovalReason, delete: bool) {
        let id = id.clone();
        schedule(&self.worker, &self.feature, "Batch confirmation", move |core| {
            core.confirm(&id, reason, delete)
        });
    }

    /// Delete every batch of both buckets, checked out or not.
    pub fn drop_all(&self) {
        schedule(&self.worker, &self.feature, "Drop all", StorageCore::drop_all);
    }

    /// Apply the data migration for a consent transition.
    ///
    /// Transitions of the shared [`ConsentProvider`] are forwarded here
    /// automatically.
    pub fn on_consent_updated(&self, previous: ConsentState, current: ConsentState) {
        schedule(&self.worker, &self.feature, "Consent migration", move |core| {
            core.on_consent_updated(previous, current)
        });
    }

    /// Wait until every task submitted so far has run.
    pub fn flush(&self) -> bool {
        self.worker.submit_and_wait(|_| ()).is_ok()
    }

    /// Stop observing consent and drain the queue within `timeout`.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.subscription.take();
        self.worker.shutdown(timeout)
    }
}

impl std::fmt::Debug for ConsentAwareStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentAwareStorage")
            .field("feature", &self.feature)
            .field("feature_dir", &self.feature_dir)
            .field("worker", &self.worker)
            .finish()
    }
}
