//! Batch file selection for one consent bucket.
//!
//! Batches are named after their creation time in milliseconds, so sorting
//! names numerically gives creation order. Freshness drives everything:
//!
//! - a writer keeps appending to the batch it last created while that
//!   batch is younger than the write window and under its limits
//! - a reader only sees batches older than the read window, which is
//!   slightly longer than the write window so the two never overlap
//! - batches older than the obsolescence threshold are deleted
//!
//! Every method takes `&mut self`: an orchestrator is owned by its feature
//! worker and never shared between threads.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bv_common::id::{metadata_file_name, parse_batch_timestamp};
use bv_config::PersistenceConfig;
use tracing::{debug, Level};

use crate::context::StorageContext;
use crate::fs_util;
use crate::logging::{log_internal, LogTarget};
use crate::metrics::{BatchClosedInfo, RemovalReason};

#[derive(Debug)]
pub struct BatchFileOrchestrator {
    root: PathBuf,
    config: PersistenceConfig,
    ctx: StorageContext,

    /// Last batch created by this instance, the only one eligible for reuse.
    previous_file: Option<PathBuf>,
    previous_file_item_count: u64,
    last_file_access_ms: u64,

    last_name_ms: u64,
    last_cleanup_ms: Option<u64>,
    pending_files: u64,
}

impl BatchFileOrchestrator {
    pub fn new(root: PathBuf, config: PersistenceConfig, ctx: StorageContext) -> Self {
        BatchFileOrchestrator {
            root,
            config,
            ctx,
            previous_file: None,
            previous_file_item_count: 0,
            last_file_access_ms: 0,
            last_name_ms: 0,
            last_cleanup_ms: None,
            pending_files: 0,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// File the next events should be appended to.
    ///
    /// Returns `None` only when the root directory is unusable.
    pub fn get_writable_file(
        &mut self,
        force_new: bool,
        checked_out: &HashSet<PathBuf>,
    ) -> Option<PathBuf> {
        if !self.is_root_valid() {
            return None;
        }

        let now = self.ctx.now_millis();
        if self.cleanup_due(now) {
            self.delete_obsolete_files(now, checked_out);
            self.free_space_if_needed(checked_out, false);
            self.last_cleanup_ms = Some(now);
        }

        if !force_new {
            if let Some(file) = self.reusable_file(now) {
                return Some(file);
            }
        }

        Some(self.create_new_file(now, force_new, checked_out))
    }

    /// Metadata file of `batch`. The file itself is created on first write.
    pub fn get_metadata_file(&self, batch: &Path) -> Option<PathBuf> {
        if batch.parent() != Some(self.root.as_path()) {
            log_internal(
                Level::DEBUG,
                &[LogTarget::Maintainer],
                &format!(
                    "{} is not a batch of {}",
                    batch.display(),
                    self.root.display()
                ),
            );
            return None;
        }
        let name = batch.file_name()?.to_str()?;
        if parse_batch_timestamp(name).is_none() {
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!("Requested metadata of a non-batch file: {}", batch.display()),
            );
            return None;
        }
        Some(self.root.join(metadata_file_name(name)))
    }

    /// Oldest batch that is old enough to read and not in `exclude`.
    pub fn get_readable_file(&mut self, exclude: &HashSet<PathBuf>) -> Option<PathBuf> {
        if !self.is_root_valid() {
            return None;
        }

        let now = self.ctx.now_millis();
        self.delete_obsolete_files(now, exclude);

        let files = self.list_batch_files();
        self.pending_files = files.len() as u64;

        let threshold = now.saturating_sub(self.config.recent_read_window_ms());
        files
            .into_iter()
            .find(|(timestamp, path)| *timestamp < threshold && !exclude.contains(path))
            .map(|(_, path)| path)
    }

    /// Every batch file of this bucket, oldest first.
    pub fn get_all_files(&mut self) -> Vec<PathBuf> {
        if !self.is_root_valid() {
            return Vec::new();
        }
        self.list_batch_files()
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Delete every batch (reported as flushed) and any leftover file.
    ///
    /// Returns the number of batches deleted.
    pub fn drop_all(&mut self) -> usize {
        self.clear(Some(RemovalReason::Flushed))
    }

    /// Delete every file of the bucket without reporting anything.
    pub(crate) fn wipe(&mut self) -> usize {
        self.clear(None)
    }

    fn clear(&mut self, reason: Option<RemovalReason>) -> usize {
        let mut deleted = 0;
        for file in self.get_all_files() {
            let removed = match &reason {
                Some(reason) => self.delete_batch(&file, reason.clone()),
                None => self.remove_batch_files(&file),
            };
            if removed {
                deleted += 1;
            }
        }

        // Orphan metadata and interrupted move temp files
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if entry.file_type().is_ok_and(|t| t.is_file()) {
                    fs_util::delete_logged(&entry.path());
                }
            }
        }

        self.previous_file = None;
        self.previous_file_item_count = 0;
        deleted
    }

    /// Delete a batch and its metadata, reporting it to the metrics sink.
    ///
    /// Returns false (and reports nothing) when the batch could not be
    /// removed.
    pub fn delete_batch(&mut self, batch: &Path, reason: RemovalReason) -> bool {
        if !self.remove_batch_files(batch) {
            return false;
        }
        let remaining = self.decrement_and_get_pending_files_count();
        self.ctx.metrics.on_batch_deleted(batch, &reason, remaining);
        true
    }

    /// Delete a batch and its metadata without reporting it.
    pub(crate) fn remove_batch_files(&mut self, batch: &Path) -> bool {
        let deleted = fs_util::delete_logged(batch);
        if deleted || !batch.exists() {
            if let Some(meta) = self.get_metadata_file(batch) {
                if meta.exists() {
                    fs_util::delete_logged(&meta);
                }
            }
        }
        deleted
    }

    /// Batches left after one deletion; only feeds metrics.
    pub fn decrement_and_get_pending_files_count(&mut self) -> u64 {
        self.pending_files = self.pending_files.saturating_sub(1);
        self.pending_files
    }

    fn is_root_valid(&self) -> bool {
        match fs_util::ensure_writable_dir(&self.root) {
            Ok(()) => true,
            Err(e) => {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::User, LogTarget::Maintainer, LogTarget::Telemetry],
                    &format!("Batch directory unusable: {}", e),
                );
                false
            }
        }
    }

    fn cleanup_due(&self, now: u64) -> bool {
        self.last_cleanup_ms
            .map_or(true, |last| now.saturating_sub(last) > self.config.cleanup_frequency_ms)
    }

    fn reusable_file(&mut self, now: u64) -> Option<PathBuf> {
        let previous = self.previous_file.clone()?;
        let previous_ts = previous
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_batch_timestamp)?;

        // Something newer (a migrated batch, another process) takes precedence
        let newest = self.list_batch_files().last().map(|(ts, _)| *ts);
        if newest.is_some_and(|ts| ts > previous_ts) {
            return None;
        }

        let is_recent = previous_ts >= now.saturating_sub(self.config.recent_write_window_ms());
        let has_room = fs_util::file_len(&previous) < self.config.max_batch_size;
        let has_slot = self.previous_file_item_count < self.config.max_items_per_batch;

        if is_recent && has_room && has_slot {
            self.previous_file_item_count += 1;
            self.last_file_access_ms = now;
            Some(previous)
        } else {
            None
        }
    }

    fn create_new_file(
        &mut self,
        now: u64,
        force_new: bool,
        checked_out: &HashSet<PathBuf>,
    ) -> PathBuf {
        self.free_space_if_needed(checked_out, true);

        let newest = self.list_batch_files().last().map(|(ts, _)| *ts);
        let mut name_ms = now.max(self.last_name_ms + 1);
        if let Some(ts) = newest {
            name_ms = name_ms.max(ts + 1);
        }
        // An orphaned metadata file would be adopted by the new batch
        while self
            .root
            .join(metadata_file_name(&name_ms.to_string()))
            .exists()
        {
            name_ms += 1;
        }
        let path = self.root.join(name_ms.to_string());

        if let Some(previous) = self.previous_file.take() {
            if previous.exists() {
                self.ctx.metrics.on_batch_closed(
                    &previous,
                    &BatchClosedInfo {
                        last_used_ms: self.last_file_access_ms,
                        events_count: self.previous_file_item_count,
                        forced_new: force_new,
                    },
                );
            }
        }

        debug!(batch = %path.display(), force_new, "new batch");
        self.previous_file = Some(path.clone());
        self.previous_file_item_count = 1;
        self.last_file_access_ms = now;
        self.last_name_ms = name_ms;
        path
    }

    fn delete_obsolete_files(&mut self, now: u64, skip: &HashSet<PathBuf>) {
        let threshold = now.saturating_sub(self.config.old_file_threshold_ms);
        for (timestamp, path) in self.list_batch_files() {
            if timestamp >= threshold {
                break;
            }
            if skip.contains(&path) {
                continue;
            }
            self.delete_batch(&path, RemovalReason::Obsolete);
        }
    }

    /// Evict oldest batches until the bucket fits its byte and count budgets.
    ///
    /// With `reserve_new`, one slot is kept free for a batch about to be
    /// created. Checked-out batches are never evicted.
    fn free_space_if_needed(&mut self, checked_out: &HashSet<PathBuf>, reserve_new: bool) {
        let files: Vec<(PathBuf, u64)> = self
            .list_batch_files()
            .into_iter()
            .map(|(_, path)| {
                let meta_size = self
                    .get_metadata_file(&path)
                    .map_or(0, |meta| fs_util::file_len(&meta));
                let size = fs_util::file_len(&path) + meta_size;
                (path, size)
            })
            .collect();

        let total: u64 = files.iter().map(|(_, size)| size).sum();
        let mut bytes_to_free = total.saturating_sub(self.config.max_disk_space);
        let mut files_to_free = if self.config.max_batch_count > 0 {
            (files.len() as u64 + u64::from(reserve_new)).saturating_sub(self.config.max_batch_count)
        } else {
            0
        };

        if bytes_to_free == 0 && files_to_free == 0 {
            return;
        }
        if bytes_to_free > 0 {
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!(
                    "Too much disk space used ({}/{}): cleaning up to free {} bytes",
                    total, self.config.max_disk_space, bytes_to_free
                ),
            );
        }
        if files_to_free > 0 {
            log_internal(
                Level::WARN,
                &[LogTarget::Maintainer],
                &format!(
                    "Too many batches ({}/{}): evicting {}",
                    files.len(),
                    self.config.max_batch_count,
                    files_to_free
                ),
            );
        }

        for (path, size) in files {
            if bytes_to_free == 0 && files_to_free == 0 {
                break;
            }
            if checked_out.contains(&path) {
                continue;
            }
            if self.delete_batch(&path, RemovalReason::Purged) {
                bytes_to_free = bytes_to_free.saturating_sub(size);
                files_to_free = files_to_free.saturating_sub(1);
            }
        }
    }

    /// Batch files on disk, sorted by creation timestamp.
    fn list_batch_files(&self) -> Vec<(u64, PathBuf)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::Maintainer],
                    &format!("Unable to list {}: {}", self.root.display(), e),
                );
                return Vec::new();
            }
        };

        let mut files: Vec<(u64, PathBuf)> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| {
                let timestamp = parse_batch_timestamp(entry.file_name().to_str()?)?;
                Some((timestamp, entry.path()))
            })
            .collect();
        files.sort_by_key(|(timestamp, _)| *timestamp);
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::InMemoryMetrics;
    use std::sync::Arc;
    use tempfile::TempDir;

    const START: u64 = 1_700_000_000_000;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        clock: Arc<ManualClock>,
        metrics: Arc<InMemoryMetrics>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("granted");
            Fixture {
                _dir: dir,
                root,
                clock: Arc::new(ManualClock::new(START)),
                metrics: Arc::new(InMemoryMetrics::new()),
            }
        }

        fn orchestrator(&self, config: PersistenceConfig) -> BatchFileOrchestrator {
            let ctx = StorageContext::new()
                .with_clock(self.clock.clone())
                .with_metrics(self.metrics.clone());
            BatchFileOrchestrator::new(self.root.clone(), config, ctx)
        }

        fn seed(&self, timestamp: u64, size: usize) -> PathBuf {
            fs::create_dir_all(&self.root).unwrap();
            let path = self.root.join(timestamp.to_string());
            fs::write(&path, vec![b'x'; size]).unwrap();
            path
        }
    }

    fn none() -> HashSet<PathBuf> {
        HashSet::new()
    }

    #[test]
    fn test_first_writable_file_named_after_clock() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let file = orch.get_writable_file(false, &none()).unwrap();
        assert_eq!(file, fx.root.join(START.to_string()));
        assert!(fx.root.is_dir());
    }

    #[test]
    fn test_new_batch_skips_orphaned_metadata_name() {
        let fx = Fixture::new();
        fs::create_dir_all(&fx.root).unwrap();
        let orphan = fx.root.join(metadata_file_name(&START.to_string()));
        fs::write(&orphan, b"stale").unwrap();

        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let file = orch.get_writable_file(false, &none()).unwrap();
        assert_eq!(file, fx.root.join((START + 1).to_string()));
        assert_eq!(fs::read(&orphan).unwrap(), b"stale");
    }

    #[test]
    fn test_reuse_within_write_window() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let first = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&first, b"event").unwrap();

        fx.clock.advance(4_000);
        assert_eq!(orch.get_writable_file(false, &none()).unwrap(), first);

        fx.clock.advance(1_000);
        let rotated = orch.get_writable_file(false, &none()).unwrap();
        assert_ne!(rotated, first);
        assert_eq!(fx.metrics.closed().len(), 1);
        assert_eq!(fx.metrics.closed()[0].1.events_count, 2);
    }

    #[test]
    fn test_force_new_rotates_and_reports() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let first = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&first, b"event").unwrap();

        let second = orch.get_writable_file(true, &none()).unwrap();
        assert_ne!(first, second);
        let closed = fx.metrics.closed();
        assert_eq!(closed[0].0, first);
        assert!(closed[0].1.forced_new);
    }

    #[test]
    fn test_names_stay_unique_when_clock_stands_still() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let mut seen = HashSet::new();
        for _ in 0..5 {
            let file = orch.get_writable_file(true, &none()).unwrap();
            fs::write(&file, b"x").unwrap();
            assert!(seen.insert(file));
        }
        assert_eq!(orch.get_all_files().len(), 5);
    }

    #[test]
    fn test_rotation_on_size_limit() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default().with_max_batch_size(8));
        let first = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&first, b"12345678").unwrap();
        assert_ne!(orch.get_writable_file(false, &none()).unwrap(), first);
    }

    #[test]
    fn test_rotation_on_item_count() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default().with_max_items_per_batch(2));
        let first = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&first, b"a").unwrap();
        assert_eq!(orch.get_writable_file(false, &none()).unwrap(), first);
        assert_ne!(orch.get_writable_file(false, &none()).unwrap(), first);
    }

    #[test]
    fn test_files_from_previous_session_are_not_reused() {
        let fx = Fixture::new();
        let existing = fx.seed(START - 100, 4);
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let file = orch.get_writable_file(false, &none()).unwrap();
        assert_ne!(file, existing);
    }

    #[test]
    fn test_recent_file_not_readable() {
        let fx = Fixture::new();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        let file = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&file, b"x").unwrap();

        fx.clock.advance(5_000);
        assert_eq!(orch.get_readable_file(&none()), None);

        fx.clock.advance(300);
        assert_eq!(orch.get_readable_file(&none()), Some(file));
    }

    #[test]
    fn test_readable_oldest_first_honours_exclude() {
        let fx = Fixture::new();
        let old = fx.seed(START - 60_000, 1);
        let older = fx.seed(START - 90_000, 1);
        let mut orch = fx.orchestrator(PersistenceConfig::default());

        assert_eq!(orch.get_readable_file(&none()), Some(older.clone()));
        let exclude: HashSet<PathBuf> = [older].into_iter().collect();
        assert_eq!(orch.get_readable_file(&exclude), Some(old.clone()));
        let exclude: HashSet<PathBuf> = exclude.into_iter().chain([old]).collect();
        assert_eq!(orch.get_readable_file(&exclude), None);
    }

    #[test]
    fn test_obsolete_files_deleted_on_read() {
        let fx = Fixture::new();
        let config = PersistenceConfig::default();
        let ancient = fx.seed(START - config.old_file_threshold_ms - 1, 1);
        let fresh_enough = fx.seed(START - 60_000, 1);
        let mut orch = fx.orchestrator(config);

        assert_eq!(orch.get_readable_file(&none()), Some(fresh_enough));
        assert!(!ancient.exists());
        assert_eq!(
            fx.metrics.deleted_with(&RemovalReason::Obsolete),
            vec![ancient]
        );
    }

    #[test]
    fn test_obsolete_checked_out_file_kept() {
        let fx = Fixture::new();
        let config = PersistenceConfig::default();
        let ancient = fx.seed(START - config.old_file_threshold_ms - 1, 1);
        let mut orch = fx.orchestrator(config);
        let checked_out: HashSet<PathBuf> = [ancient.clone()].into_iter().collect();

        orch.get_readable_file(&checked_out);
        assert!(ancient.exists());
    }

    #[test]
    fn test_disk_space_eviction_oldest_first_skips_checked_out() {
        let fx = Fixture::new();
        let a = fx.seed(START - 30_000, 40);
        let b = fx.seed(START - 20_000, 40);
        let c = fx.seed(START - 10_000, 40);
        let mut orch = fx.orchestrator(
            PersistenceConfig::default()
                .with_max_disk_space(100)
                .with_max_batch_size(50)
                .with_max_item_size(10),
        );
        let checked_out: HashSet<PathBuf> = [a.clone()].into_iter().collect();

        orch.get_writable_file(false, &checked_out).unwrap();

        assert!(a.exists());
        assert!(!b.exists());
        assert!(c.exists());
        assert_eq!(fx.metrics.deleted_with(&RemovalReason::Purged), vec![b]);
    }

    #[test]
    fn test_metadata_counts_towards_footprint() {
        let fx = Fixture::new();
        let a = fx.seed(START - 20_000, 30);
        let b = fx.seed(START - 10_000, 30);
        let meta = fx.root.join(metadata_file_name(&(START - 10_000).to_string()));
        fs::write(meta, vec![0; 50]).unwrap();
        let mut orch = fx.orchestrator(
            PersistenceConfig::default()
                .with_max_disk_space(100)
                .with_max_batch_size(50)
                .with_max_item_size(10),
        );

        orch.get_writable_file(false, &none()).unwrap();
        assert!(!a.exists());
        assert!(b.exists());
    }

    #[test]
    fn test_batch_count_eviction_reserves_new_file() {
        let fx = Fixture::new();
        let a = fx.seed(START - 30_000, 1);
        let b = fx.seed(START - 20_000, 1);
        let c = fx.seed(START - 10_000, 1);
        let mut orch = fx.orchestrator(PersistenceConfig::default().with_max_batch_count(3));

        let new_file = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&new_file, b"x").unwrap();

        assert!(!a.exists());
        assert!(b.exists() && c.exists());
        assert_eq!(orch.get_all_files().len(), 3);
    }

    #[test]
    fn test_cleanup_is_throttled() {
        let fx = Fixture::new();
        let config = PersistenceConfig::default();
        let threshold = config.old_file_threshold_ms;
        let mut orch = fx.orchestrator(config);

        let file = orch.get_writable_file(false, &none()).unwrap();
        fs::write(&file, b"x").unwrap();
        let stale = fx.seed(START - threshold - 1, 1);

        // Within the throttle: writable selection does not sweep
        fx.clock.advance(1_000);
        orch.get_writable_file(false, &none()).unwrap();
        assert!(stale.exists());

        fx.clock.advance(5_000);
        orch.get_writable_file(false, &none()).unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_metadata_file_path() {
        let fx = Fixture::new();
        let orch = fx.orchestrator(PersistenceConfig::default());
        let batch = fx.root.join("1234");
        assert_eq!(
            orch.get_metadata_file(&batch),
            Some(fx.root.join("1234_metadata"))
        );
        assert_eq!(orch.get_metadata_file(Path::new("/elsewhere/1234")), None);
        assert_eq!(orch.get_metadata_file(&fx.root.join("1234_metadata")), None);
    }

    #[test]
    fn test_root_that_is_a_file_yields_nothing() {
        let fx = Fixture::new();
        fs::create_dir_all(fx.root.parent().unwrap()).unwrap();
        fs::write(&fx.root, b"not a dir").unwrap();
        let mut orch = fx.orchestrator(PersistenceConfig::default());
        assert_eq!(orch.get_writable_file(false, &none()), None);
        assert_eq!(orch.get_readable_file(&none()), None);
        assert!(orch.get_all_files().is_empty());
    }

    #[test]
    fn test_drop_all_reports_flushed() {
        let fx = Fixture::new();
        let a = fx.seed(START - 20_000, 1);
        fx.seed(START - 10_000, 1);
        let meta = fx.root.join(metadata_file_name(&(START - 20_000).to_string()));
        fs::write(meta, b"m").unwrap();
        fs::write(fx.root.join("999_metadata"), b"orphan").unwrap();
        let mut orch = fx.orchestrator(PersistenceConfig::default());

        assert_eq!(orch.drop_all(), 2);
        assert_eq!(fs::read_dir(&fx.root).unwrap().count(), 0);
        let flushed = fx.metrics.deleted_with(&RemovalReason::Flushed);
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0], a);
    }

    #[test]
    fn test_pending_count_decrements() {
        let fx = Fixture::new();
        fx.seed(START - 20_000, 1);
        let b = fx.seed(START - 10_000, 1);
        let mut orch = fx.orchestrator(PersistenceConfig::default());

        orch.get_readable_file(&none());
        assert!(orch.delete_batch(&b, RemovalReason::IntakeCode { code: 202 }));
        assert_eq!(fx.metrics.deleted()[0].remaining_pending, 1);
        assert!(!orch.delete_batch(&b, RemovalReason::Invalid));
        assert_eq!(fx.metrics.deleted().len(), 1);
    }

    #[test]
    fn test_delete_failure_keeps_files_and_reports_nothing() {
        let fx = Fixture::new();
        let b = fx.root.join(START.to_string());
        fs::create_dir_all(b.join("inner")).unwrap();
        let meta = fx.root.join(metadata_file_name(&START.to_string()));
        fs::write(&meta, b"m").unwrap();
        let mut orch = fx.orchestrator(PersistenceConfig::default());

        assert!(!orch.delete_batch(&b, RemovalReason::IntakeCode { code: 202 }));
        assert!(b.join("inner").is_dir());
        assert!(meta.exists());
        assert!(fx.metrics.deleted().is_empty());
    }
}
