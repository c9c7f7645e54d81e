//! Shared fixtures for the storage integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;

use bv_common::{ConsentProvider, ConsentState, FeatureName};
use bv_config::{PersistenceConfig, StorageConfig};
use bv_storage::{
    ConsentAwareStorage, InMemoryMetrics, ManualClock, RawEvent, StorageContext,
};
use tempfile::TempDir;

pub const START: u64 = 1_700_000_000_000;

/// Past the default read window (5 s × 1.05).
pub const READABLE_AFTER_MS: u64 = 5_300;

pub struct Harness {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<InMemoryMetrics>,
    pub consent: Arc<ConsentProvider>,
    pub config: StorageConfig,
}

impl Harness {
    pub fn new(consent: ConsentState) -> Self {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::new(dir.path().join("root"));
        Harness {
            dir,
            clock: Arc::new(ManualClock::new(START)),
            metrics: Arc::new(InMemoryMetrics::new()),
            consent: ConsentProvider::new(consent),
            config,
        }
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.config = self.config.with_persistence(persistence);
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(StorageConfig) -> StorageConfig) -> Self {
        self.config = f(self.config);
        self
    }

    pub fn context(&self) -> StorageContext {
        StorageContext::new()
            .with_clock(self.clock.clone())
            .with_metrics(self.metrics.clone())
    }

    pub fn storage(&self) -> ConsentAwareStorage {
        ConsentAwareStorage::with_context(
            feature(),
            &self.config,
            self.consent.clone(),
            self.context(),
        )
        .unwrap()
    }

    pub fn granted_dir(&self) -> PathBuf {
        self.config.root_dir.join("logs").join("granted")
    }

    pub fn pending_dir(&self) -> PathBuf {
        self.config.root_dir.join("logs").join("pending")
    }
}

pub fn feature() -> FeatureName {
    FeatureName::parse("logs").unwrap()
}

/// Write one event and wait for the writer's answer.
pub fn write_event(storage: &ConsentAwareStorage, data: &[u8], metadata: Option<&[u8]>) -> bool {
    write_event_with(storage, false, RawEvent::new(data.to_vec()), metadata)
}

pub fn write_event_with(
    storage: &ConsentAwareStorage,
    force_new: bool,
    event: RawEvent,
    metadata: Option<&[u8]>,
) -> bool {
    let metadata = metadata.map(|m| m.to_vec());
    let (tx, rx) = channel();
    storage.write_current_batch(force_new, move |writer| {
        tx.send(writer.write(&event, metadata.as_deref())).unwrap();
    });
    rx.recv().unwrap()
}

/// Regular files directly inside `dir` (empty if it does not exist).
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Batch files (no metadata) directly inside `dir`.
pub fn batches_in(dir: &Path) -> Vec<PathBuf> {
    files_in(dir)
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect()
}
