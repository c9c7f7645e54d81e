//! Writer sessions handed to producers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bv_common::BatchId;
use tracing::{debug, Level};

use crate::codec::BatchCodec;
use crate::event::RawEvent;
use crate::fs_util;
use crate::logging::{log_internal, LogTarget};

/// What a producer callback receives.
///
/// Both disabled variants perform no I/O at all.
#[derive(Debug)]
pub enum EventBatchWriter {
    /// Appends to a real batch file.
    Active(FileEventBatchWriter),
    /// No batch file could be obtained; writes are accepted and discarded
    /// so producers are never blocked by storage trouble.
    Unavailable,
    /// Tracking consent is not granted; writes are refused.
    NotGranted,
}

impl EventBatchWriter {
    /// Append `event`, then replace the batch metadata if `metadata` is set.
    ///
    /// An oversized event or metadata rejects the whole write with no I/O.
    /// Once the event is appended, a failed metadata overwrite is logged
    /// and does not fail the write.
    pub fn write(&self, event: &RawEvent, metadata: Option<&[u8]>) -> bool {
        match self {
            EventBatchWriter::Active(writer) => writer.write(event, metadata),
            EventBatchWriter::Unavailable => true,
            EventBatchWriter::NotGranted => false,
        }
    }

    /// Current metadata of the batch, verbatim.
    pub fn current_metadata(&self) -> Option<Vec<u8>> {
        match self {
            EventBatchWriter::Active(writer) => writer.current_metadata(),
            EventBatchWriter::Unavailable | EventBatchWriter::NotGranted => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, EventBatchWriter::Active(_))
    }

    /// Batch this session appends to.
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            EventBatchWriter::Active(writer) => Some(BatchId::from_path(writer.batch_file())),
            EventBatchWriter::Unavailable | EventBatchWriter::NotGranted => None,
        }
    }
}

/// Writer bound to one batch file and its metadata file.
pub struct FileEventBatchWriter {
    batch_file: PathBuf,
    metadata_file: Option<PathBuf>,
    max_item_size: u64,
    codec: Arc<dyn BatchCodec>,
}

impl std::fmt::Debug for FileEventBatchWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEventBatchWriter")
            .field("batch_file", &self.batch_file)
            .field("metadata_file", &self.metadata_file)
            .field("max_item_size", &self.max_item_size)
            .finish()
    }
}

impl FileEventBatchWriter {
    pub fn new(
        batch_file: PathBuf,
        metadata_file: Option<PathBuf>,
        max_item_size: u64,
        codec: Arc<dyn BatchCodec>,
    ) -> Self {
        FileEventBatchWriter {
            batch_file,
            metadata_file,
            max_item_size,
            codec,
        }
    }

    pub fn batch_file(&self) -> &Path {
        &self.batch_file
    }

    pub fn write(&self, event: &RawEvent, metadata: Option<&[u8]>) -> bool {
        if event.data.is_empty() {
            log_internal(Level::ERROR, &[LogTarget::User], "Can't write an empty event");
            return false;
        }
        if event.size() > self.max_item_size {
            log_internal(
                Level::ERROR,
                &[LogTarget::User],
                &format!(
                    "Can't write data with size {} (max item size is {})",
                    event.size(),
                    self.max_item_size
                ),
            );
            return false;
        }
        if let Some(metadata) = metadata {
            if metadata.len() as u64 > self.max_item_size {
                log_internal(
                    Level::ERROR,
                    &[LogTarget::User],
                    &format!(
                        "Can't write batch metadata with size {} (max item size is {})",
                        metadata.len(),
                        self.max_item_size
                    ),
                );
                return false;
            }
        }

        let written = self
            .codec
            .encode_event(event)
            .and_then(|bytes| fs_util::append(&self.batch_file, &bytes));
        if let Err(e) = written {
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!(
                    "Unable to append event to {}: {}",
                    self.batch_file.display(),
                    e
                ),
            );
            return false;
        }

        if let Some(metadata) = metadata {
            self.write_metadata(metadata);
        }
        true
    }

    pub fn current_metadata(&self) -> Option<Vec<u8>> {
        let path = self.metadata_file.as_ref()?;
        if !path.exists() {
            return None;
        }
        match fs_util::read_bytes(path) {
            Ok(bytes) => self.codec.decode_metadata(&bytes),
            Err(e) => {
                log_internal(
                    Level::WARN,
                    &[LogTarget::Maintainer],
                    &format!("Unable to read batch metadata {}: {}", path.display(), e),
                );
                None
            }
        }
    }

    fn write_metadata(&self, metadata: &[u8]) {
        let Some(path) = &self.metadata_file else {
            debug!(batch = %self.batch_file.display(), "no metadata file, metadata dropped");
            return;
        };

        let written = self
            .codec
            .encode_metadata(metadata)
            .and_then(|bytes| fs_util::overwrite(path, &bytes));
        if let Err(e) = written {
            log_internal(
                Level::WARN,
                &[LogTarget::Maintainer],
                &format!("Unable to write batch metadata {}: {}", path.display(), e),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TlvCodec;
    use std::fs;
    use tempfile::TempDir;

    fn writer(dir: &TempDir, max_item_size: u64) -> FileEventBatchWriter {
        FileEventBatchWriter::new(
            dir.path().join("1000"),
            Some(dir.path().join("1000_metadata")),
            max_item_size,
            Arc::new(TlvCodec::new()),
        )
    }

    #[test]
    fn test_write_appends_and_overwrites_metadata() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 1024);

        assert!(w.write(&RawEvent::new(b"one".to_vec()), Some(b"m1")));
        assert!(w.write(&RawEvent::new(b"two".to_vec()), Some(b"m2")));
        assert!(w.write(&RawEvent::new(b"three".to_vec()), None));

        let events = TlvCodec::new().decode_events(&fs::read(dir.path().join("1000")).unwrap());
        let data: Vec<Vec<u8>> = events.into_iter().map(|e| e.data).collect();
        assert_eq!(data, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
        assert_eq!(w.current_metadata().unwrap(), b"m2");
    }

    #[test]
    fn test_empty_event_rejected_without_io() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 1024);
        assert!(!w.write(&RawEvent::new(Vec::new()), Some(b"meta")));
        assert!(!dir.path().join("1000").exists());
        assert!(!dir.path().join("1000_metadata").exists());
    }

    #[test]
    fn test_oversized_event_rejected_without_io() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 4);
        assert!(!w.write(&RawEvent::new(b"abcde".to_vec()), Some(b"m")));
        assert!(!dir.path().join("1000").exists());
        assert!(!dir.path().join("1000_metadata").exists());
    }

    #[test]
    fn test_per_event_metadata_not_counted_against_item_size() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 4);
        let event = RawEvent::new(b"abcd".to_vec()).with_metadata(b"per-event".to_vec());
        assert!(w.write(&event, None));
        assert!(dir.path().join("1000").exists());
    }

    #[test]
    fn test_oversized_metadata_rejects_whole_write() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 4);
        assert!(!w.write(&RawEvent::new(b"ok".to_vec()), Some(b"too large")));
        assert!(!dir.path().join("1000").exists());
        assert!(!dir.path().join("1000_metadata").exists());
    }

    #[test]
    fn test_oversized_metadata_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let w = writer(&dir, 8);
        assert!(w.write(&RawEvent::new(b"ok".to_vec()), Some(b"m1")));
        let before = fs::read(dir.path().join("1000")).unwrap();

        assert!(!w.write(&RawEvent::new(b"ok2".to_vec()), Some(&[7u8; 22])));
        assert_eq!(fs::read(dir.path().join("1000")).unwrap(), before);
        assert_eq!(w.current_metadata().unwrap(), b"m1");
    }

    #[test]
    fn test_metadata_failure_does_not_fail_event() {
        let dir = TempDir::new().unwrap();
        // A directory where the metadata file should be makes the overwrite fail
        fs::create_dir(dir.path().join("1000_metadata")).unwrap();
        let w = writer(&dir, 1024);
        assert!(w.write(&RawEvent::new(b"ok".to_vec()), Some(b"meta")));
    }

    #[test]
    fn test_no_metadata_file_configured() {
        let dir = TempDir::new().unwrap();
        let w = FileEventBatchWriter::new(
            dir.path().join("1000"),
            None,
            1024,
            Arc::new(TlvCodec::new()),
        );
        assert!(w.write(&RawEvent::new(b"x".to_vec()), Some(b"meta")));
        assert_eq!(w.current_metadata(), None);
    }

    #[test]
    fn test_disabled_variants() {
        let event = RawEvent::new(b"x".to_vec());
        assert!(EventBatchWriter::Unavailable.write(&event, None));
        assert!(!EventBatchWriter::NotGranted.write(&event, None));
        assert_eq!(EventBatchWriter::NotGranted.current_metadata(), None);
        assert_eq!(EventBatchWriter::Unavailable.batch_id(), None);
    }

    #[test]
    fn test_active_batch_id() {
        let dir = TempDir::new().unwrap();
        let active = EventBatchWriter::Active(writer(&dir, 10));
        assert!(active.is_active());
        assert_eq!(active.batch_id().unwrap().as_str(), "1000");
    }
}
