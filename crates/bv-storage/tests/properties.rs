//! Property-based tests for batch eviction and batch decoding.
//!
//! Uses proptest to check invariants that must hold for any bucket
//! layout or any byte stream, not just the hand-picked cases of the
//! unit tests.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bv_config::PersistenceConfig;
use bv_storage::{
    BatchCodec, BatchFileOrchestrator, EventKind, InMemoryMetrics, ManualClock, RawEvent,
    RemovalReason, StorageContext, TlvCodec,
};
use proptest::prelude::*;
use tempfile::TempDir;

const START: u64 = 1_700_000_000_000;

fn arb_event() -> impl Strategy<Value = RawEvent> {
    (
        prop::collection::vec(any::<u8>(), 1..64),
        prop::collection::vec(any::<u8>(), 0..16),
        prop::option::of(prop_oneof![
            Just(EventKind::Default),
            Just(EventKind::Crash),
            Just(EventKind::Telemetry),
        ]),
    )
        .prop_map(|(data, metadata, kind)| RawEvent {
            data,
            metadata,
            kind,
        })
}

// ============================================================================
// Eviction
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Footprint eviction removes the oldest unchecked batches first,
    /// never touches checked-out batches and stops once under budget.
    #[test]
    fn eviction_is_oldest_first_and_bounded(
        sizes in prop::collection::vec(1u64..200, 1..20),
        checked_mask in prop::collection::vec(any::<bool>(), 20),
        max_disk_space in 100u64..1000,
    ) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("granted");
        fs::create_dir_all(&root).unwrap();

        let files: Vec<(PathBuf, u64)> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let path = root.join((START - 60_000 + i as u64 * 10).to_string());
                fs::write(&path, vec![b'x'; size as usize]).unwrap();
                (path, size)
            })
            .collect();
        let checked_out: HashSet<PathBuf> = files
            .iter()
            .zip(&checked_mask)
            .filter(|(_, checked)| **checked)
            .map(|((path, _), _)| path.clone())
            .collect();

        let metrics = Arc::new(InMemoryMetrics::new());
        let ctx = StorageContext::new()
            .with_clock(Arc::new(ManualClock::new(START)))
            .with_metrics(metrics.clone());
        let config = PersistenceConfig::default()
            .with_max_disk_space(max_disk_space)
            .with_max_batch_size(max_disk_space);
        let mut orch = BatchFileOrchestrator::new(root.clone(), config, ctx);

        prop_assert!(orch.get_writable_file(false, &checked_out).is_some());

        for path in &checked_out {
            prop_assert!(path.exists(), "checked-out batch evicted: {}", path.display());
        }

        let evicted: Vec<usize> = (0..files.len()).filter(|&i| !files[i].0.exists()).collect();
        let kept_unchecked: Vec<usize> = (0..files.len())
            .filter(|&i| files[i].0.exists() && !checked_out.contains(&files[i].0))
            .collect();
        if let (Some(&newest_evicted), Some(&oldest_kept)) =
            (evicted.iter().max(), kept_unchecked.iter().min())
        {
            prop_assert!(newest_evicted < oldest_kept, "evicted {:?}, kept {:?}", evicted, kept_unchecked);
        }

        let remaining: u64 = files.iter().filter(|(p, _)| p.exists()).map(|(_, s)| s).sum();
        prop_assert!(remaining <= max_disk_space || kept_unchecked.is_empty());

        let purged = metrics.deleted_with(&RemovalReason::Purged);
        prop_assert_eq!(purged.len(), evicted.len());
    }
}

// ============================================================================
// Decoding
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any truncation of a batch stream decodes to a prefix of the events.
    #[test]
    fn truncated_stream_decodes_to_prefix(
        events in prop::collection::vec(arb_event(), 1..10),
        cut_fraction in 0.0f64..=1.0,
    ) {
        let codec = TlvCodec::new();
        let mut bytes = Vec::new();
        for event in &events {
            bytes.extend(codec.encode_event(event).unwrap());
        }
        let cut = ((bytes.len() as f64) * cut_fraction) as usize;

        let decoded = codec.decode_events(&bytes[..cut.min(bytes.len())]);
        prop_assert!(decoded.len() <= events.len());
        prop_assert_eq!(&decoded[..], &events[..decoded.len()]);
        if cut >= bytes.len() {
            prop_assert_eq!(decoded.len(), events.len());
        }
    }

    /// Garbage never panics the decoder.
    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let codec = TlvCodec::new();
        let _ = codec.decode_events(&bytes);
        let _ = codec.decode_metadata(&bytes);
    }
}
