//! Fuzz target for encode/decode of structured events.
//!
//! Whatever gets encoded must decode back unchanged, and any truncation
//! must decode to a prefix.

#![no_main]

use arbitrary::Arbitrary;
use bv_storage::{BatchCodec, EventKind, RawEvent, TlvCodec};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    events: Vec<(Vec<u8>, Vec<u8>, Option<u8>)>,
    cut: usize,
}

fuzz_target!(|input: Input| {
    let codec = TlvCodec::new();
    let events: Vec<RawEvent> = input
        .events
        .into_iter()
        .map(|(data, metadata, kind)| RawEvent {
            data,
            metadata,
            kind: kind.and_then(|k| EventKind::from_byte(k % 3)),
        })
        .collect();

    let mut bytes = Vec::new();
    for event in &events {
        if let Ok(encoded) = codec.encode_event(event) {
            bytes.extend(encoded);
        } else {
            return;
        }
    }

    assert_eq!(codec.decode_events(&bytes), events);

    let cut = if bytes.is_empty() { 0 } else { input.cut % (bytes.len() + 1) };
    let decoded = codec.decode_events(&bytes[..cut]);
    assert_eq!(&decoded[..], &events[..decoded.len()]);
});
