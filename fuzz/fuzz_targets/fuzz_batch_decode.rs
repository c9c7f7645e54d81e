//! Fuzz target for batch file decoding.
//!
//! Batch files survive crashes and partial writes, so decoding must
//! handle any byte stream without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use bv_storage::{BatchCodec, TlvCodec};

fuzz_target!(|data: &[u8]| {
    let codec = TlvCodec::new();
    let _ = codec.decode_events(data);
    let _ = codec.decode_metadata(data);
});
