//! Fuzz target for storage.json configuration parsing.
//!
//! Tests that config parsing and validation handle arbitrary input
//! without panicking.

#![no_main]

use bv_config::{validate_storage, StorageConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<StorageConfig>(data) {
        let _ = validate_storage(&config);
    }
});
