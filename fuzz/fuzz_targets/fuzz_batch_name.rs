//! Fuzz target for batch and feature name parsing.

#![no_main]

use bv_common::id::{metadata_file_name, parse_batch_timestamp};
use bv_common::FeatureName;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Some(ts) = parse_batch_timestamp(data) {
        assert_eq!(parse_batch_timestamp(&ts.to_string()), Some(ts));
        assert!(parse_batch_timestamp(&metadata_file_name(data)).is_none());
    }
    if let Ok(feature) = FeatureName::parse(data) {
        assert_eq!(feature.as_str(), data);
    }
});
