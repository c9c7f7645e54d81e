//! Batch size presets.
//!
//! A preset picks the recent window: how long a freshly created batch keeps
//! accepting appends before it becomes eligible for upload. Small batches
//! upload sooner, large batches amortise request overhead.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Available batch size presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchSizePreset {
    /// 1 second window.
    Small,
    /// 5 second window.
    #[default]
    Medium,
    /// 10 second window.
    Large,
}

impl BatchSizePreset {
    /// All available presets.
    pub const ALL: &'static [BatchSizePreset] = &[
        BatchSizePreset::Small,
        BatchSizePreset::Medium,
        BatchSizePreset::Large,
    ];

    /// Recent window in milliseconds.
    pub fn window_duration_ms(&self) -> u64 {
        match self {
            BatchSizePreset::Small => 1_000,
            BatchSizePreset::Medium => 5_000,
            BatchSizePreset::Large => 10_000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchSizePreset::Small => "small",
            BatchSizePreset::Medium => "medium",
            BatchSizePreset::Large => "large",
        }
    }

    /// Parse a preset name (case-insensitive, a few aliases accepted).
    pub fn parse(s: &str) -> Option<BatchSizePreset> {
        match s.to_lowercase().as_str() {
            "small" | "s" => Some(BatchSizePreset::Small),
            "medium" | "m" | "default" => Some(BatchSizePreset::Medium),
            "large" | "l" => Some(BatchSizePreset::Large),
            _ => None,
        }
    }
}

impl fmt::Display for BatchSizePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_are_increasing() {
        let windows: Vec<u64> = BatchSizePreset::ALL
            .iter()
            .map(|p| p.window_duration_ms())
            .collect();
        assert_eq!(windows, vec![1_000, 5_000, 10_000]);
    }

    #[test]
    fn test_parse_roundtrips_display() {
        for preset in BatchSizePreset::ALL {
            assert_eq!(BatchSizePreset::parse(preset.as_str()), Some(*preset));
        }
        assert_eq!(BatchSizePreset::parse("LARGE"), Some(BatchSizePreset::Large));
        assert_eq!(BatchSizePreset::parse("huge"), None);
    }
}
