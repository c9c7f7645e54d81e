//! Error types for batchvault.
//!
//! Errors carry:
//! - Stable error codes for machine parsing
//! - Category classification for grouping
//! - Recoverability hints for the host application
//!
//! Storage operations never surface these to producers; they are used at
//! setup time (configuration, directory creation) and internally before
//! being logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for batchvault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and validation errors.
    Config,
    /// Identity parsing errors (feature names, batch ids).
    Identity,
    /// Batch persistence errors.
    Storage,
    /// Task scheduling errors.
    Scheduling,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Identity => write!(f, "identity"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Scheduling => write!(f, "scheduling"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for batchvault.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Identity errors (20-29)
    #[error("invalid feature name: {0:?}")]
    InvalidFeatureName(String),

    #[error("not a batch file: {0}")]
    NotBatchFile(String),

    // Storage errors (30-39)
    #[error("storage root unusable: {0}")]
    RootUnavailable(String),

    #[error("item of {size} bytes exceeds limit of {limit} bytes")]
    ItemTooLarge { size: u64, limit: u64 },

    #[error("corrupt batch data: {0}")]
    CorruptBatch(String),

    // Scheduling errors (40-49)
    #[error("task queue for feature {feature} is saturated")]
    QueueSaturated { feature: String },

    #[error("task queue for feature {feature} is shut down")]
    QueueShutDown { feature: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Identity errors
    /// - 30-39: Storage errors
    /// - 40-49: Scheduling errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidFeatureName(_) => 20,
            Error::NotBatchFile(_) => 21,
            Error::RootUnavailable(_) => 30,
            Error::ItemTooLarge { .. } => 31,
            Error::CorruptBatch(_) => 32,
            Error::QueueSaturated { .. } => 40,
            Error::QueueShutDown { .. } => 41,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::InvalidFeatureName(_) | Error::NotBatchFile(_) => ErrorCategory::Identity,
            Error::RootUnavailable(_) | Error::ItemTooLarge { .. } | Error::CorruptBatch(_) => {
                ErrorCategory::Storage
            }
            Error::QueueSaturated { .. } | Error::QueueShutDown { .. } => {
                ErrorCategory::Scheduling
            }
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => false,
            Error::InvalidFeatureName(_) => false,
            Error::NotBatchFile(_) => false,
            // Permissions or mounts may be fixed while the process runs
            Error::RootUnavailable(_) => true,
            Error::ItemTooLarge { .. } => false,
            Error::CorruptBatch(_) => false,
            Error::QueueSaturated { .. } => true,
            Error::QueueShutDown { .. } => false,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_grouped_by_category() {
        let cases: Vec<(Error, ErrorCategory)> = vec![
            (Error::Config("x".into()), ErrorCategory::Config),
            (Error::InvalidFeatureName("".into()), ErrorCategory::Identity),
            (Error::CorruptBatch("tail".into()), ErrorCategory::Storage),
            (
                Error::QueueSaturated {
                    feature: "logs".into(),
                },
                ErrorCategory::Scheduling,
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")),
                ErrorCategory::Io,
            ),
        ];

        for (err, category) in cases {
            assert_eq!(err.category(), category, "{}", err);
            let bucket = match category {
                ErrorCategory::Config => 10..20,
                ErrorCategory::Identity => 20..30,
                ErrorCategory::Storage => 30..40,
                ErrorCategory::Scheduling => 40..50,
                ErrorCategory::Io => 60..70,
            };
            assert!(bucket.contains(&err.code()), "{} -> {}", err, err.code());
        }
    }

    #[test]
    fn test_item_too_large_message() {
        let err = Error::ItemTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "item of 2048 bytes exceeds limit of 1024 bytes"
        );
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Scheduling.to_string(), "scheduling");
        assert_eq!(ErrorCategory::Io.to_string(), "io");
    }
}
