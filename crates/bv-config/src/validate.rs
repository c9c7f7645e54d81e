//! Configuration validation errors and semantic validation.

use bv_common::FeatureName;
use thiserror::Error;

use crate::persistence::PersistenceConfig;
use crate::storage::StorageConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Unknown feature in overrides: {0}")]
    UnknownFeature(String),
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::UnknownFeature(_) => 67,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate persistence limits semantically.
pub fn validate_persistence(config: &PersistenceConfig) -> ValidationResult<()> {
    if config.recent_delay_ms == 0 {
        return Err(invalid("recent_delay_ms", "must be greater than 0"));
    }
    if config.max_item_size == 0 {
        return Err(invalid("max_item_size", "must be greater than 0"));
    }
    if config.max_items_per_batch == 0 {
        return Err(invalid("max_items_per_batch", "must be greater than 0"));
    }
    if config.max_item_size > config.max_batch_size {
        return Err(ValidationError::SemanticError(format!(
            "max_item_size ({}) must not exceed max_batch_size ({})",
            config.max_item_size, config.max_batch_size
        )));
    }
    if config.max_batch_size > config.max_disk_space {
        return Err(ValidationError::SemanticError(format!(
            "max_batch_size ({}) must not exceed max_disk_space ({})",
            config.max_batch_size, config.max_disk_space
        )));
    }
    // A batch must become readable before it becomes obsolete
    if config.old_file_threshold_ms <= config.recent_read_window_ms() {
        return Err(ValidationError::SemanticError(format!(
            "old_file_threshold_ms ({}) must exceed the read window ({} ms)",
            config.old_file_threshold_ms,
            config.recent_read_window_ms()
        )));
    }
    Ok(())
}

/// Validate storage-wide settings and every effective per-feature config.
pub fn validate_storage(config: &StorageConfig) -> ValidationResult<()> {
    if config.root_dir.as_os_str().is_empty() {
        return Err(invalid("root_dir", "must not be empty"));
    }
    if config.queue_capacity == 0 {
        return Err(invalid("queue_capacity", "must be greater than 0"));
    }

    validate_persistence(&config.persistence)?;

    for name in config.features.keys() {
        let feature = FeatureName::parse(name)
            .map_err(|_| ValidationError::UnknownFeature(name.clone()))?;
        validate_persistence(&config.effective_persistence(&feature)).map_err(|e| {
            ValidationError::SemanticError(format!("feature {}: {}", feature, e))
        })?;
    }

    Ok(())
}
