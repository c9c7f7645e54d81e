//! Batchvault configuration.
//!
//! This crate provides:
//! - Persistence limits applied to every batch file ([`PersistenceConfig`])
//! - Batch size presets controlling the recent window
//! - Storage-wide settings and per-feature overrides ([`StorageConfig`])
//! - Semantic validation and config file resolution

pub mod persistence;
pub mod preset;
pub mod resolve;
pub mod storage;
pub mod validate;

pub use persistence::{PersistenceConfig, PersistenceOverrides};
pub use preset::BatchSizePreset;
pub use resolve::{load_config_file, resolve_config, resolve_with_env, ConfigSource, ResolvedConfig};
pub use storage::{default_storage_dir, StorageConfig};
pub use validate::{validate_persistence, validate_storage, ValidationError, ValidationResult};
