//! Configuration resolution and loading.
//!
//! Resolution order: explicit path → `BV_CONFIG` → XDG config → defaults.
//! `BV_STORAGE_DIR` and `BV_BATCH_SIZE` are then layered on top.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::preset::BatchSizePreset;
use crate::storage::StorageConfig;
use crate::validate::{validate_storage, ValidationError, ValidationResult};

/// Environment variable names.
const ENV_CONFIG_PATH: &str = "BV_CONFIG";
const ENV_STORAGE_DIR: &str = "BV_STORAGE_DIR";
const ENV_BATCH_SIZE: &str = "BV_BATCH_SIZE";

/// Standard config file name.
const CONFIG_FILENAME: &str = "storage.json";

/// Application name for XDG directories.
const APP_NAME: &str = "batchvault";

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided by the host application.
    Explicit,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit => write!(f, "explicit path"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A validated configuration and its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: StorageConfig,
    pub source: ConfigSource,
    /// File the config was read from (None for builtin defaults).
    pub path: Option<PathBuf>,
}

/// Resolve, load and validate the storage configuration.
pub fn resolve_config(explicit: Option<&Path>) -> ValidationResult<ResolvedConfig> {
    resolve_with_env(explicit, |key| std::env::var(key).ok())
}

/// Same as [`resolve_config`] with an injectable environment lookup.
pub fn resolve_with_env<F>(explicit: Option<&Path>, env: F) -> ValidationResult<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let (path, source) = locate_config(explicit, &env)?;

    let mut config = match &path {
        Some(p) => load_config_file(p)?,
        None => StorageConfig::default(),
    };

    if let Some(dir) = env(ENV_STORAGE_DIR).filter(|d| !d.is_empty()) {
        config.root_dir = PathBuf::from(dir);
    }
    if let Some(value) = env(ENV_BATCH_SIZE) {
        let preset = BatchSizePreset::parse(&value).ok_or_else(|| {
            ValidationError::InvalidValue {
                field: ENV_BATCH_SIZE.to_string(),
                message: format!("unknown batch size preset '{}'", value),
            }
        })?;
        config.persistence.recent_delay_ms = preset.window_duration_ms();
    }

    validate_storage(&config)?;

    debug!(source = %source, root = %config.root_dir.display(), "storage config resolved");
    Ok(ResolvedConfig {
        config,
        source,
        path,
    })
}

fn locate_config<F>(
    explicit: Option<&Path>,
    env: &F,
) -> ValidationResult<(Option<PathBuf>, ConfigSource)>
where
    F: Fn(&str) -> Option<String>,
{
    // An explicit path that does not exist is an error, not a fallthrough
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ValidationError::IoError(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok((Some(path.to_path_buf()), ConfigSource::Explicit));
    }

    if let Some(env_path) = env(ENV_CONFIG_PATH).filter(|p| !p.is_empty()) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok((Some(path), ConfigSource::Environment));
        }
        debug!(path = %path.display(), "BV_CONFIG points to a missing file, ignoring");
    }

    if let Some(path) = xdg_config_dir().map(|d| d.join(CONFIG_FILENAME)) {
        if path.exists() {
            return Ok((Some(path), ConfigSource::XdgConfig));
        }
    }

    Ok((None, ConfigSource::BuiltinDefault))
}

/// Read a JSON config file. Missing fields take their defaults.
pub fn load_config_file(path: &Path) -> ValidationResult<StorageConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ValidationError::IoError(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ValidationError::ParseError(format!("{}: {}", path.display(), e)))
}

/// Get the XDG config directory for batchvault.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}
