//! Logging for the storage engine.
//!
//! Diagnostics are addressed to one or more audiences, each mapped to a
//! tracing target so subscribers can route them independently:
//!
//! - `bv::user`: problems the host application developer can fix
//!   (oversized items, unusable directories)
//! - `bv::maintainer`: internal failures worth a bug report
//! - `bv::telemetry`: events forwarded to the library's own telemetry
//!
//! The library never installs a subscriber by itself; hosts call
//! [`init_logging`] or bring their own.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const USER_TARGET: &str = "bv::user";
pub const MAINTAINER_TARGET: &str = "bv::maintainer";
pub const TELEMETRY_TARGET: &str = "bv::telemetry";

/// Audience of an internal log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTarget {
    User,
    Maintainer,
    Telemetry,
}

impl LogTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTarget::User => USER_TARGET,
            LogTarget::Maintainer => MAINTAINER_TARGET,
            LogTarget::Telemetry => TELEMETRY_TARGET,
        }
    }

    /// Parse a short audience name (`user`, `maintainer`, `telemetry`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "user" => Some(LogTarget::User),
            "maintainer" => Some(LogTarget::Maintainer),
            "telemetry" => Some(LogTarget::Telemetry),
            _ => None,
        }
    }
}

macro_rules! emit_at {
    ($target:expr, $level:expr, $msg:expr) => {
        match $level {
            Level::ERROR => tracing::error!(target: $target, "{}", $msg),
            Level::WARN => tracing::warn!(target: $target, "{}", $msg),
            Level::INFO => tracing::info!(target: $target, "{}", $msg),
            Level::DEBUG => tracing::debug!(target: $target, "{}", $msg),
            _ => tracing::trace!(target: $target, "{}", $msg),
        }
    };
}

/// Emit `message` once per requested audience.
pub fn log_internal(level: Level, targets: &[LogTarget], message: &str) {
    for target in targets {
        match target {
            LogTarget::User => emit_at!(USER_TARGET, level, message),
            LogTarget::Maintainer => emit_at!(MAINTAINER_TARGET, level, message),
            LogTarget::Telemetry => emit_at!(TELEMETRY_TARGET, level, message),
        }
    }
}

/// Install a global subscriber for the host process.
///
/// Returns false when a global subscriber was already installed, in which
/// case the existing one is kept.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(config.show_targets)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    result.is_ok()
}

/// Initialize logging from the environment (for tests and simple hosts).
pub fn init_default_logging() -> bool {
    init_logging(&LogConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_share_prefix() {
        for target in [LogTarget::User, LogTarget::Maintainer, LogTarget::Telemetry] {
            assert!(target.as_str().starts_with("bv::"));
        }
    }

    #[test]
    fn test_target_parse() {
        assert_eq!(LogTarget::parse("telemetry"), Some(LogTarget::Telemetry));
        assert_eq!(LogTarget::parse(" user "), Some(LogTarget::User));
        assert_eq!(LogTarget::parse("bv::user"), None);
    }

    #[test]
    fn test_log_internal_without_subscriber() {
        log_internal(
            Level::ERROR,
            &[LogTarget::Maintainer, LogTarget::Telemetry],
            "no subscriber installed",
        );
        log_internal(Level::TRACE, &[], "nobody listens");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LogConfig::default().with_level(LogLevel::Off);
        init_logging(&config);
        assert!(!init_logging(&config));
    }
}
