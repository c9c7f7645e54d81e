//! Logging configuration.
//!
//! Read from the environment by [`LogConfig::from_env`]:
//!
//! | variable           | example                       |
//! |--------------------|-------------------------------|
//! | `BV_LOG`           | `debug`                       |
//! | `BV_LOG_FORMAT`    | `jsonl`                       |
//! | `BV_LOG_AUDIENCES` | `telemetry=off,user=warn`     |
//! | `RUST_LOG`         | used for the level if `BV_LOG` is unset |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

use super::LogTarget;

/// Output encoding of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Console lines on stderr.
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" | "text" | "console" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbosity threshold, ordered from most to least verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

/// Accepted spellings, canonical name first.
const LEVEL_NAMES: &[(LogLevel, &[&str])] = &[
    (LogLevel::Trace, &["trace"]),
    (LogLevel::Debug, &["debug"]),
    (LogLevel::Info, &["info"]),
    (LogLevel::Warn, &["warn", "warning"]),
    (LogLevel::Error, &["error"]),
    (LogLevel::Off, &["off", "none"]),
];

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|(level, _)| level == self)
            .map_or("info", |(_, names)| names[0])
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LEVEL_NAMES
            .iter()
            .find(|(_, names)| names.contains(&wanted.as_str()))
            .map(|(level, _)| *level)
            .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// How the host wants storage diagnostics rendered and filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Threshold for every `bv` target without an audience override.
    pub level: LogLevel,
    /// Include timestamps in human output.
    pub timestamps: bool,
    /// Print the audience target (`bv::user`, ...) in human output.
    pub show_targets: bool,
    /// Per-audience thresholds, applied after `level`.
    pub audiences: Vec<(LogTarget, LogLevel)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
            show_targets: true,
            audiences: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary environment lookup. Unparseable values are
    /// ignored and leave the default in place.
    pub fn from_lookup<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig::default();

        match env("BV_LOG") {
            Some(value) => {
                if let Ok(level) = value.parse() {
                    config.level = level;
                }
            }
            None => {
                if let Some(level) = env("RUST_LOG").as_deref().and_then(most_verbose_level) {
                    config.level = level;
                }
            }
        }

        if let Some(format) = env("BV_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.format = format;
        }

        if let Some(spec) = env("BV_LOG_AUDIENCES") {
            for entry in spec.split(',') {
                let Some((name, level)) = entry.split_once('=') else {
                    continue;
                };
                if let (Some(target), Ok(level)) = (LogTarget::parse(name), level.parse()) {
                    config = config.with_audience_level(target, level);
                }
            }
        }

        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn with_show_targets(mut self, enabled: bool) -> Self {
        self.show_targets = enabled;
        self
    }

    /// Override the threshold of one audience (last call wins).
    pub fn with_audience_level(mut self, target: LogTarget, level: LogLevel) -> Self {
        self.audiences.retain(|(t, _)| *t != target);
        self.audiences.push((target, level));
        self
    }

    /// `EnvFilter` directives equivalent to this configuration.
    pub fn filter_directives(&self) -> String {
        let mut directives = format!("bv={}", self.level);
        for (target, level) in &self.audiences {
            directives.push_str(&format!(",{}={}", target.as_str(), level));
        }
        directives
    }
}

/// Most verbose level named anywhere in a `RUST_LOG` style string.
fn most_verbose_level(spec: &str) -> Option<LogLevel> {
    spec.split(',')
        .filter_map(|directive| {
            let level = directive.rsplit('=').next().unwrap_or(directive);
            level.parse::<LogLevel>().ok()
        })
        .min()
}
