//! Infrastructure configuration - cache storage and logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache analysis results in SQLite.
    /// Default: true
    #[serde(default = "CacheConfig::default_enabled")]
    pub enabled: bool,

    /// SQLite database path.
    /// Default: ~/.local/share/chordscope/cache.db
    #[serde(default = "CacheConfig::default_path")]
    pub path: PathBuf,
}

impl CacheConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_path() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/chordscope/cache.db"))
            .unwrap_or_else(|| PathBuf::from(".local/share/chordscope/cache.db"))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            path: Self::default_path(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "chordscope=trace").
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
