//! Minimal configuration loading for chordscope.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/chordscope/config.toml` (system)
//! 2. `~/.config/chordscope/config.toml` (user)
//! 3. `./chordscope.toml` (local override) or an explicit `--config` path
//! 4. Environment variables (`CHORDSCOPE_*`)
//!
//! # Example Config
//!
//! ```toml
//! [analysis]
//! simultaneity_window = 0.25
//! key_window = 4
//! min_key_persistence = 2
//! pivot_lookback = 2
//! match_tolerance = 1
//! spelling = "key"
//! parallel = true
//!
//! [cache]
//! enabled = true
//! path = "~/.local/share/chordscope/cache.db"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod analysis;
pub mod infra;
pub mod loader;

pub use analysis::{AnalysisParams, SpellingPolicy};
pub use infra::{CacheConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Complete chordscope configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChordConfig {
    #[serde(default)]
    pub analysis: AnalysisParams,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ChordConfig {
    /// Load configuration from all standard sources, letting `config_path`
    /// replace the local override, and report which files and variables
    /// contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ChordConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let overlay = loader::load_from_file(&path)?;
            overlay.apply_to(&mut config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources, std::env::vars());
        config.analysis.validate()?;

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::from("# chordscope configuration\n\n");
        // Plain structs of scalars always serialize.
        output.push_str(&toml::to_string_pretty(self).unwrap_or_default());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChordConfig::default();
        assert_eq!(config.analysis.key_window, 4);
        assert!(config.cache.enabled);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn to_toml_has_sections() {
        let toml = ChordConfig::default().to_toml();
        assert!(toml.contains("[analysis]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[telemetry]"));
        assert!(toml.contains("key_window = 4"));
    }

    #[test]
    fn to_toml_parses_back() {
        let config = ChordConfig::default();
        let parsed: ChordConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }
}
