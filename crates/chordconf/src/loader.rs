//! Config file discovery, loading, and environment variable overlay.

use crate::{ChordConfig, ConfigError, SpellingPolicy};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in load order (system, user, local), keeping only
/// those that exist.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/chordscope/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("chordscope/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("chordscope.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// A config file as written: every value optional so layers only override
/// what they mention.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigOverlay {
    #[serde(default)]
    analysis: AnalysisOverlay,
    #[serde(default)]
    cache: CacheOverlay,
    #[serde(default)]
    telemetry: TelemetryOverlay,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisOverlay {
    simultaneity_window: Option<f64>,
    key_window: Option<usize>,
    min_key_persistence: Option<usize>,
    pivot_lookback: Option<usize>,
    match_tolerance: Option<usize>,
    spelling: Option<SpellingPolicy>,
    parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheOverlay {
    enabled: Option<bool>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelemetryOverlay {
    log_level: Option<String>,
}

impl ConfigOverlay {
    /// Write every value present in this layer onto `config`.
    pub fn apply_to(self, config: &mut ChordConfig) {
        let a = self.analysis;
        if let Some(v) = a.simultaneity_window {
            config.analysis.simultaneity_window = v;
        }
        if let Some(v) = a.key_window {
            config.analysis.key_window = v;
        }
        if let Some(v) = a.min_key_persistence {
            config.analysis.min_key_persistence = v;
        }
        if let Some(v) = a.pivot_lookback {
            config.analysis.pivot_lookback = v;
        }
        if let Some(v) = a.match_tolerance {
            config.analysis.match_tolerance = v;
        }
        if let Some(v) = a.spelling {
            config.analysis.spelling = v;
        }
        if let Some(v) = a.parallel {
            config.analysis.parallel = v;
        }

        if let Some(v) = self.cache.enabled {
            config.cache.enabled = v;
        }
        if let Some(v) = self.cache.path {
            config.cache.path = expand_path(&v);
        }

        if let Some(v) = self.telemetry.log_level {
            config.telemetry.log_level = v;
        }
    }
}

/// Load one config layer from a TOML file.
pub fn load_from_file(path: &Path) -> Result<ConfigOverlay, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<ConfigOverlay, ConfigError> {
    toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply `CHORDSCOPE_*` (and `RUST_LOG`) overrides from `vars`.
///
/// Unparseable values are skipped and not recorded as overrides.
pub fn apply_env_overrides(
    config: &mut ChordConfig,
    sources: &mut ConfigSources,
    vars: impl IntoIterator<Item = (String, String)>,
) {
    for (key, value) in vars {
        let applied = match key.as_str() {
            "CHORDSCOPE_SIMULTANEITY_WINDOW" => value
                .parse::<f64>()
                .map(|v| config.analysis.simultaneity_window = v)
                .is_ok(),
            "CHORDSCOPE_KEY_WINDOW" => value
                .parse::<usize>()
                .map(|v| config.analysis.key_window = v)
                .is_ok(),
            "CHORDSCOPE_MIN_KEY_PERSISTENCE" => value
                .parse::<usize>()
                .map(|v| config.analysis.min_key_persistence = v)
                .is_ok(),
            "CHORDSCOPE_PIVOT_LOOKBACK" => value
                .parse::<usize>()
                .map(|v| config.analysis.pivot_lookback = v)
                .is_ok(),
            "CHORDSCOPE_MATCH_TOLERANCE" => value
                .parse::<usize>()
                .map(|v| config.analysis.match_tolerance = v)
                .is_ok(),
            "CHORDSCOPE_SPELLING" => value
                .parse::<SpellingPolicy>()
                .map(|v| config.analysis.spelling = v)
                .is_ok(),
            "CHORDSCOPE_PARALLEL" => value
                .parse::<bool>()
                .map(|v| config.analysis.parallel = v)
                .is_ok(),
            "CHORDSCOPE_CACHE_ENABLED" => value
                .parse::<bool>()
                .map(|v| config.cache.enabled = v)
                .is_ok(),
            "CHORDSCOPE_CACHE_PATH" => {
                config.cache.path = expand_path(&value);
                true
            }
            "CHORDSCOPE_LOG_LEVEL" | "RUST_LOG" => {
                config.telemetry.log_level = value;
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
        } else if let Ok(var_value) = env::var(stripped) {
            return PathBuf::from(var_value);
        }
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_cli_path_is_loaded_last() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "").unwrap();

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
    }

    #[test]
    fn test_partial_overlay_keeps_defaults() {
        let toml = r#"
[analysis]
key_window = 6
"#;
        let overlay = parse_toml(toml, Path::new("test.toml")).unwrap();
        let mut config = ChordConfig::default();
        overlay.apply_to(&mut config);

        assert_eq!(config.analysis.key_window, 6);
        assert_eq!(config.analysis.min_key_persistence, 2);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_full_overlay() {
        let toml = r#"
[analysis]
simultaneity_window = 0.125
key_window = 8
min_key_persistence = 3
pivot_lookback = 1
match_tolerance = 0
spelling = "flats"
parallel = false

[cache]
enabled = false
path = "/tmp/chords.db"

[telemetry]
log_level = "debug"
"#;
        let overlay = parse_toml(toml, Path::new("test.toml")).unwrap();
        let mut config = ChordConfig::default();
        overlay.apply_to(&mut config);

        assert_eq!(config.analysis.simultaneity_window, 0.125);
        assert_eq!(config.analysis.key_window, 8);
        assert_eq!(config.analysis.min_key_persistence, 3);
        assert_eq!(config.analysis.pivot_lookback, 1);
        assert_eq!(config.analysis.match_tolerance, 0);
        assert_eq!(config.analysis.spelling, SpellingPolicy::Flats);
        assert!(!config.analysis.parallel);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.path, PathBuf::from("/tmp/chords.db"));
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = parse_toml("[analysis\nkey_window = ", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ChordConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[
                ("CHORDSCOPE_KEY_WINDOW", "3"),
                ("CHORDSCOPE_SPELLING", "sharps"),
                ("CHORDSCOPE_PARALLEL", "false"),
                ("CHORDSCOPE_LOG_LEVEL", "trace"),
                ("HOME", "/home/nobody"),
            ]),
        );

        assert_eq!(config.analysis.key_window, 3);
        assert_eq!(config.analysis.spelling, SpellingPolicy::Sharps);
        assert!(!config.analysis.parallel);
        assert_eq!(config.telemetry.log_level, "trace");
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_env_override_unparseable_is_ignored() {
        let mut config = ChordConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides(
            &mut config,
            &mut sources,
            vars(&[("CHORDSCOPE_KEY_WINDOW", "many")]),
        );

        assert_eq!(config.analysis.key_window, 4);
        assert!(sources.env_overrides.is_empty());
    }

    #[test]
    fn test_load_from_file_layers() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("chordscope.toml");
        std::fs::write(&path, "[analysis]\npivot_lookback = 4\n").unwrap();

        let (config, sources) = ChordConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.analysis.pivot_lookback, 4);
        assert_eq!(sources.files.last(), Some(&path));
    }
}
