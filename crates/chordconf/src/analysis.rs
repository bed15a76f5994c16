//! Analysis parameters - the knobs of the harmony pipeline.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// How pitch classes are spelled in analysis output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellingPolicy {
    /// Follow the governing key signature (sharps in sharp keys, flats in flat keys).
    #[default]
    Key,
    /// Always spell black keys with sharps.
    Sharps,
    /// Always spell black keys with flats.
    Flats,
}

impl std::str::FromStr for SpellingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key" => Ok(SpellingPolicy::Key),
            "sharps" | "sharp" => Ok(SpellingPolicy::Sharps),
            "flats" | "flat" => Ok(SpellingPolicy::Flats),
            other => Err(format!("unknown spelling policy '{}'", other)),
        }
    }
}

/// Parameters for chord grouping, key estimation and modulation detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Notes whose onsets differ by less than this many quarter notes form
    /// one chord cluster. Default: 0.25 (a sixteenth note)
    #[serde(default = "AnalysisParams::default_simultaneity_window")]
    pub simultaneity_window: f64,

    /// Number of measures in each local key-estimation window.
    /// Default: 4
    #[serde(default = "AnalysisParams::default_key_window")]
    pub key_window: usize,

    /// Measures a new local key must persist before it counts as a modulation.
    /// Default: 2
    #[serde(default = "AnalysisParams::default_min_key_persistence")]
    pub min_key_persistence: usize,

    /// Measures searched before a modulation boundary for a pivot chord.
    /// Default: 2
    #[serde(default = "AnalysisParams::default_pivot_lookback")]
    pub pivot_lookback: usize,

    /// Maximum missing + extra tones for a chord template match.
    /// Default: 1
    #[serde(default = "AnalysisParams::default_match_tolerance")]
    pub match_tolerance: usize,

    #[serde(default)]
    pub spelling: SpellingPolicy,

    /// Run per-measure stages on the rayon pool.
    /// Default: true
    #[serde(default = "AnalysisParams::default_parallel")]
    pub parallel: bool,
}

impl AnalysisParams {
    fn default_simultaneity_window() -> f64 {
        0.25
    }

    fn default_key_window() -> usize {
        4
    }

    fn default_min_key_persistence() -> usize {
        2
    }

    fn default_pivot_lookback() -> usize {
        2
    }

    fn default_match_tolerance() -> usize {
        1
    }

    fn default_parallel() -> bool {
        true
    }

    /// Reject parameter combinations the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.simultaneity_window.is_finite() && self.simultaneity_window > 0.0) {
            return Err(ConfigError::Invalid {
                field: "analysis.simultaneity_window",
                message: format!("must be a positive number, got {}", self.simultaneity_window),
            });
        }
        if self.key_window == 0 {
            return Err(ConfigError::Invalid {
                field: "analysis.key_window",
                message: "must be at least 1".to_string(),
            });
        }
        if self.min_key_persistence == 0 {
            return Err(ConfigError::Invalid {
                field: "analysis.min_key_persistence",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            simultaneity_window: Self::default_simultaneity_window(),
            key_window: Self::default_key_window(),
            min_key_persistence: Self::default_min_key_persistence(),
            pivot_lookback: Self::default_pivot_lookback(),
            match_tolerance: Self::default_match_tolerance(),
            spelling: SpellingPolicy::default(),
            parallel: Self::default_parallel(),
        }
    }
}
