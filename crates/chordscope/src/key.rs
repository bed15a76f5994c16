//! Key estimation from pitch-class histograms, plus key names and scales.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pitch::{normalize_spelling, pitch_class, PitchClass, PitchClassSet, PitchError};

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Sharps (+) or flats (-) of the major key on each tonic pitch class.
/// Db and Gb are preferred over C# and F#.
const MAJOR_SIGNATURES: [i8; 12] = [0, -5, 2, -3, 4, -1, -6, 1, -4, 3, -2, 5];

/// Correlations closer than this are treated as equal.
const TIE_EPSILON: f64 = 1e-6;

pub const MAJOR_SCALE: PitchClassSet = PitchClassSet::from_intervals(&[0, 2, 4, 5, 7, 9, 11]);

/// Natural minor plus the raised leading tone.
pub const MINOR_SCALE: PitchClassSet = PitchClassSet::from_intervals(&[0, 2, 3, 5, 7, 8, 10, 11]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    pub fn parallel(self) -> KeyMode {
        match self {
            KeyMode::Major => KeyMode::Minor,
            KeyMode::Minor => KeyMode::Major,
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

/// A tonal center. The signature is always derived from tonic and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "KeyRepr", try_from = "KeyRepr")]
pub struct Key {
    tonic: PitchClass,
    mode: KeyMode,
}

impl Key {
    pub const C_MAJOR: Key = Key {
        tonic: PitchClass::C,
        mode: KeyMode::Major,
    };

    pub fn new(tonic: PitchClass, mode: KeyMode) -> Self {
        Key { tonic, mode }
    }

    pub fn tonic(&self) -> PitchClass {
        self.tonic
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// Signed count of sharps (+) or flats (-).
    pub fn signature(&self) -> i8 {
        let major_tonic = match self.mode {
            KeyMode::Major => self.tonic,
            KeyMode::Minor => self.tonic.transpose(3),
        };
        MAJOR_SIGNATURES[major_tonic.value() as usize]
    }

    pub fn tonic_name(&self) -> &'static str {
        normalize_spelling(self.tonic, self)
    }

    /// Diatonic pitch classes of this key.
    pub fn scale(&self) -> PitchClassSet {
        let intervals = match self.mode {
            KeyMode::Major => MAJOR_SCALE,
            KeyMode::Minor => MINOR_SCALE,
        };
        intervals.transposed_to(self.tonic)
    }

    pub fn parallel(&self) -> Key {
        Key::new(self.tonic, self.mode.parallel())
    }

    pub fn relative(&self) -> Key {
        match self.mode {
            KeyMode::Major => Key::new(self.tonic.transpose(9), KeyMode::Minor),
            KeyMode::Minor => Key::new(self.tonic.transpose(3), KeyMode::Major),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic_name(), self.mode)
    }
}

/// Accepts "G", "Am", "F# minor", "Eb major".
impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (tonic, mode) = match s.split_once(char::is_whitespace) {
            Some((tonic, mode)) => {
                let mode = match mode.trim().to_ascii_lowercase().as_str() {
                    "major" | "maj" => KeyMode::Major,
                    "minor" | "min" => KeyMode::Minor,
                    _ => return Err(KeyError::Name(s.to_string())),
                };
                (tonic, mode)
            }
            None => match s.strip_suffix('m') {
                Some(tonic) => (tonic, KeyMode::Minor),
                None => (s, KeyMode::Major),
            },
        };
        Ok(Key::new(pitch_class(tonic)?, mode))
    }
}

/// Wire form of a [`Key`]: `{tonic, mode, signature}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyRepr {
    tonic: String,
    mode: KeyMode,
    signature: i8,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid tonic: {0}")]
    Tonic(#[from] PitchError),

    #[error("invalid key name '{0}'")]
    Name(String),

    #[error("signature {found} does not match {key} (expected {expected})")]
    SignatureMismatch { key: String, expected: i8, found: i8 },
}

impl From<Key> for KeyRepr {
    fn from(key: Key) -> Self {
        KeyRepr {
            tonic: key.tonic_name().to_string(),
            mode: key.mode,
            signature: key.signature(),
        }
    }
}

impl TryFrom<KeyRepr> for Key {
    type Error = KeyError;

    fn try_from(repr: KeyRepr) -> Result<Self, Self::Error> {
        let key = Key::new(pitch_class(&repr.tonic)?, repr.mode);
        let expected = key.signature();
        // F# major (+6) and Gb major (-6) name the same key.
        if repr.signature != expected && (repr.signature - expected).abs() != 12 {
            return Err(KeyError::SignatureMismatch {
                key: key.to_string(),
                expected,
                found: repr.signature,
            });
        }
        Ok(key)
    }
}

/// Duration-weighted pitch-class distribution.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchHistogram([f64; 12]);

impl PitchHistogram {
    pub fn add(&mut self, pc: PitchClass, weight: f64) {
        if weight.is_finite() && weight > 0.0 {
            self.0[pc.value() as usize] += weight;
        }
    }

    pub fn merge(&mut self, other: &PitchHistogram) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() <= 0.0
    }

    /// Heaviest pitch class; the lowest one on ties.
    pub fn most_frequent(&self) -> PitchClass {
        let mut best = 0;
        for (pc, &weight) in self.0.iter().enumerate() {
            if weight > self.0[best] {
                best = pc;
            }
        }
        PitchClass::from(best as u8)
    }
}

impl From<[f64; 12]> for PitchHistogram {
    fn from(weights: [f64; 12]) -> Self {
        PitchHistogram(weights)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub key: Key,
    /// Pearson correlation with the winning profile.
    pub correlation: f64,
    /// False when there was nothing to estimate from.
    pub confident: bool,
}

impl KeyEstimate {
    pub fn fallback() -> Self {
        KeyEstimate {
            key: Key::C_MAJOR,
            correlation: 0.0,
            confident: false,
        }
    }
}

/// Krumhansl-Schmuckler key finding over one histogram.
///
/// Correlates the histogram against all 24 rotated key profiles. Near-ties
/// prefer the key whose tonic is the most frequent pitch class, then major,
/// then the lower tonic. An empty histogram yields C major, unconfident.
pub fn estimate_key(histogram: &PitchHistogram) -> KeyEstimate {
    let total = histogram.total();
    if total <= 0.0 {
        return KeyEstimate::fallback();
    }

    let mut normalized = [0.0_f64; 12];
    for (n, h) in normalized.iter_mut().zip(histogram.0.iter()) {
        *n = h / total;
    }

    let mut scored = Vec::with_capacity(24);
    for tonic in 0..12u8 {
        let mut rotated = [0.0; 12];
        for (i, r) in rotated.iter_mut().enumerate() {
            *r = normalized[(i + tonic as usize) % 12];
        }
        let tonic = PitchClass::from(tonic);
        scored.push((pearson(&rotated, &MAJOR_PROFILE), Key::new(tonic, KeyMode::Major)));
        scored.push((pearson(&rotated, &MINOR_PROFILE), Key::new(tonic, KeyMode::Minor)));
    }

    let best = scored
        .iter()
        .map(|(corr, _)| *corr)
        .fold(f64::NEG_INFINITY, f64::max);
    let most_frequent = histogram.most_frequent();

    let (correlation, key) = scored
        .into_iter()
        .filter(|(corr, _)| best - corr <= TIE_EPSILON)
        .min_by_key(|(_, key)| {
            (
                key.tonic() != most_frequent,
                key.mode() != KeyMode::Major,
                key.tonic(),
            )
        })
        .unwrap_or((0.0, Key::C_MAJOR));

    KeyEstimate {
        key,
        correlation,
        confident: true,
    }
}

/// Local key per measure from sliding windows of `window` measures.
///
/// Windows step by one measure. Each measure takes the window whose centre
/// is nearest, the earlier window on ties. A window without notes inherits
/// `global`. Pieces shorter than `window` use a single window.
pub fn local_keys(
    measures: &[PitchHistogram],
    window: usize,
    global: &KeyEstimate,
) -> Vec<KeyEstimate> {
    if measures.is_empty() {
        return Vec::new();
    }
    let window = window.clamp(1, measures.len());

    let estimates: Vec<KeyEstimate> = measures
        .windows(window)
        .map(|slice| {
            let mut histogram = PitchHistogram::default();
            for h in slice {
                histogram.merge(h);
            }
            if histogram.is_empty() {
                *global
            } else {
                estimate_key(&histogram)
            }
        })
        .collect();

    let half = (window - 1) as f64 / 2.0;
    (0..measures.len())
        .map(|i| {
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for start in 0..estimates.len() {
                let distance = (start as f64 + half - i as f64).abs();
                if distance < best_distance {
                    best = start;
                    best_distance = distance;
                }
            }
            estimates[best]
        })
        .collect()
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}
