//! Chord symbols such as "Cmaj7", "F#m7b5" or "D7/F#", read in a key.

use chordconf::SpellingPolicy;
use serde::Serialize;
use thiserror::Error;

use crate::chord_templates::TEMPLATES;
use crate::function::{classify, ChordShape};
use crate::key::Key;
use crate::pitch::{interval, pitch_class, spell};
use crate::types::{ChordFunction, ChordQuality};

/// Alternate spellings accepted besides each quality's display suffix.
const ALIASES: &[(&str, ChordQuality)] = &[
    ("M", ChordQuality::Major),
    ("maj", ChordQuality::Major),
    ("min", ChordQuality::Minor),
    ("-", ChordQuality::Minor),
    ("o", ChordQuality::Diminished),
    ("°", ChordQuality::Diminished),
    ("+", ChordQuality::Augmented),
    ("sus", ChordQuality::Suspended4),
    ("M7", ChordQuality::Major7),
    ("Δ", ChordQuality::Major7),
    ("Δ7", ChordQuality::Major7),
    ("min7", ChordQuality::Minor7),
    ("-7", ChordQuality::Minor7),
    ("mM7", ChordQuality::MinorMajor7),
    ("mmaj7", ChordQuality::MinorMajor7),
    ("o7", ChordQuality::Diminished7),
    ("°7", ChordQuality::Diminished7),
    ("ø", ChordQuality::HalfDiminished7),
    ("ø7", ChordQuality::HalfDiminished7),
    ("+7", ChordQuality::Augmented7),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChordSymbolError {
    #[error("empty chord symbol")]
    Empty,

    #[error("invalid root in chord symbol '{0}'")]
    Root(String),

    #[error("unknown chord quality '{quality}' in '{symbol}'")]
    Quality { symbol: String, quality: String },

    #[error("invalid bass note in chord symbol '{0}'")]
    Bass(String),
}

/// A chord symbol explained in a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordDescription {
    pub symbol: String,
    pub key: Key,
    pub root: String,
    pub quality: ChordQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bass: Option<String>,
    pub notes: Vec<String>,
    pub roman_numeral: String,
    pub function: ChordFunction,
}

/// Parse a symbol into root, quality and bass. Without a slash the bass is
/// the root.
pub fn parse(symbol: &str) -> Result<ChordShape, ChordSymbolError> {
    let text = symbol.trim();
    let mut chars = text.char_indices();
    let Some((_, letter)) = chars.next() else {
        return Err(ChordSymbolError::Empty);
    };
    if !matches!(letter.to_ascii_uppercase(), 'A'..='G') {
        return Err(ChordSymbolError::Root(symbol.to_string()));
    }

    let root_end = match chars.next() {
        Some((i, c)) if matches!(c, '#' | 'b' | '♯' | '♭') => i + c.len_utf8(),
        Some((i, _)) => i,
        None => text.len(),
    };
    let (root_text, rest) = text.split_at(root_end);
    let root = pitch_class(root_text).map_err(|_| ChordSymbolError::Root(symbol.to_string()))?;

    let (quality_text, bass) = match rest.split_once('/') {
        Some((quality, bass)) => {
            let bass = pitch_class(bass).map_err(|_| ChordSymbolError::Bass(symbol.to_string()))?;
            (quality, bass)
        }
        None => (rest, root),
    };

    let quality = quality_from_suffix(quality_text).ok_or_else(|| ChordSymbolError::Quality {
        symbol: symbol.to_string(),
        quality: quality_text.to_string(),
    })?;

    Ok(ChordShape { root, quality, bass })
}

fn quality_from_suffix(suffix: &str) -> Option<ChordQuality> {
    TEMPLATES
        .iter()
        .map(|t| t.quality)
        .find(|q| q.suffix() == suffix)
        .or_else(|| ALIASES.iter().find(|(alias, _)| *alias == suffix).map(|(_, q)| *q))
}

/// Display symbol for a chord, with "/bass" when the bass is not the root.
pub fn render(chord: &ChordShape, key: &Key, policy: SpellingPolicy) -> String {
    let mut symbol = format!("{}{}", spell(chord.root, key, policy), chord.quality.suffix());
    if chord.bass != chord.root {
        symbol.push('/');
        symbol.push_str(spell(chord.bass, key, policy));
    }
    symbol
}

/// Read `symbol` in `key`. `next` is the chord that follows, if any, so an
/// applied dominant can be recognized by its resolution.
pub fn describe(
    symbol: &str,
    key: &Key,
    next: Option<&str>,
    policy: SpellingPolicy,
) -> Result<ChordDescription, ChordSymbolError> {
    let chord = parse(symbol)?;
    let next = next.map(parse).transpose()?;
    let label = classify(&chord, key, next.as_ref());

    let mut tones: Vec<_> = chord.tones().iter().collect();
    tones.sort_by_key(|pc| interval(chord.root, *pc));

    Ok(ChordDescription {
        symbol: render(&chord, key, policy),
        key: *key,
        root: spell(chord.root, key, policy).to_string(),
        quality: chord.quality,
        bass: (chord.bass != chord.root).then(|| spell(chord.bass, key, policy).to_string()),
        notes: tones.into_iter().map(|pc| spell(pc, key, policy).to_string()).collect(),
        roman_numeral: label.numeral,
        function: label.function,
    })
}
