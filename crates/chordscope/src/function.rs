//! Roman numerals and tonal function of a chord within a key.

use serde::Serialize;

use crate::chord_templates::TEMPLATES;
use crate::key::{Key, KeyMode};
use crate::pitch::{interval, PitchClass, PitchClassSet};
use crate::types::{ChordFunction, ChordQuality};

const NUMERALS: [&str; 7] = ["I", "II", "III", "IV", "V", "VI", "VII"];

/// Accidental prefix and degree index for each semitone above a major tonic.
const MAJOR_DEGREES: [(&str, usize); 12] = [
    ("", 0),
    ("b", 1),
    ("", 1),
    ("b", 2),
    ("", 2),
    ("", 3),
    ("#", 3),
    ("", 4),
    ("b", 5),
    ("", 5),
    ("b", 6),
    ("", 6),
];

/// Same for minor; both the natural and the raised seventh are diatonic.
const MINOR_DEGREES: [(&str, usize); 12] = [
    ("", 0),
    ("b", 1),
    ("", 1),
    ("", 2),
    ("#", 2),
    ("", 3),
    ("#", 3),
    ("", 4),
    ("", 5),
    ("#", 5),
    ("", 6),
    ("", 6),
];

/// The parts of a matched chord the classifier needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordShape {
    pub root: PitchClass,
    pub quality: ChordQuality,
    pub bass: PitchClass,
}

impl ChordShape {
    /// Full template tones above the root.
    pub fn tones(&self) -> PitchClassSet {
        TEMPLATES
            .iter()
            .find(|t| t.quality == self.quality)
            .map(|t| t.intervals.transposed_to(self.root))
            .unwrap_or_default()
    }

    /// 0 root position, 1 first, 2 second, 3 third inversion. A bass
    /// outside the chord counts as root position.
    pub fn inversion(&self) -> usize {
        if !self.tones().contains(self.bass) {
            return 0;
        }
        match interval(self.root, self.bass) {
            3 | 4 => 1,
            6..=8 => 2,
            9 if self.quality == ChordQuality::Diminished7 => 3,
            10 | 11 => 3,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionLabel {
    pub numeral: String,
    pub function: ChordFunction,
}

impl FunctionLabel {
    pub fn unknown() -> Self {
        FunctionLabel {
            numeral: "?".to_string(),
            function: ChordFunction::Unknown,
        }
    }
}

/// Classify `chord` in `key`, looking at the following chord for
/// secondary-dominant resolution.
pub fn classify(chord: &ChordShape, key: &Key, next: Option<&ChordShape>) -> FunctionLabel {
    let degree = interval(key.tonic(), chord.root);
    let tones = chord.tones();

    if tones.is_subset_of(key.scale()) {
        return FunctionLabel {
            numeral: roman_numeral(chord, key),
            function: diatonic_function(key.mode(), degree),
        };
    }

    if let Some(next) = next {
        let target = chord.root.transpose(5);
        if chord.quality.is_dominant() && chord.root != key.tonic() && target == next.root {
            let target_degree = interval(key.tonic(), target);
            let target_numeral = degree_numeral(key.mode(), target_degree, next.quality.is_minor());
            return FunctionLabel {
                numeral: format!("V{}/{}", figure(chord), target_numeral),
                function: ChordFunction::SecondaryDominant,
            };
        }
    }

    if tones.is_subset_of(key.parallel().scale()) {
        return FunctionLabel {
            numeral: roman_numeral(chord, key),
            function: ChordFunction::Borrowed,
        };
    }

    FunctionLabel {
        numeral: roman_numeral(chord, key),
        function: ChordFunction::Unknown,
    }
}

fn diatonic_function(mode: KeyMode, degree: u8) -> ChordFunction {
    match (mode, degree) {
        (_, 0) => ChordFunction::Tonic,
        (_, 2) | (_, 5) => ChordFunction::Predominant,
        (_, 7) => ChordFunction::Dominant,
        (KeyMode::Major, 4) | (KeyMode::Major, 9) => ChordFunction::Tonic,
        (KeyMode::Minor, 3) | (KeyMode::Minor, 8) => ChordFunction::Tonic,
        (KeyMode::Major, 11) => ChordFunction::Dominant,
        (KeyMode::Minor, 10) | (KeyMode::Minor, 11) => ChordFunction::Dominant,
        _ => ChordFunction::Unknown,
    }
}

/// Roman numeral of `chord` in `key` with quality marks and figured bass:
/// "V", "ii6", "vii°", "V65", "viiø7", "IVmaj7".
pub fn roman_numeral(chord: &ChordShape, key: &Key) -> String {
    let degree = interval(key.tonic(), chord.root);
    let base = degree_numeral(key.mode(), degree, chord.quality.is_minor());
    let mark = match chord.quality {
        ChordQuality::Diminished | ChordQuality::Diminished7 => "°",
        ChordQuality::HalfDiminished7 => "ø",
        ChordQuality::Augmented | ChordQuality::Augmented7 => "+",
        _ => "",
    };
    format!("{}{}{}", base, mark, figure(chord))
}

fn degree_numeral(mode: KeyMode, degree: u8, minor: bool) -> String {
    let table = match mode {
        KeyMode::Major => &MAJOR_DEGREES,
        KeyMode::Minor => &MINOR_DEGREES,
    };
    let (prefix, index) = table[(degree % 12) as usize];
    let numeral = if minor {
        NUMERALS[index].to_lowercase()
    } else {
        NUMERALS[index].to_string()
    };
    format!("{}{}", prefix, numeral)
}

/// Figured-bass or quality suffix after the numeral.
fn figure(chord: &ChordShape) -> String {
    const TRIAD: [&str; 3] = ["", "6", "6/4"];
    const SEVENTH: [&str; 4] = ["7", "65", "43", "42"];

    let inversion = chord.inversion();
    match chord.quality {
        q if q.is_triad() => TRIAD[inversion.min(2)].to_string(),
        q if q.is_seventh() => SEVENTH[inversion].to_string(),
        ChordQuality::Major7 | ChordQuality::MinorMajor7 => format!("maj{}", SEVENTH[inversion]),
        ChordQuality::Major6 | ChordQuality::Minor6 => "add6".to_string(),
        ChordQuality::Minor9 => "9".to_string(),
        q => q.suffix().to_string(),
    }
}

/// Typical behaviour of a scale degree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegreeProfile {
    pub function: ChordFunction,
    pub tendency: &'static str,
    pub common_next: &'static [&'static str],
    pub description: &'static str,
}

/// Look up the degree a numeral names ("V7", "ii6", "bVII", "viiø7").
pub fn degree_profile(numeral: &str) -> DegreeProfile {
    let letters: String = numeral
        .trim_start_matches(['b', '#'])
        .chars()
        .take_while(|c| matches!(c, 'I' | 'V' | 'i' | 'v'))
        .collect::<String>()
        .to_uppercase();

    let (function, tendency, common_next, description): (
        ChordFunction,
        &'static str,
        &'static [&'static str],
        &'static str,
    ) = match letters.as_str() {
        "I" => (
            ChordFunction::Tonic,
            "stable",
            &["IV", "V", "vi", "ii"],
            "Home chord. Creates stability and resolution.",
        ),
        "II" => (
            ChordFunction::Predominant,
            "moves to V",
            &["V", "vii°"],
            "Supertonic. Creates motion toward dominant.",
        ),
        "III" => (
            ChordFunction::Tonic,
            "stable (substitute)",
            &["IV", "vi"],
            "Mediant. Can substitute for tonic.",
        ),
        "IV" => (
            ChordFunction::Predominant,
            "moves to V or I",
            &["V", "I", "ii"],
            "Subdominant. Strong predominant function.",
        ),
        "V" => (
            ChordFunction::Dominant,
            "resolves to I",
            &["I", "vi"],
            "Dominant. Creates tension wanting resolution.",
        ),
        "VI" => (
            ChordFunction::Tonic,
            "stable (substitute)",
            &["IV", "ii", "V"],
            "Submediant. Deceptive resolution target.",
        ),
        "VII" => (
            ChordFunction::Dominant,
            "resolves to I",
            &["I", "iii"],
            "Leading tone chord. Strong pull to tonic.",
        ),
        _ => (
            ChordFunction::Unknown,
            "context-dependent",
            &[],
            "Chord function could not be determined.",
        ),
    };

    DegreeProfile {
        function,
        tendency,
        common_next,
        description,
    }
}
