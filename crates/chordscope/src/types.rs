use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Smallest width/height a clamped box may have.
const MIN_EXTENT: f64 = 1e-4;

/// Complete harmonic analysis of one notation document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub filename: String,
    pub pages: Vec<PageAnalysis>,
    pub global_key: Key,
    pub modulations: Vec<Modulation>,
    pub chord_progression: ChordProgression,
    pub status: AnalysisStatus,
    /// Present only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<AnalysisWarning>,
}

impl AnalysisResult {
    /// Result for a document that could not be analyzed at all.
    pub fn failed(id: impl Into<String>, filename: impl Into<String>, message: impl Into<String>) -> Self {
        AnalysisResult {
            id: id.into(),
            filename: filename.into(),
            pages: Vec::new(),
            global_key: Key::C_MAJOR,
            modulations: Vec::new(),
            chord_progression: ChordProgression::default(),
            status: AnalysisStatus::Error,
            error: Some(message.into()),
            warnings: Vec::new(),
        }
    }

    /// Every chord in document order.
    pub fn chords(&self) -> impl Iterator<Item = &Arc<ChordAnalysis>> {
        self.pages
            .iter()
            .flat_map(|p| p.measures.iter())
            .flat_map(|m| m.chords.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAnalysis {
    pub page_number: u32,
    pub measures: Vec<Measure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub number: u32,
    pub bounding_box: BoundingBox,
    pub beats: Vec<Beat>,
    pub local_key: Key,
    pub chords: Vec<Arc<ChordAnalysis>>,
    pub time_signature: TimeSignature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    /// 1-based beat number within the measure.
    pub number: u32,
    pub notes: Vec<NoteInfo>,
    /// The first chord starting on this beat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chord: Option<Arc<ChordAnalysis>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    /// Spelled pitch with octave, e.g. "F#4".
    pub pitch: String,
    pub onset: f64,
    pub duration: f64,
    pub bounding_box: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_chord_tone: Option<NonChordTone>,
}

/// One analyzed chord.
///
/// Shared between its beat, its measure and any modulation that uses it as
/// a pivot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordAnalysis {
    /// `p{page}-m{measure}-c{index}`
    pub id: String,
    /// Root + suffix, with `/bass` for inversions: "G7/B".
    pub symbol: String,
    pub root: String,
    /// `None` when no template matched.
    pub quality: Option<ChordQuality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bass: Option<String>,
    /// Spelled chord tones, root first.
    pub notes: Vec<String>,
    /// Indices into the source measure's note list.
    pub note_indices: Vec<usize>,
    pub bounding_box: BoundingBox,
    pub roman_numeral: String,
    pub function: ChordFunction,
    pub confidence: f64,
    /// 1-based beat the chord starts on.
    pub beat_position: u32,
    pub onset: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Modulation {
    pub page_number: u32,
    pub measure_number: u32,
    pub from_key: Key,
    pub to_key: Key,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_chord: Option<Arc<ChordAnalysis>>,
    pub reasoning: String,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordProgression {
    pub roman_numerals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

/// A problem with one input note or measure. Analysis continues without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWarning {
    pub kind: WarningKind,
    pub page_number: u32,
    pub measure_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_index: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InvalidPitchName,
    InvalidOnset,
    NonPositiveDuration,
    BoundingBoxClamped,
    InvalidTimeSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordFunction {
    Tonic,
    Predominant,
    Dominant,
    SecondaryDominant,
    Borrowed,
    Unknown,
}

/// Role of a note left out of its cluster's chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonChordTone {
    Passing,
    Neighbor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Suspended4,
    Suspended2,
    Dominant7,
    Major7,
    Minor7,
    MinorMajor7,
    Diminished7,
    HalfDiminished7,
    Major6,
    Minor6,
    Add9,
    Dominant9,
    Major9,
    Minor9,
    Dominant7Flat9,
    Dominant7Sharp9,
    Dominant7Flat5,
    Augmented7,
    Power,
}

impl ChordQuality {
    /// Suffix for chord symbol display
    pub fn suffix(&self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Diminished => "dim",
            ChordQuality::Augmented => "aug",
            ChordQuality::Suspended4 => "sus4",
            ChordQuality::Suspended2 => "sus2",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::MinorMajor7 => "m(maj7)",
            ChordQuality::Diminished7 => "dim7",
            ChordQuality::HalfDiminished7 => "m7b5",
            ChordQuality::Major6 => "6",
            ChordQuality::Minor6 => "m6",
            ChordQuality::Add9 => "add9",
            ChordQuality::Dominant9 => "9",
            ChordQuality::Major9 => "maj9",
            ChordQuality::Minor9 => "m9",
            ChordQuality::Dominant7Flat9 => "7b9",
            ChordQuality::Dominant7Sharp9 => "7#9",
            ChordQuality::Dominant7Flat5 => "7b5",
            ChordQuality::Augmented7 => "aug7",
            ChordQuality::Power => "5",
        }
    }

    /// Built on a minor third (lower-case Roman numeral).
    pub fn is_minor(&self) -> bool {
        matches!(
            self,
            ChordQuality::Minor
                | ChordQuality::Diminished
                | ChordQuality::Minor7
                | ChordQuality::MinorMajor7
                | ChordQuality::Diminished7
                | ChordQuality::HalfDiminished7
                | ChordQuality::Minor6
                | ChordQuality::Minor9
        )
    }

    /// Qualities that can act as a (secondary) dominant.
    pub fn is_dominant(&self) -> bool {
        matches!(
            self,
            ChordQuality::Major
                | ChordQuality::Dominant7
                | ChordQuality::Dominant9
                | ChordQuality::Dominant7Flat9
                | ChordQuality::Dominant7Sharp9
        )
    }

    pub fn is_triad(&self) -> bool {
        matches!(
            self,
            ChordQuality::Major | ChordQuality::Minor | ChordQuality::Diminished | ChordQuality::Augmented
        )
    }

    /// Seventh chords that take figured-bass inversion symbols.
    pub fn is_seventh(&self) -> bool {
        matches!(
            self,
            ChordQuality::Dominant7
                | ChordQuality::Minor7
                | ChordQuality::Diminished7
                | ChordQuality::HalfDiminished7
                | ChordQuality::Augmented7
        )
    }
}

/// Axis-aligned box in page-relative coordinates, every field in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        BoundingBox { x, y, width, height }
    }

    pub fn is_valid(&self) -> bool {
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        unit(self.x)
            && unit(self.y)
            && unit(self.width)
            && unit(self.height)
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Force every field into range; non-finite values become 0.
    pub fn clamped(&self) -> BoundingBox {
        fn unit(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        BoundingBox {
            x: unit(self.x),
            y: unit(self.y),
            width: unit(self.width).max(MIN_EXTENT),
            height: unit(self.height).max(MIN_EXTENT),
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        BoundingBox {
            x,
            y,
            width: right - x,
            height: bottom - y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Largest numerator accepted from input; anything beyond is treated as
    /// a recognition error.
    pub const MAX_BEATS: u32 = 64;

    pub fn is_valid(&self) -> bool {
        (1..=Self::MAX_BEATS).contains(&self.numerator) && self.denominator > 0
    }

    /// Length of one beat in quarter notes.
    pub fn beat_length(&self) -> f64 {
        4.0 / self.denominator.max(1) as f64
    }

    /// 1-based beat containing `onset`, clamped to the measure.
    pub fn beat_at(&self, onset: f64) -> u32 {
        let beat = (onset.max(0.0) / self.beat_length()).floor();
        (beat as u32).min(self.numerator.max(1) - 1) + 1
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn union_covers_both() {
        let a = BoundingBox::new(0.1, 0.2, 0.1, 0.1);
        let b = BoundingBox::new(0.3, 0.1, 0.05, 0.05);
        let u = a.union(&b);
        assert!((u.x - 0.1).abs() < 1e-12);
        assert!((u.y - 0.1).abs() < 1e-12);
        assert!((u.width - 0.25).abs() < 1e-12);
        assert!((u.height - 0.2).abs() < 1e-12);
    }

    #[test]
    fn clamp_repairs_out_of_range_box() {
        let bad = BoundingBox::new(-0.2, 1.4, 0.0, f64::NAN);
        assert!(!bad.is_valid());
        let fixed = bad.clamped();
        assert!(fixed.is_valid(), "{:?}", fixed);
        assert_eq!(fixed.x, 0.0);
        assert_eq!(fixed.y, 1.0);
    }

    #[test]
    fn beats_follow_denominator() {
        let common = TimeSignature::default();
        assert_eq!(common.beat_at(0.0), 1);
        assert_eq!(common.beat_at(2.5), 3);
        assert_eq!(common.beat_at(9.0), 4, "past the barline clamps to last beat");

        let six_eight = TimeSignature {
            numerator: 6,
            denominator: 8,
        };
        assert_eq!(six_eight.beat_length(), 0.5);
        assert_eq!(six_eight.beat_at(1.0), 3);
    }

    #[test]
    fn oversized_numerator_is_invalid() {
        let huge = TimeSignature {
            numerator: u32::MAX,
            denominator: 4,
        };
        assert!(!huge.is_valid());
        assert!(TimeSignature {
            numerator: TimeSignature::MAX_BEATS,
            denominator: 4,
        }
        .is_valid());
    }

    #[test]
    fn quality_cases() {
        assert!(ChordQuality::HalfDiminished7.is_minor());
        assert!(!ChordQuality::Dominant7.is_minor());
        assert!(ChordQuality::Dominant7.is_dominant());
        assert!(!ChordQuality::Major7.is_dominant());
    }

    #[test]
    fn failed_result_serializes_error_only_when_present() {
        let failed = AnalysisResult::failed("doc", "score.json", "unreadable");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "unreadable");
        assert!(json.get("warnings").is_none());
        assert_eq!(json["globalKey"]["tonic"], "C");
    }
}
