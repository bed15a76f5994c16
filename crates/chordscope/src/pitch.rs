//! Pitch-class arithmetic, interval sets and enharmonic spelling.

use std::fmt;

use chordconf::SpellingPolicy;

use crate::key::Key;

const NOTE_NAMES_SHARP: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const NOTE_NAMES_FLAT: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// Spelling for keys without accidentals (C major, A minor).
const NOTE_NAMES_NEUTRAL: [&str; 12] = ["C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];

const INTERVAL_NAMES: [&str; 12] = [
    "unison",
    "minor 2nd",
    "major 2nd",
    "minor 3rd",
    "major 3rd",
    "perfect 4th",
    "tritone",
    "perfect 5th",
    "minor 6th",
    "major 6th",
    "minor 7th",
    "major 7th",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PitchError {
    #[error("invalid pitch name '{0}'")]
    InvalidPitchName(String),
}

/// A pitch class 0–11 (C=0, C#/Db=1, ... B=11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);

    /// Wraps any integer into 0–11.
    pub fn new(value: i32) -> Self {
        PitchClass(value.rem_euclid(12) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn transpose(self, semitones: i32) -> Self {
        PitchClass::new(self.0 as i32 + semitones)
    }
}

impl From<u8> for PitchClass {
    fn from(value: u8) -> Self {
        PitchClass(value % 12)
    }
}

/// A concrete pitch: pitch class plus octave in scientific pitch notation (C4 = MIDI 60).
///
/// Spelling is not stored, so enharmonic equivalents compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch {
    octave: i8,
    class: PitchClass,
}

impl Pitch {
    pub fn from_midi(midi: i16) -> Self {
        Pitch {
            octave: (midi.div_euclid(12) - 1) as i8,
            class: PitchClass::new(midi as i32),
        }
    }

    /// Parse a name with octave such as `"C4"`, `"F#3"`, `"Bb-1"`.
    ///
    /// Accidentals shift across octave boundaries: `"Cb4"` is B3.
    pub fn parse(name: &str) -> Result<Self, PitchError> {
        let trimmed = name.trim();
        let invalid = || PitchError::InvalidPitchName(name.to_string());

        let split = trimmed
            .char_indices()
            .skip(1)
            .find(|(_, c)| c.is_ascii_digit() || *c == '-')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let (spelled, octave) = trimmed.split_at(split);

        let (letter, offset) = parse_spelled(spelled).ok_or_else(invalid)?;
        let octave: i16 = octave.parse().map_err(|_| invalid())?;
        if !(-1..=9).contains(&octave) {
            return Err(invalid());
        }

        Ok(Pitch::from_midi((octave + 1) * 12 + letter as i16 + offset as i16))
    }

    pub fn class(self) -> PitchClass {
        self.class
    }

    pub fn octave(self) -> i8 {
        self.octave
    }

    pub fn midi(self) -> i16 {
        (self.octave as i16 + 1) * 12 + self.class.0 as i16
    }

    /// Name with octave, spelled for `key` under `policy`.
    pub fn spelled(self, key: &Key, policy: SpellingPolicy) -> String {
        format!("{}{}", spell(self.class, key, policy), self.octave)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES_SHARP[self.class.0 as usize], self.octave)
    }
}

/// Letter semitone plus accidental offset, or `None` if malformed.
fn parse_spelled(spelled: &str) -> Option<(u8, i8)> {
    let mut chars = spelled.chars();
    let letter = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut offset = 0i8;
    let mut count = 0;
    for c in chars {
        offset += match c {
            '#' | '♯' => 1,
            'x' | '𝄪' => 2,
            'b' | '♭' => -1,
            _ => return None,
        };
        count += 1;
    }
    if count > 2 {
        return None;
    }

    Some((letter, offset))
}

/// Parse a pitch-class name such as `"C"`, `"F#"`, `"Bb"`, `"E#"`.
pub fn pitch_class(name: &str) -> Result<PitchClass, PitchError> {
    let (letter, offset) = parse_spelled(name.trim())
        .ok_or_else(|| PitchError::InvalidPitchName(name.to_string()))?;
    Ok(PitchClass::new(letter as i32 + offset as i32))
}

/// Ascending interval from `a` to `b` in semitones, 0–11.
pub fn interval(a: PitchClass, b: PitchClass) -> u8 {
    (b.0 + 12 - a.0) % 12
}

pub fn interval_name(semitones: u8) -> &'static str {
    INTERVAL_NAMES[(semitones % 12) as usize]
}

/// Spell a pitch class consistently with the key signature of `key`.
///
/// Sharp keys use sharps, flat keys use flats; C major / A minor use the
/// conventional mixed spelling (F#, Bb, Eb, ...).
pub fn normalize_spelling(pc: PitchClass, key: &Key) -> &'static str {
    let signature = key.signature();
    let idx = pc.0 as usize;
    if signature > 0 {
        NOTE_NAMES_SHARP[idx]
    } else if signature < 0 {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_NEUTRAL[idx]
    }
}

/// Spell a pitch class under a configured policy.
pub fn spell(pc: PitchClass, key: &Key, policy: SpellingPolicy) -> &'static str {
    match policy {
        SpellingPolicy::Key => normalize_spelling(pc, key),
        SpellingPolicy::Sharps => NOTE_NAMES_SHARP[pc.0 as usize],
        SpellingPolicy::Flats => NOTE_NAMES_FLAT[pc.0 as usize],
    }
}

/// A set of pitch classes as a 12-bit mask: bit i set means pitch class i is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PitchClassSet(u16);

impl PitchClassSet {
    pub const EMPTY: PitchClassSet = PitchClassSet(0);

    /// Build from raw semitone values at compile time (template tables).
    pub const fn from_intervals(intervals: &[u8]) -> Self {
        let mut mask = 0u16;
        let mut i = 0;
        while i < intervals.len() {
            mask |= 1 << (intervals[i] % 12);
            i += 1;
        }
        PitchClassSet(mask)
    }

    pub fn insert(&mut self, pc: PitchClass) {
        self.0 |= 1 << pc.0;
    }

    pub fn contains(self, pc: PitchClass) -> bool {
        self.0 & (1 << pc.0) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_subset_of(self, other: PitchClassSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn union(self, other: PitchClassSet) -> Self {
        PitchClassSet(self.0 | other.0)
    }

    pub fn intersection(self, other: PitchClassSet) -> Self {
        PitchClassSet(self.0 & other.0)
    }

    pub fn difference(self, other: PitchClassSet) -> Self {
        PitchClassSet(self.0 & !other.0)
    }

    /// Intervals of every member above `root` (rotate so `root` is bit 0).
    pub fn relative_to(self, root: PitchClass) -> Self {
        let r = root.0 as u32;
        let rotated = ((self.0 as u32) >> r | (self.0 as u32) << (12 - r)) & 0x0fff;
        PitchClassSet(rotated as u16)
    }

    /// Place a set of intervals above `root` (inverse of `relative_to`).
    pub fn transposed_to(self, root: PitchClass) -> Self {
        let r = root.0 as u32;
        let rotated = ((self.0 as u32) << r | (self.0 as u32) >> (12 - r)) & 0x0fff;
        PitchClassSet(rotated as u16)
    }

    /// Members in ascending pitch-class order.
    pub fn iter(self) -> impl Iterator<Item = PitchClass> {
        (0..12u8).filter(move |i| self.0 & (1 << i) != 0).map(PitchClass)
    }
}

impl FromIterator<PitchClass> for PitchClassSet {
    fn from_iter<T: IntoIterator<Item = PitchClass>>(iter: T) -> Self {
        let mut set = PitchClassSet::EMPTY;
        for pc in iter {
            set.insert(pc);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyMode;

    fn key(tonic: u8, mode: KeyMode) -> Key {
        Key::new(PitchClass::from(tonic), mode)
    }

    #[test]
    fn pitch_class_names() {
        assert_eq!(pitch_class("C").unwrap().value(), 0);
        assert_eq!(pitch_class("F#").unwrap().value(), 6);
        assert_eq!(pitch_class("Gb").unwrap().value(), 6);
        assert_eq!(pitch_class("bb").unwrap().value(), 10);
        assert_eq!(pitch_class("E#").unwrap().value(), 5);
        assert_eq!(pitch_class("Cb").unwrap().value(), 11);
        assert_eq!(pitch_class("Fx").unwrap().value(), 7);
        assert_eq!(pitch_class("B♭").unwrap().value(), 10);
    }

    #[test]
    fn invalid_pitch_names() {
        for bad in ["", "H", "C#b#", "Cq", "7"] {
            assert_eq!(
                pitch_class(bad),
                Err(PitchError::InvalidPitchName(bad.to_string())),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn pitch_parse_with_octave() {
        let c4 = Pitch::parse("C4").unwrap();
        assert_eq!(c4.midi(), 60);
        assert_eq!(Pitch::parse("A4").unwrap().midi(), 69);
        assert_eq!(Pitch::parse("F#3").unwrap().midi(), 54);
        assert_eq!(Pitch::parse("C-1").unwrap().midi(), 0);
    }

    #[test]
    fn pitch_parse_crosses_octave() {
        let cb4 = Pitch::parse("Cb4").unwrap();
        assert_eq!(cb4, Pitch::parse("B3").unwrap());
        assert_eq!(cb4.octave(), 3);
        assert_eq!(Pitch::parse("B#3").unwrap().midi(), 60);
    }

    #[test]
    fn enharmonic_pitches_equal() {
        assert_eq!(Pitch::parse("C#4").unwrap(), Pitch::parse("Db4").unwrap());
        assert_ne!(Pitch::parse("C#4").unwrap(), Pitch::parse("C#5").unwrap());
    }

    #[test]
    fn pitch_parse_rejects_garbage() {
        assert!(Pitch::parse("C").is_err());
        assert!(Pitch::parse("X4").is_err());
        assert!(Pitch::parse("C#x#4").is_err());
        assert!(Pitch::parse("C44").is_err());
    }

    #[test]
    fn intervals_ascend_mod_12() {
        let c = PitchClass::from(0);
        let g = PitchClass::from(7);
        assert_eq!(interval(c, g), 7);
        assert_eq!(interval(g, c), 5);
        assert_eq!(interval(c, c), 0);
        assert_eq!(interval_name(interval(c, g)), "perfect 5th");
    }

    #[test]
    fn spelling_follows_key_signature() {
        let f_sharp = PitchClass::from(6);
        assert_eq!(normalize_spelling(f_sharp, &key(7, KeyMode::Major)), "F#");
        assert_eq!(normalize_spelling(f_sharp, &key(1, KeyMode::Major)), "Gb");
        assert_eq!(normalize_spelling(PitchClass::from(10), &key(0, KeyMode::Major)), "Bb");
        assert_eq!(normalize_spelling(PitchClass::from(8), &key(4, KeyMode::Major)), "G#");
    }

    #[test]
    fn spelling_policy_overrides_key() {
        let c_major = key(0, KeyMode::Major);
        assert_eq!(spell(PitchClass::from(10), &c_major, SpellingPolicy::Sharps), "A#");
        assert_eq!(spell(PitchClass::from(6), &c_major, SpellingPolicy::Flats), "Gb");
    }

    #[test]
    fn set_rotation_roundtrip() {
        let g7: PitchClassSet = [7u8, 11, 2, 5].into_iter().map(PitchClass::from).collect();
        let intervals = g7.relative_to(PitchClass::from(7));
        assert_eq!(intervals, PitchClassSet::from_intervals(&[0, 4, 7, 10]));
        assert_eq!(intervals.transposed_to(PitchClass::from(7)), g7);
        assert_eq!(g7.len(), 4);
    }

    #[test]
    fn set_relations() {
        let c_major = PitchClassSet::from_intervals(&[0, 4, 7]);
        let scale = PitchClassSet::from_intervals(&[0, 2, 4, 5, 7, 9, 11]);
        assert!(c_major.is_subset_of(scale));
        assert!(!scale.is_subset_of(c_major));
        assert_eq!(scale.difference(c_major).len(), 4);
        assert_eq!(
            c_major.iter().map(|pc| pc.value()).collect::<Vec<_>>(),
            vec![0, 4, 7]
        );
    }
}
