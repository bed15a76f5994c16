use crate::types::ChordProgression;

/// Well-known progressions, in lookup order.
const COMMON_PROGRESSIONS: &[(&[&str], &str)] = &[
    (&["I", "V", "vi", "IV"], "Pop progression"),
    (&["I", "IV", "V", "I"], "Classical cadence"),
    (&["ii", "V", "I"], "Jazz ii-V-I"),
    (&["I", "vi", "IV", "V"], "50s progression"),
    (&["I", "IV", "I", "V"], "12-bar blues (simplified)"),
    (&["vi", "IV", "I", "V"], "Axis progression"),
    (&["I", "V", "vi", "iii", "IV"], "Canon progression"),
];

/// Strip figures and quality marks: "V65" -> "V", "ii°7" -> "ii".
/// Secondary dominants and chromatic numerals are kept whole so they never
/// match a diatonic pattern.
fn normalize(numeral: &str) -> &str {
    if numeral.contains('/') || numeral.starts_with(['b', '#']) {
        return numeral;
    }
    let end = numeral
        .find(|c: char| !matches!(c, 'I' | 'V' | 'i' | 'v'))
        .unwrap_or(numeral.len());
    &numeral[..end]
}

/// Name a progression: patterns at the start first, then anywhere.
pub fn identify_progression(numerals: &[String]) -> Option<&'static str> {
    let normalized: Vec<&str> = numerals.iter().map(|n| normalize(n)).collect();

    COMMON_PROGRESSIONS
        .iter()
        .find(|(pattern, _)| normalized.starts_with(pattern))
        .or_else(|| {
            COMMON_PROGRESSIONS.iter().find(|(pattern, _)| {
                normalized.windows(pattern.len()).any(|w| w == *pattern)
            })
        })
        .map(|(_, name)| *name)
}

pub fn summarize(numerals: Vec<String>) -> ChordProgression {
    let common_name = identify_progression(&numerals).map(str::to_string);
    ChordProgression {
        roman_numerals: numerals,
        common_name,
    }
}
