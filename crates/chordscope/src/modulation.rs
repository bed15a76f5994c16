use std::sync::Arc;

use chordconf::AnalysisParams;
use tracing::debug;

use crate::function::{roman_numeral, ChordShape};
use crate::key::Key;
use crate::pitch::{interval, interval_name, PitchClassSet};
use crate::types::{BoundingBox, ChordAnalysis, Modulation};

/// One measure as seen by the modulation detector.
#[derive(Debug, Clone)]
pub struct MeasureHarmony {
    pub page_number: u32,
    pub measure_number: u32,
    pub bounding_box: BoundingBox,
    pub key: Key,
    pub chords: Vec<HarmonyChord>,
}

#[derive(Debug, Clone)]
pub struct HarmonyChord {
    pub analysis: Arc<ChordAnalysis>,
    /// `None` for unmatched chords, which never serve as pivots.
    pub shape: Option<ChordShape>,
    pub pitches: PitchClassSet,
}

/// A maximal stretch of consecutive measures in one key.
struct KeyRun {
    start: usize,
    len: usize,
    key: Key,
}

fn key_runs(measures: &[MeasureHarmony]) -> Vec<KeyRun> {
    let mut runs: Vec<KeyRun> = Vec::new();
    for (i, m) in measures.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.key == m.key => run.len += 1,
            _ => runs.push(KeyRun {
                start: i,
                len: 1,
                key: m.key,
            }),
        }
    }
    runs
}

/// Find sustained key changes over the measure sequence.
///
/// The first run of at least `min_key_persistence` measures sets the opening
/// key and is not reported. Each later run that long in a different key is a
/// modulation at its first measure; shorter runs are ignored.
pub fn detect_modulations(measures: &[MeasureHarmony], params: &AnalysisParams) -> Vec<Modulation> {
    let persistence = params.min_key_persistence.max(1);
    let mut current: Option<Key> = None;
    let mut modulations = Vec::new();

    for run in key_runs(measures) {
        if run.len < persistence {
            continue;
        }
        let Some(from) = current else {
            current = Some(run.key);
            continue;
        };
        if run.key == from {
            continue;
        }

        let boundary = &measures[run.start];
        let pivot = find_pivot(measures, run.start, &from, &run.key, params.pivot_lookback);
        let reasoning = match &pivot {
            Some(chord) => pivot_reasoning(chord, &from, &run.key),
            None => format!(
                "Direct modulation from {} to {} ({}) with no pivot chord.",
                from,
                run.key,
                relation(&from, &run.key)
            ),
        };

        debug!(
            page = boundary.page_number,
            measure = boundary.measure_number,
            from = %from,
            to = %run.key,
            pivot = ?pivot.as_ref().map(|c| &c.analysis.id),
            "modulation detected"
        );

        modulations.push(Modulation {
            page_number: boundary.page_number,
            measure_number: boundary.measure_number,
            from_key: from,
            to_key: run.key,
            pivot_chord: pivot.map(|c| Arc::clone(&c.analysis)),
            reasoning,
            bounding_box: boundary.bounding_box,
        });
        current = Some(run.key);
    }

    modulations
}

/// A chord diatonic in both keys, searched latest-first through the lookback
/// measures and then earliest-first through the boundary measure. A candidate
/// rooted on the new tonic wins over nearer ones.
fn find_pivot<'a>(
    measures: &'a [MeasureHarmony],
    boundary: usize,
    from: &Key,
    to: &Key,
    lookback: usize,
) -> Option<&'a HarmonyChord> {
    let common = from.scale().intersection(to.scale());
    let is_pivot = |c: &&HarmonyChord| c.shape.is_some() && c.pitches.is_subset_of(common);

    let before = &measures[boundary.saturating_sub(lookback)..boundary];
    let candidates = || {
        before
            .iter()
            .rev()
            .flat_map(|m| m.chords.iter().rev())
            .chain(measures[boundary].chords.iter())
            .filter(is_pivot)
    };

    candidates()
        .find(|c| c.shape.is_some_and(|s| s.root == to.tonic()))
        .or_else(|| candidates().next())
}

fn pivot_reasoning(pivot: &HarmonyChord, from: &Key, to: &Key) -> String {
    let (old, new) = match &pivot.shape {
        Some(shape) => (roman_numeral(shape, from), roman_numeral(shape, to)),
        None => ("?".to_string(), "?".to_string()),
    };
    format!(
        "Pivot chord {}: {} in {} becomes {} in {}; modulation to {}.",
        pivot.analysis.symbol,
        old,
        from,
        new,
        to,
        relation(from, to)
    )
}

/// How `to` relates to `from`, e.g. "the dominant", "the relative minor".
fn relation(from: &Key, to: &Key) -> String {
    let semitones = interval(from.tonic(), to.tonic());
    if from.mode() == to.mode() {
        match semitones {
            7 => return "the dominant".to_string(),
            5 => return "the subdominant".to_string(),
            _ => {}
        }
    } else if *to == from.relative() {
        return format!("the relative {}", to.mode());
    } else if *to == from.parallel() {
        return format!("the parallel {}", to.mode());
    }

    format!("a {} key a {} above", to.mode(), interval_name(semitones))
}
