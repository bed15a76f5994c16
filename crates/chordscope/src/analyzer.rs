use chordconf::AnalysisParams;

use crate::chords::{group_measure, MeasureGrouping, NoteEvent};
use crate::function::{classify, ChordShape, FunctionLabel};
use crate::key::{estimate_key, local_keys, Key, KeyEstimate, PitchHistogram};
use crate::modulation::{detect_modulations, MeasureHarmony};
use crate::types::Modulation;

/// Trait for harmony analysis backends.
///
/// The pipeline drives every stage through this seam, so a backend can
/// replace one stage (say, key finding) and inherit the rest.
pub trait HarmonyAnalyzer: Send + Sync {
    fn group_chords(&self, notes: &[NoteEvent], params: &AnalysisParams) -> MeasureGrouping;

    fn estimate_key(&self, histogram: &PitchHistogram) -> KeyEstimate;

    fn local_keys(
        &self,
        measures: &[PitchHistogram],
        window: usize,
        global: &KeyEstimate,
    ) -> Vec<KeyEstimate>;

    fn classify(&self, chord: &ChordShape, key: &Key, next: Option<&ChordShape>) -> FunctionLabel;

    fn detect_modulations(&self, measures: &[MeasureHarmony], params: &AnalysisParams) -> Vec<Modulation>;
}

/// Heuristic analyzer: onset clustering with template matching,
/// Krumhansl-Schmuckler key finding, degree-table function labels and
/// run-length modulation detection.
pub struct HeuristicAnalyzer;

impl HarmonyAnalyzer for HeuristicAnalyzer {
    fn group_chords(&self, notes: &[NoteEvent], params: &AnalysisParams) -> MeasureGrouping {
        group_measure(notes, params)
    }

    fn estimate_key(&self, histogram: &PitchHistogram) -> KeyEstimate {
        estimate_key(histogram)
    }

    fn local_keys(
        &self,
        measures: &[PitchHistogram],
        window: usize,
        global: &KeyEstimate,
    ) -> Vec<KeyEstimate> {
        local_keys(measures, window, global)
    }

    fn classify(&self, chord: &ChordShape, key: &Key, next: Option<&ChordShape>) -> FunctionLabel {
        classify(chord, key, next)
    }

    fn detect_modulations(&self, measures: &[MeasureHarmony], params: &AnalysisParams) -> Vec<Modulation> {
        detect_modulations(measures, params)
    }
}
