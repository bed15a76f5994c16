//! Stage orchestration: notation in, `AnalysisResult` out.
//!
//! Stages run in order: chord grouping, key estimation, function
//! classification, modulation detection, assembly. Each emits a
//! [`ProgressEvent`] and checks the [`CancellationFlag`] when it finishes.
//! Per-measure work in grouping and classification runs on the rayon pool
//! when `parallel` is set; results are identical either way.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chordconf::{AnalysisParams, SpellingPolicy};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analyzer::{HarmonyAnalyzer, HeuristicAnalyzer};
use crate::chord_symbol;
use crate::chords::{ChordCandidate, MeasureGrouping, NoteEvent};
use crate::function::{ChordShape, FunctionLabel};
use crate::key::{Key, KeyEstimate, PitchHistogram};
use crate::modulation::{HarmonyChord, MeasureHarmony};
use crate::notation::{MeasureInput, Notation};
use crate::pitch::{interval, spell, Pitch};
use crate::progression;
use crate::types::{
    AnalysisResult, AnalysisStatus, AnalysisWarning, Beat, BoundingBox, ChordAnalysis, Measure,
    NoteInfo, PageAnalysis, TimeSignature, WarningKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ChordGrouping,
    KeyEstimation,
    FunctionClassification,
    ModulationDetection,
    Assembly,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ChordGrouping,
        Stage::KeyEstimation,
        Stage::FunctionClassification,
        Stage::ModulationDetection,
        Stage::Assembly,
    ];

    /// Fraction of the pipeline complete once this stage finishes.
    pub fn progress(self) -> f64 {
        match self {
            Stage::ChordGrouping => 0.2,
            Stage::KeyEstimation => 0.4,
            Stage::FunctionClassification => 0.6,
            Stage::ModulationDetection => 0.8,
            Stage::Assembly => 1.0,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Stage::ChordGrouping => "Detecting chords...",
            Stage::KeyEstimation => "Estimating keys...",
            Stage::FunctionClassification => "Analyzing harmony...",
            Stage::ModulationDetection => "Detecting key changes...",
            Stage::Assembly => "Complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ChordGrouping => "chord grouping",
            Stage::KeyEstimation => "key estimation",
            Stage::FunctionClassification => "function classification",
            Stage::ModulationDetection => "modulation detection",
            Stage::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub progress: f64,
    pub message: &'static str,
}

/// Shared flag a host sets to abandon an analysis between stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis cancelled after {stage}")]
    Cancelled { stage: Stage },
}

/// Analyze with default parameters and the heuristic backend.
pub fn analyze(notation: &Notation) -> Result<AnalysisResult, AnalysisError> {
    analyze_with_progress(
        notation,
        &AnalysisParams::default(),
        |_| {},
        &CancellationFlag::new(),
    )
}

pub fn analyze_with_progress(
    notation: &Notation,
    params: &AnalysisParams,
    sink: impl FnMut(ProgressEvent),
    cancel: &CancellationFlag,
) -> Result<AnalysisResult, AnalysisError> {
    run(&HeuristicAnalyzer, notation, params, sink, cancel)
}

/// A measure after input validation.
struct PreparedMeasure {
    page_index: usize,
    page_number: u32,
    number: u32,
    time_signature: TimeSignature,
    bounding_box: BoundingBox,
    notes: Vec<NoteEvent>,
}

/// Run every stage through `analyzer`.
pub fn run(
    analyzer: &dyn HarmonyAnalyzer,
    notation: &Notation,
    params: &AnalysisParams,
    mut sink: impl FnMut(ProgressEvent),
    cancel: &CancellationFlag,
) -> Result<AnalysisResult, AnalysisError> {
    let mut finish = |stage: Stage| -> Result<(), AnalysisError> {
        debug!(stage = %stage, "stage complete");
        sink(ProgressEvent {
            stage,
            progress: stage.progress(),
            message: stage.message(),
        });
        if cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled { stage });
        }
        Ok(())
    };

    let (measures, warnings) = prepare(notation);

    let groupings: Vec<MeasureGrouping> =
        map_measures(&measures, params.parallel, |_, m| analyzer.group_chords(&m.notes, params));
    finish(Stage::ChordGrouping)?;

    let histograms: Vec<PitchHistogram> = measures.iter().map(|m| histogram(&m.notes)).collect();
    let mut total = PitchHistogram::default();
    for h in &histograms {
        total.merge(h);
    }
    let global = analyzer.estimate_key(&total);
    let local: Vec<KeyEstimate> = analyzer.local_keys(&histograms, params.key_window, &global);
    debug!(global = %global.key, correlation = global.correlation, "global key");
    finish(Stage::KeyEstimation)?;

    let shapes: Vec<Vec<Option<ChordShape>>> = groupings
        .iter()
        .map(|g| g.candidates.iter().map(shape_of).collect())
        .collect();
    // First chord after each measure, for resolutions across the barline.
    let mut following: Vec<Option<ChordShape>> = vec![None; measures.len()];
    let mut upcoming: Option<Option<ChordShape>> = None;
    for i in (0..measures.len()).rev() {
        following[i] = upcoming.flatten();
        if let Some(first) = shapes[i].first() {
            upcoming = Some(*first);
        }
    }

    let harmonies: Vec<MeasureHarmony> = map_measures(&measures, params.parallel, |i, m| {
        let key = local[i].key;
        let chords = groupings[i]
            .candidates
            .iter()
            .enumerate()
            .map(|(j, candidate)| {
                let shape = shapes[i][j];
                let next = match shapes[i].get(j + 1) {
                    Some(next) => *next,
                    None => following[i],
                };
                let label = match &shape {
                    Some(s) => analyzer.classify(s, &key, next.as_ref()),
                    None => FunctionLabel::unknown(),
                };
                HarmonyChord {
                    analysis: Arc::new(chord_analysis(m, j, candidate, shape, label, &key, params.spelling)),
                    shape,
                    pitches: candidate.pitches,
                }
            })
            .collect();
        MeasureHarmony {
            page_number: m.page_number,
            measure_number: m.number,
            bounding_box: m.bounding_box,
            key,
            chords,
        }
    });
    finish(Stage::FunctionClassification)?;

    let modulations = analyzer.detect_modulations(&harmonies, params);
    finish(Stage::ModulationDetection)?;

    let mut pages: Vec<PageAnalysis> = notation
        .pages
        .iter()
        .map(|p| PageAnalysis {
            page_number: p.page_number,
            measures: Vec::new(),
        })
        .collect();
    let mut numerals = Vec::new();

    for ((prepared, harmony), grouping) in measures.iter().zip(harmonies).zip(&groupings) {
        let chords: Vec<Arc<ChordAnalysis>> = harmony.chords.into_iter().map(|c| c.analysis).collect();
        numerals.extend(chords.iter().map(|c| c.roman_numeral.clone()));

        let measure = Measure {
            number: prepared.number,
            bounding_box: prepared.bounding_box,
            beats: beats(prepared, grouping, &chords, &harmony.key, params.spelling),
            local_key: harmony.key,
            chords,
            time_signature: prepared.time_signature,
        };
        pages[prepared.page_index].measures.push(measure);
    }

    let result = AnalysisResult {
        id: notation.id.clone(),
        filename: notation.filename.clone(),
        pages,
        global_key: global.key,
        modulations,
        chord_progression: progression::summarize(numerals),
        status: AnalysisStatus::Completed,
        error: None,
        warnings,
    };
    finish(Stage::Assembly)?;

    info!(
        id = %result.id,
        measures = measures.len(),
        chords = result.chord_progression.roman_numerals.len(),
        modulations = result.modulations.len(),
        global_key = %result.global_key,
        "analysis complete"
    );
    Ok(result)
}

fn map_measures<U, F>(measures: &[PreparedMeasure], parallel: bool, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize, &PreparedMeasure) -> U + Sync + Send,
{
    if parallel {
        measures.par_iter().enumerate().map(|(i, m)| f(i, m)).collect()
    } else {
        measures.iter().enumerate().map(|(i, m)| f(i, m)).collect()
    }
}

/// Validate the input, dropping unusable notes with a warning each.
fn prepare(notation: &Notation) -> (Vec<PreparedMeasure>, Vec<AnalysisWarning>) {
    let mut measures = Vec::new();
    let mut warnings = Vec::new();

    for (page_index, page) in notation.pages.iter().enumerate() {
        for input in &page.measures {
            let mut report = |kind: WarningKind, note_index: Option<usize>, message: String| {
                warn!(
                    page = page.page_number,
                    measure = input.number,
                    note = ?note_index,
                    "{}",
                    message
                );
                warnings.push(AnalysisWarning {
                    kind,
                    page_number: page.page_number,
                    measure_number: input.number,
                    note_index,
                    message,
                });
            };

            let time_signature = if input.time_signature.is_valid() {
                input.time_signature
            } else {
                report(
                    WarningKind::InvalidTimeSignature,
                    None,
                    format!(
                        "time signature {}/{} replaced by 4/4",
                        input.time_signature.numerator, input.time_signature.denominator
                    ),
                );
                TimeSignature::default()
            };
            let bounding_box = checked_box(input.bounding_box, None, &mut report);
            let notes = prepare_notes(input, &mut report);

            measures.push(PreparedMeasure {
                page_index,
                page_number: page.page_number,
                number: input.number,
                time_signature,
                bounding_box,
                notes,
            });
        }
    }

    (measures, warnings)
}

fn prepare_notes(
    input: &MeasureInput,
    report: &mut impl FnMut(WarningKind, Option<usize>, String),
) -> Vec<NoteEvent> {
    let mut notes = Vec::with_capacity(input.notes.len());

    for (index, note) in input.notes.iter().enumerate() {
        let pitch = match Pitch::parse(&note.pitch) {
            Ok(pitch) => pitch,
            Err(e) => {
                report(WarningKind::InvalidPitchName, Some(index), e.to_string());
                continue;
            }
        };
        if !(note.duration.is_finite() && note.duration > 0.0) {
            report(
                WarningKind::NonPositiveDuration,
                Some(index),
                format!("duration {} is not positive", note.duration),
            );
            continue;
        }
        if !note.onset.is_finite() || note.onset < 0.0 {
            report(
                WarningKind::InvalidOnset,
                Some(index),
                format!("onset {} is outside the measure", note.onset),
            );
            continue;
        }

        notes.push(NoteEvent {
            index,
            pitch,
            onset: note.onset,
            duration: note.duration,
            bounding_box: checked_box(note.bounding_box, Some(index), report),
        });
    }

    notes
}

fn checked_box(
    bbox: BoundingBox,
    note_index: Option<usize>,
    report: &mut impl FnMut(WarningKind, Option<usize>, String),
) -> BoundingBox {
    if bbox.is_valid() {
        return bbox;
    }
    let clamped = bbox.clamped();
    report(
        WarningKind::BoundingBoxClamped,
        note_index,
        format!("bounding box {:?} clamped to {:?}", bbox, clamped),
    );
    clamped
}

fn histogram(notes: &[NoteEvent]) -> PitchHistogram {
    let mut h = PitchHistogram::default();
    for note in notes {
        h.add(note.pitch.class(), note.duration);
    }
    h
}

fn shape_of(candidate: &ChordCandidate) -> Option<ChordShape> {
    candidate.matched.map(|m| ChordShape {
        root: m.root,
        quality: m.quality(),
        bass: candidate.bass.class(),
    })
}

fn chord_analysis(
    measure: &PreparedMeasure,
    index: usize,
    candidate: &ChordCandidate,
    shape: Option<ChordShape>,
    label: FunctionLabel,
    key: &Key,
    policy: SpellingPolicy,
) -> ChordAnalysis {
    let bass = candidate.bass.class();
    let root = shape.map_or(bass, |s| s.root);
    let root_name = spell(root, key, policy);

    let (symbol, tones) = match (&shape, &candidate.matched) {
        (Some(s), Some(m)) => (chord_symbol::render(s, key, policy), m.chord_tones(candidate.pitches)),
        _ => (format!("{}?", root_name), candidate.pitches),
    };

    let mut ordered: Vec<_> = tones.iter().collect();
    ordered.sort_by_key(|pc| interval(root, *pc));

    ChordAnalysis {
        id: format!("p{}-m{}-c{}", measure.page_number, measure.number, index),
        symbol,
        root: root_name.to_string(),
        quality: shape.map(|s| s.quality),
        bass: (shape.is_some() && bass != root).then(|| spell(bass, key, policy).to_string()),
        notes: ordered.into_iter().map(|pc| spell(pc, key, policy).to_string()).collect(),
        note_indices: candidate.note_indices.clone(),
        bounding_box: candidate.bounding_box,
        roman_numeral: label.numeral,
        function: label.function,
        confidence: candidate.confidence,
        beat_position: measure.time_signature.beat_at(candidate.onset),
        onset: candidate.onset,
        duration: candidate.duration,
    }
}

/// One beat per time-signature beat, each with the notes starting in it and
/// the first chord starting on it.
fn beats(
    measure: &PreparedMeasure,
    grouping: &MeasureGrouping,
    chords: &[Arc<ChordAnalysis>],
    key: &Key,
    policy: SpellingPolicy,
) -> Vec<Beat> {
    let flags: HashMap<usize, _> = grouping.non_chord_tones.iter().copied().collect();
    let ts = measure.time_signature;

    let mut beats: Vec<Beat> = (1..=ts.numerator)
        .map(|number| Beat {
            number,
            notes: Vec::new(),
            chord: chords
                .iter()
                .find(|c| c.beat_position == number)
                .map(Arc::clone),
        })
        .collect();

    for note in &measure.notes {
        let slot = (ts.beat_at(note.onset) - 1) as usize;
        beats[slot].notes.push(NoteInfo {
            pitch: note.pitch.spelled(key, policy),
            onset: note.onset,
            duration: note.duration,
            bounding_box: note.bounding_box,
            non_chord_tone: flags.get(&note.index).copied(),
        });
    }

    beats
}
