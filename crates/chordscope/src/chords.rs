use chordconf::AnalysisParams;

use crate::chord_templates::{improves, match_chord, TemplateMatch};
use crate::pitch::{Pitch, PitchClassSet};
use crate::types::{BoundingBox, NonChordTone};

/// A validated input note, ready for grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Position in the source measure's note list.
    pub index: usize,
    pub pitch: Pitch,
    pub onset: f64,
    pub duration: f64,
    pub bounding_box: BoundingBox,
}

/// A group of simultaneous notes and the template it matched.
#[derive(Debug, Clone)]
pub struct ChordCandidate {
    /// Sounding pitch classes, non-chord tones removed.
    pub pitches: PitchClassSet,
    pub bass: Pitch,
    pub onset: f64,
    pub duration: f64,
    pub bounding_box: BoundingBox,
    pub note_indices: Vec<usize>,
    pub matched: Option<TemplateMatch>,
    pub confidence: f64,
}

/// Chord candidates of one measure plus the notes flagged along the way.
#[derive(Debug, Clone, Default)]
pub struct MeasureGrouping {
    pub candidates: Vec<ChordCandidate>,
    pub non_chord_tones: Vec<(usize, NonChordTone)>,
    pub cluster_count: usize,
}

/// Partition notes into onset clusters.
///
/// A note joins the current cluster while its onset is less than `window`
/// after the cluster's first onset. Clusters come back sorted by onset, and
/// each cluster by pitch.
pub fn cluster_onsets(notes: &[NoteEvent], window: f64) -> Vec<Vec<&NoteEvent>> {
    let mut sorted: Vec<&NoteEvent> = notes.iter().collect();
    sorted.sort_by(|a, b| a.onset.total_cmp(&b.onset).then(a.pitch.cmp(&b.pitch)));

    let mut clusters: Vec<Vec<&NoteEvent>> = Vec::new();
    for note in sorted {
        match clusters.last_mut() {
            Some(cluster) if note.onset - cluster[0].onset < window => cluster.push(note),
            _ => clusters.push(vec![note]),
        }
    }

    for cluster in &mut clusters {
        cluster.sort_by(|a, b| a.pitch.cmp(&b.pitch).then(a.index.cmp(&b.index)));
    }
    clusters
}

/// Group one measure's notes into chord candidates.
pub fn group_measure(notes: &[NoteEvent], params: &AnalysisParams) -> MeasureGrouping {
    let clusters = cluster_onsets(notes, params.simultaneity_window);
    let mut grouping = MeasureGrouping {
        cluster_count: clusters.len(),
        ..Default::default()
    };

    for (i, cluster) in clusters.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| clusters[p].as_slice()).unwrap_or(&[]);
        let next = clusters.get(i + 1).map(|c| c.as_slice()).unwrap_or(&[]);

        let (chord_notes, flagged) = strip_non_chord_tones(cluster, prev, next, params.match_tolerance);
        grouping.non_chord_tones.extend(flagged);

        if let Some(candidate) = build_candidate(&chord_notes, params.match_tolerance) {
            grouping.candidates.push(candidate);
        }
    }

    grouping
}

/// Remove stepwise passing/neighbor tones while doing so improves the match.
fn strip_non_chord_tones<'a>(
    cluster: &[&'a NoteEvent],
    prev: &[&NoteEvent],
    next: &[&NoteEvent],
    tolerance: usize,
) -> (Vec<&'a NoteEvent>, Vec<(usize, NonChordTone)>) {
    let mut working: Vec<&NoteEvent> = cluster.to_vec();
    let mut flagged = Vec::new();

    let distinct = pitch_set(&working);
    if distinct.len() == 1 {
        // A lone melody note: either an embellishment or a bare sonority.
        if let Some(kind) = working.iter().find_map(|n| classify_embellishment(n, prev, next)) {
            flagged.extend(working.iter().map(|n| (n.index, kind)));
            working.clear();
        }
        return (working, flagged);
    }

    let mut current = match_working(&working, tolerance);
    while current.map_or(true, |m| m.extra > 0) {
        let Some(bass) = working.first().map(|n| n.pitch) else {
            break;
        };

        let mut best: Option<(usize, NonChordTone, Option<TemplateMatch>)> = None;
        for (pos, note) in working.iter().enumerate() {
            if note.pitch.class() == bass.class() {
                continue;
            }
            let Some(kind) = classify_embellishment(note, prev, next) else {
                continue;
            };
            let remaining: Vec<&NoteEvent> = working
                .iter()
                .enumerate()
                .filter(|(p, _)| *p != pos)
                .map(|(_, n)| *n)
                .collect();
            let rematched = match_working(&remaining, tolerance);
            let beats_best = best
                .as_ref()
                .map_or(true, |(_, _, b)| improves(&rematched, b));
            if beats_best {
                best = Some((pos, kind, rematched));
            }
        }

        match best {
            Some((pos, kind, rematched)) if improves(&rematched, &current) => {
                let note = working.remove(pos);
                flagged.push((note.index, kind));
                current = rematched;
            }
            _ => break,
        }
    }

    (working, flagged)
}

/// Passing if approached and left by step in one direction, neighbor if it
/// steps away and back to the same pitch.
fn classify_embellishment(note: &NoteEvent, prev: &[&NoteEvent], next: &[&NoteEvent]) -> Option<NonChordTone> {
    let step = |d: i16| (1..=2).contains(&d.abs());
    let mut found = None;

    for p in prev {
        let approach = note.pitch.midi() - p.pitch.midi();
        if !step(approach) {
            continue;
        }
        for n in next {
            let departure = n.pitch.midi() - note.pitch.midi();
            if !step(departure) {
                continue;
            }
            if approach.signum() == departure.signum() {
                return Some(NonChordTone::Passing);
            }
            if n.pitch == p.pitch {
                found = Some(NonChordTone::Neighbor);
            }
        }
    }

    found
}

fn pitch_set(notes: &[&NoteEvent]) -> PitchClassSet {
    notes.iter().map(|n| n.pitch.class()).collect()
}

fn match_working(notes: &[&NoteEvent], tolerance: usize) -> Option<TemplateMatch> {
    let bass = notes.iter().map(|n| n.pitch).min()?;
    match_chord(pitch_set(notes), bass.class(), tolerance)
}

fn build_candidate(notes: &[&NoteEvent], tolerance: usize) -> Option<ChordCandidate> {
    let bass = notes.iter().map(|n| n.pitch).min()?;
    let onset = notes.iter().map(|n| n.onset).fold(f64::INFINITY, f64::min);
    let end = notes
        .iter()
        .map(|n| n.onset + n.duration)
        .fold(f64::NEG_INFINITY, f64::max);
    let bounding_box = notes
        .iter()
        .skip(1)
        .fold(notes[0].bounding_box, |acc, n| acc.union(&n.bounding_box));

    let pitches = pitch_set(notes);
    let matched = match_chord(pitches, bass.class(), tolerance);
    let mut note_indices: Vec<usize> = notes.iter().map(|n| n.index).collect();
    note_indices.sort_unstable();

    Some(ChordCandidate {
        pitches,
        bass,
        onset,
        duration: end - onset,
        bounding_box,
        note_indices,
        confidence: matched.map_or(0.0, |m| m.confidence()),
        matched,
    })
}
