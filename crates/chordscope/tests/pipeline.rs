//! End-to-end analysis of small notation documents.

use chordscope::{
    analyze, analyze_with_progress, AnalysisError, AnalysisParams, AnalysisStatus,
    CancellationFlag, ChordFunction, Key, KeyMode, MeasureInput, Notation, NoteInput, PageInput,
    Stage,
};
use chordscope::pitch::PitchClass;
use chordscope::types::{BoundingBox, TimeSignature, WarningKind};
use pretty_assertions::assert_eq;

const LETTERS: [(char, u8); 7] = [('C', 0), ('D', 2), ('E', 4), ('F', 5), ('G', 7), ('A', 9), ('B', 11)];

/// Voice a chord like "D F# A C" upward from octave 3, root in the bass.
fn voiced(chord: &str) -> Vec<String> {
    let mut octave = 3;
    let mut previous: Option<u8> = None;
    chord
        .split_whitespace()
        .map(|name| {
            let letter = name.chars().next().unwrap();
            let base = LETTERS.iter().find(|(l, _)| *l == letter).unwrap().1;
            let pc = match &name[1..] {
                "#" => (base + 1) % 12,
                "b" => (base + 11) % 12,
                _ => base,
            };
            if previous.is_some_and(|p| pc <= p) {
                octave += 1;
            }
            previous = Some(pc);
            format!("{}{}", name, octave)
        })
        .collect()
}

/// One measure of quarter-note chords.
fn measure(number: u32, chords: &[&str]) -> MeasureInput {
    let notes = chords
        .iter()
        .enumerate()
        .flat_map(|(beat, chord)| {
            voiced(chord).into_iter().enumerate().map(move |(i, pitch)| NoteInput {
                pitch,
                onset: beat as f64,
                duration: 1.0,
                bounding_box: BoundingBox::new(
                    0.1 + 0.2 * beat as f64,
                    0.4 - 0.01 * i as f64,
                    0.01,
                    0.01,
                ),
            })
        })
        .collect();

    MeasureInput {
        number,
        time_signature: TimeSignature::default(),
        bounding_box: BoundingBox::new(0.05, 0.1 * number as f64, 0.9, 0.08),
        notes,
    }
}

fn document(measures: Vec<MeasureInput>) -> Notation {
    Notation {
        id: "doc-1".into(),
        filename: "score.pdf".into(),
        pages: vec![PageInput {
            page_number: 1,
            measures,
        }],
    }
}

fn c_to_g() -> Notation {
    document(vec![
        measure(1, &["C E G", "F A C", "G B D", "C E G"]),
        measure(2, &["A C E", "D F A", "G B D", "C E G"]),
        measure(3, &["C E G", "F A C", "D F A", "G B D F"]),
        measure(4, &["C E G", "A C E", "F A C", "G B D"]),
        measure(5, &["G B D", "C E G", "D F# A", "G B D"]),
        measure(6, &["E G B", "A C E", "D F# A C", "G B D"]),
        measure(7, &["G B D", "E G B", "A C E", "D F# A"]),
        measure(8, &["G B D", "C E G", "D F# A C", "G B D"]),
    ])
}

fn major(tonic: u8) -> Key {
    Key::new(PitchClass::from(tonic), KeyMode::Major)
}

/// One measure of quarter-note chords given as explicit pitches.
fn measure_of(number: u32, chords: &[&[&str]]) -> MeasureInput {
    let notes = chords
        .iter()
        .enumerate()
        .flat_map(|(beat, pitches)| {
            pitches.iter().map(move |pitch| NoteInput {
                pitch: pitch.to_string(),
                onset: beat as f64,
                duration: 1.0,
                bounding_box: BoundingBox::new(0.1 + 0.2 * beat as f64, 0.4, 0.01, 0.01),
            })
        })
        .collect();
    MeasureInput {
        notes,
        ..measure(number, &[])
    }
}

#[test]
fn pop_progression_in_one_measure() {
    let doc = document(vec![measure_of(
        1,
        &[
            &["C4", "E4", "G4"],
            &["G4", "B4", "D5"],
            &["A4", "C5", "E5"],
            &["F4", "A4", "C5"],
        ],
    )]);
    let result = analyze(&doc).unwrap();

    assert_eq!(result.status, AnalysisStatus::Completed);
    assert_eq!(result.global_key, Key::C_MAJOR);

    let chords: Vec<_> = result.chords().collect();
    let symbols: Vec<&str> = chords.iter().map(|c| c.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["C", "G", "Am", "F"]);

    assert_eq!(result.chord_progression.roman_numerals, vec!["I", "V", "vi", "IV"]);
    let functions: Vec<ChordFunction> = chords.iter().map(|c| c.function).collect();
    assert_eq!(
        functions,
        vec![
            ChordFunction::Tonic,
            ChordFunction::Dominant,
            ChordFunction::Tonic,
            ChordFunction::Predominant,
        ]
    );
    assert_eq!(result.chord_progression.common_name.as_deref(), Some("Pop progression"));
    assert!(result.modulations.is_empty());

    let m = &result.pages[0].measures[0];
    assert_eq!(m.beats.len(), 4);
    for (beat, chord) in m.beats.iter().zip(&m.chords) {
        assert_eq!(beat.chord.as_ref(), Some(chord));
        assert_eq!(beat.notes.len(), 3);
    }
}

#[test]
fn modulation_to_dominant_with_pivot() {
    let result = analyze(&c_to_g()).unwrap();

    let local: Vec<Key> = result.pages[0].measures.iter().map(|m| m.local_key).collect();
    assert_eq!(local, [vec![major(0); 4], vec![major(7); 4]].concat());
    assert_eq!(result.global_key, major(7));

    assert_eq!(result.modulations.len(), 1);
    let modulation = &result.modulations[0];
    assert_eq!(modulation.page_number, 1);
    assert_eq!(modulation.measure_number, 5);
    assert_eq!(modulation.from_key, major(0));
    assert_eq!(modulation.to_key, major(7));

    let pivot = modulation.pivot_chord.as_ref().unwrap();
    assert_eq!(pivot.id, "p1-m4-c3");
    assert_eq!(pivot.symbol, "G");
    assert!(modulation.reasoning.contains("V in C major becomes I in G major"));
    assert!(modulation.reasoning.contains("the dominant"));

    // The pivot is shared with the measure that owns it.
    let owner = &result.pages[0].measures[3].chords[3];
    assert_eq!(owner, pivot);
}

#[test]
fn pivot_on_the_downbeat_of_the_new_key() {
    let doc = document(vec![
        measure(1, &["C E G", "F A C", "G B D", "C E G"]),
        measure(2, &["A C E", "D F A", "G B D", "C E G"]),
        measure(3, &["C E G", "F A C", "D F A", "G B D F"]),
        measure(4, &["C E G", "A C E", "F A C", "C E G"]),
        measure(5, &["G B D", "E G B", "D F# A", "G B D"]),
        measure(6, &["E G B", "A C E", "D F# A C", "G B D"]),
        measure(7, &["G B D", "E G B", "A C E", "D F# A"]),
        measure(8, &["G B D", "C E G", "D F# A C", "G B D"]),
    ]);
    let result = analyze(&doc).unwrap();

    let local: Vec<Key> = result.pages[0].measures.iter().map(|m| m.local_key).collect();
    assert_eq!(local, [vec![major(0); 4], vec![major(7); 4]].concat());

    assert_eq!(result.modulations.len(), 1);
    let modulation = &result.modulations[0];
    assert_eq!(modulation.measure_number, 5);
    let pivot = modulation.pivot_chord.as_ref().unwrap();
    assert_eq!(pivot.id, "p1-m5-c0");
    assert_eq!(pivot.symbol, "G");
    assert_eq!(
        modulation.reasoning,
        "Pivot chord G: V in C major becomes I in G major; modulation to the dominant."
    );
}

fn applied_chords() -> Notation {
    document(vec![
        measure(1, &["C E G", "F A C", "A C E", "D F# A C"]),
        measure(2, &["G B D", "C E G", "F A C", "G B D"]),
        measure(3, &["C E G", "A C# E G", "D F A", "G B D"]),
        measure(4, &["C E G", "F Ab C", "G B D F", "C E G"]),
    ])
}

#[test]
fn secondary_dominant_resolves_across_the_barline() {
    let result = analyze(&applied_chords()).unwrap();
    assert_eq!(result.global_key, Key::C_MAJOR);

    let d7 = &result.pages[0].measures[0].chords[3];
    assert_eq!(d7.symbol, "D7");
    assert_eq!(d7.roman_numeral, "V7/V");
    assert_eq!(d7.function, ChordFunction::SecondaryDominant);
}

#[test]
fn secondary_dominant_within_a_measure() {
    let result = analyze(&applied_chords()).unwrap();

    let a7 = &result.pages[0].measures[2].chords[1];
    assert_eq!(a7.symbol, "A7");
    assert_eq!(a7.roman_numeral, "V7/ii");
    assert_eq!(a7.function, ChordFunction::SecondaryDominant);
    assert_eq!(result.pages[0].measures[2].chords[2].roman_numeral, "ii");
}

#[test]
fn minor_subdominant_is_borrowed() {
    let result = analyze(&applied_chords()).unwrap();

    let fm = &result.pages[0].measures[3].chords[1];
    assert_eq!(fm.root, "F");
    assert_eq!(fm.roman_numeral, "iv");
    assert_eq!(fm.function, ChordFunction::Borrowed);
    assert!(result.modulations.is_empty());
}

#[test]
fn local_key_labels_follow_each_region() {
    let result = analyze(&c_to_g()).unwrap();
    let measures = &result.pages[0].measures;

    // G7 in C, D7 in G: both plain dominants.
    assert_eq!(measures[2].chords[3].roman_numeral, "V7");
    assert_eq!(measures[5].chords[2].roman_numeral, "V7");
    assert_eq!(measures[5].chords[2].function, ChordFunction::Dominant);
    assert_eq!(measures[4].chords[2].symbol, "D");
    assert_eq!(measures[4].chords[2].notes, vec!["D", "F#", "A"]);
}

#[test]
fn output_is_deterministic() {
    let doc = c_to_g();
    let first = serde_json::to_string(&analyze(&doc).unwrap()).unwrap();
    let second = serde_json::to_string(&analyze(&doc).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn parallel_matches_sequential() {
    let doc = c_to_g();
    let sequential = AnalysisParams {
        parallel: false,
        ..AnalysisParams::default()
    };
    let a = analyze(&doc).unwrap();
    let b = analyze_with_progress(&doc, &sequential, |_| {}, &CancellationFlag::new()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn empty_document() {
    let doc = Notation {
        id: "empty".into(),
        filename: "blank.pdf".into(),
        pages: vec![],
    };
    let result = analyze(&doc).unwrap();

    assert_eq!(result.status, AnalysisStatus::Completed);
    assert_eq!(result.global_key, Key::C_MAJOR);
    assert!(result.pages.is_empty());
    assert!(result.modulations.is_empty());
    assert!(result.chord_progression.roman_numerals.is_empty());
    assert_eq!(result.chord_progression.common_name, None);
}

#[test]
fn silent_measure_inherits_global_key() {
    let mut doc = document(vec![measure(1, &["C E G", "F A C", "G B D", "C E G"])]);
    doc.pages[0].measures.push(measure(2, &[]));
    let result = analyze(&doc).unwrap();

    let silent = &result.pages[0].measures[1];
    assert!(silent.chords.is_empty());
    assert_eq!(silent.local_key, result.global_key);
    assert!(silent.beats.iter().all(|b| b.chord.is_none() && b.notes.is_empty()));
}

#[test]
fn no_modulation_in_opening_measures() {
    let doc = document(vec![
        measure(1, &["G B D", "D F# A", "G B D", "D F# A C"]),
        measure(2, &["C E G", "F A C", "G B D", "C E G"]),
        measure(3, &["A C E", "D F A", "G B D", "C E G"]),
        measure(4, &["C E G", "F A C", "G B D F", "C E G"]),
        measure(5, &["C E G", "A C E", "F A C", "G B D"]),
    ]);
    let result = analyze(&doc).unwrap();

    assert!(result.modulations.iter().all(|m| m.measure_number > 2));
    for pair in result.modulations.windows(2) {
        assert_ne!(pair[0].to_key, pair[1].to_key);
    }
}

#[test]
fn chord_invariants_hold() {
    let result = analyze(&c_to_g()).unwrap();
    for measure in &result.pages[0].measures {
        let onsets: std::collections::BTreeSet<u64> = measure
            .beats
            .iter()
            .flat_map(|b| b.notes.iter())
            .map(|n| n.onset.to_bits())
            .collect();
        assert!(measure.chords.len() <= onsets.len());
        for chord in &measure.chords {
            assert!((0.0..=1.0).contains(&chord.confidence));
            assert!(chord.bounding_box.is_valid());
            assert!(!chord.note_indices.is_empty());
        }
    }
}

#[test]
fn json_input_with_bad_note() {
    let json = r#"{
        "id": "ocr-7",
        "filename": "page.png",
        "pages": [{
            "pageNumber": 2,
            "measures": [{
                "number": 12,
                "boundingBox": {"x": 0.1, "y": 0.2, "width": 0.3, "height": 0.1},
                "notes": [
                    {"pitch": "A3", "onset": 0.0, "duration": 2.0,
                     "boundingBox": {"x": 0.11, "y": 0.25, "width": 0.01, "height": 0.01}},
                    {"pitch": "C4", "onset": 0.0, "duration": 2.0,
                     "boundingBox": {"x": 0.11, "y": 0.23, "width": 0.01, "height": 0.01}},
                    {"pitch": "Q#4", "onset": 0.0, "duration": 2.0,
                     "boundingBox": {"x": 0.11, "y": 0.22, "width": 0.01, "height": 0.01}},
                    {"pitch": "E4", "onset": 0.0, "duration": 2.0,
                     "boundingBox": {"x": 0.11, "y": 0.21, "width": 0.01, "height": 0.01}}
                ]
            }]
        }]
    }"#;
    let doc: Notation = serde_json::from_str(json).unwrap();
    let result = analyze(&doc).unwrap();

    assert_eq!(result.warnings.len(), 1);
    let warning = &result.warnings[0];
    assert_eq!(warning.kind, WarningKind::InvalidPitchName);
    assert_eq!((warning.page_number, warning.measure_number, warning.note_index), (2, 12, Some(2)));

    let measure = &result.pages[0].measures[0];
    assert_eq!(measure.time_signature, TimeSignature::default());
    assert_eq!(measure.chords[0].symbol, "Am");
    assert_eq!(measure.chords[0].id, "p2-m12-c0");
    assert_eq!(measure.chords[0].note_indices, vec![0, 1, 3]);

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["pages"][0]["pageNumber"], 2);
    assert_eq!(value["chordProgression"]["romanNumerals"][0], "i");
    assert_eq!(value["warnings"][0]["kind"], "invalid_pitch_name");
    assert!(value.get("error").is_none());
}

#[test]
fn progress_and_cancellation() {
    let doc = c_to_g();

    let mut stages = Vec::new();
    analyze_with_progress(&doc, &AnalysisParams::default(), |e| stages.push(e.stage), &CancellationFlag::new())
        .unwrap();
    assert_eq!(stages, Stage::ALL.to_vec());

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let err = analyze_with_progress(&doc, &AnalysisParams::default(), |_| {}, &cancel).unwrap_err();
    assert_eq!(err, AnalysisError::Cancelled { stage: Stage::ChordGrouping });
}
