//! Input document: recognized notes grouped into pages and measures.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, TimeSignature};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notation {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub pages: Vec<PageInput>,
}

impl Notation {
    pub fn note_count(&self) -> usize {
        self.measures().map(|(_, m)| m.notes.len()).sum()
    }

    /// Every measure with its page number, in document order.
    pub fn measures(&self) -> impl Iterator<Item = (u32, &MeasureInput)> {
        self.pages
            .iter()
            .flat_map(|p| p.measures.iter().map(move |m| (p.page_number, m)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInput {
    pub page_number: u32,
    #[serde(default)]
    pub measures: Vec<MeasureInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureInput {
    pub number: u32,
    #[serde(default)]
    pub time_signature: TimeSignature,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub notes: Vec<NoteInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInput {
    /// Pitch name with octave: "C4", "F#3", "Bb5".
    pub pitch: String,
    /// Quarter-note beats from the start of the measure.
    pub onset: f64,
    /// Quarter-note beats.
    pub duration: f64,
    pub bounding_box: BoundingBox,
}
