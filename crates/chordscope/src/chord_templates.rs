use crate::pitch::{PitchClass, PitchClassSet};
use crate::types::ChordQuality;

/// A chord template: quality + interval set above the root.
#[derive(Debug)]
pub struct ChordTemplate {
    pub quality: ChordQuality,
    pub intervals: PitchClassSet,
    pub size: usize,
    /// Commonness rank; lower tiers win ties.
    pub tier: u8,
}

impl ChordTemplate {
    const fn new(quality: ChordQuality, tier: u8, intervals: &[u8]) -> Self {
        Self {
            quality,
            intervals: PitchClassSet::from_intervals(intervals),
            size: intervals.len(),
            tier,
        }
    }
}

/// All recognized chord templates, most common first.
pub static TEMPLATES: &[ChordTemplate] = &[
    ChordTemplate::new(ChordQuality::Major, 0, &[0, 4, 7]),
    ChordTemplate::new(ChordQuality::Minor, 0, &[0, 3, 7]),
    ChordTemplate::new(ChordQuality::Diminished, 1, &[0, 3, 6]),
    ChordTemplate::new(ChordQuality::Augmented, 1, &[0, 4, 8]),
    ChordTemplate::new(ChordQuality::Suspended4, 1, &[0, 5, 7]),
    ChordTemplate::new(ChordQuality::Suspended2, 1, &[0, 2, 7]),
    // Sevenths and sixths
    ChordTemplate::new(ChordQuality::Dominant7, 2, &[0, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Major7, 2, &[0, 4, 7, 11]),
    ChordTemplate::new(ChordQuality::Minor7, 2, &[0, 3, 7, 10]),
    ChordTemplate::new(ChordQuality::MinorMajor7, 2, &[0, 3, 7, 11]),
    ChordTemplate::new(ChordQuality::Diminished7, 2, &[0, 3, 6, 9]),
    ChordTemplate::new(ChordQuality::HalfDiminished7, 2, &[0, 3, 6, 10]),
    ChordTemplate::new(ChordQuality::Major6, 2, &[0, 4, 7, 9]),
    ChordTemplate::new(ChordQuality::Minor6, 2, &[0, 3, 7, 9]),
    // Extended and altered
    ChordTemplate::new(ChordQuality::Add9, 3, &[0, 2, 4, 7]),
    ChordTemplate::new(ChordQuality::Dominant9, 3, &[0, 2, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Major9, 3, &[0, 2, 4, 7, 11]),
    ChordTemplate::new(ChordQuality::Minor9, 3, &[0, 2, 3, 7, 10]),
    ChordTemplate::new(ChordQuality::Dominant7Flat9, 3, &[0, 1, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Dominant7Sharp9, 3, &[0, 3, 4, 7, 10]),
    ChordTemplate::new(ChordQuality::Dominant7Flat5, 3, &[0, 4, 6, 10]),
    ChordTemplate::new(ChordQuality::Augmented7, 3, &[0, 4, 8, 10]),
    // Dyad
    ChordTemplate::new(ChordQuality::Power, 4, &[0, 7]),
];

/// The winning template for a pitch-class set.
#[derive(Debug, Clone, Copy)]
pub struct TemplateMatch {
    pub root: PitchClass,
    pub template: &'static ChordTemplate,
    /// Template tones absent from the set.
    pub missing: usize,
    /// Set members outside the template.
    pub extra: usize,
}

impl TemplateMatch {
    pub fn quality(&self) -> ChordQuality {
        self.template.quality
    }

    /// `1 - (missing + extra) / size`, floored at 0.
    pub fn confidence(&self) -> f64 {
        let penalty = (self.missing + self.extra) as f64 / self.template.size as f64;
        (1.0 - penalty).max(0.0)
    }

    /// Template tones that actually sound.
    pub fn chord_tones(&self, sounding: PitchClassSet) -> PitchClassSet {
        self.template.intervals.transposed_to(self.root).intersection(sounding)
    }

    /// Ranking key: smaller is better.
    fn rank(&self, bass: PitchClass, table_index: usize) -> (usize, usize, u8, bool, usize, PitchClass) {
        (
            self.extra,
            self.missing,
            self.template.tier,
            self.root != bass,
            table_index,
            self.root,
        )
    }
}

/// Match a set of pitch classes against every template on every root.
///
/// Prefers fewest extra notes, then fewest missing, then the more common
/// tier, then a root equal to `bass`. A match needs at least two template
/// tones and `missing + extra <= tolerance`; otherwise `None`.
pub fn match_chord(set: PitchClassSet, bass: PitchClass, tolerance: usize) -> Option<TemplateMatch> {
    let mut best: Option<(TemplateMatch, (usize, usize, u8, bool, usize, PitchClass))> = None;

    for root in 0..12u8 {
        let root = PitchClass::from(root);
        let intervals = set.relative_to(root);

        for (index, template) in TEMPLATES.iter().enumerate() {
            let matched = intervals.intersection(template.intervals).len();
            if matched < 2 {
                continue;
            }

            let candidate = TemplateMatch {
                root,
                template,
                missing: template.size - matched,
                extra: intervals.difference(template.intervals).len(),
            };
            if candidate.missing + candidate.extra > tolerance {
                continue;
            }

            let rank = candidate.rank(bass, index);
            if best.as_ref().map_or(true, |(_, best_rank)| rank < *best_rank) {
                best = Some((candidate, rank));
            }
        }
    }

    best.map(|(m, _)| m)
}

/// Compare two optional matches; `None` loses to any match.
pub(crate) fn improves(candidate: &Option<TemplateMatch>, current: &Option<TemplateMatch>) -> bool {
    match (candidate, current) {
        (Some(_), None) => true,
        (Some(c), Some(b)) => (c.extra, c.missing) < (b.extra, b.missing),
        _ => false,
    }
}
