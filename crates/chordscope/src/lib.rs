pub mod analyzer;
pub mod cache;
pub mod chord_symbol;
pub mod chord_templates;
pub mod chords;
pub mod function;
pub mod key;
pub mod modulation;
pub mod notation;
pub mod pipeline;
pub mod pitch;
pub mod progression;
pub mod types;

pub use analyzer::{HarmonyAnalyzer, HeuristicAnalyzer};
pub use cache::AnalysisCache;
pub use chord_symbol::{describe as describe_chord, ChordDescription, ChordSymbolError};
pub use chordconf::AnalysisParams;
pub use function::{degree_profile, DegreeProfile};
pub use key::{Key, KeyMode};
pub use notation::{MeasureInput, Notation, NoteInput, PageInput};
pub use pipeline::{
    analyze, analyze_with_progress, AnalysisError, CancellationFlag, ProgressEvent, Stage,
};
pub use types::{
    AnalysisResult, AnalysisStatus, AnalysisWarning, ChordAnalysis, ChordFunction, ChordQuality,
    Modulation, NonChordTone,
};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

/// Current algorithm version; bump to invalidate cached results.
pub const CURRENT_VERSION: u32 = 1;

/// Cached analysis front end.
///
/// Documents are content-addressed by the blake3 hash of their JSON together
/// with the analysis parameters, so changing a parameter never serves a stale
/// result.
pub struct AnalysisEngine {
    analyzer: Arc<dyn HarmonyAnalyzer>,
    cache: Option<AnalysisCache>,
    params: AnalysisParams,
}

impl AnalysisEngine {
    /// Heuristic analyzer with a SQLite cache at `cache_db_path`.
    pub fn new(params: AnalysisParams, cache_db_path: &Path) -> Result<Self> {
        Self::with_analyzer(Arc::new(HeuristicAnalyzer), params, Some(cache_db_path))
    }

    pub fn without_cache(params: AnalysisParams) -> Self {
        Self {
            analyzer: Arc::new(HeuristicAnalyzer),
            cache: None,
            params,
        }
    }

    /// Custom analyzer backend, optionally cached.
    pub fn with_analyzer(
        analyzer: Arc<dyn HarmonyAnalyzer>,
        params: AnalysisParams,
        cache_db_path: Option<&Path>,
    ) -> Result<Self> {
        let cache = cache_db_path
            .map(AnalysisCache::open)
            .transpose()
            .context("opening analysis cache")?;
        if let Some(cache) = &cache {
            let removed = cache.prune(CURRENT_VERSION)?;
            if removed > 0 {
                info!(removed, version = CURRENT_VERSION, "pruned stale cache rows");
            }
        }

        Ok(Self {
            analyzer,
            cache,
            params,
        })
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn content_hash(&self, notation: &Notation) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&serde_json::to_vec(notation).context("serializing notation for hashing")?);
        hasher.update(&serde_json::to_vec(&self.params).context("serializing params for hashing")?);
        let hash = hasher.finalize();
        // Truncated to 128 bits.
        Ok(hex::encode(&hash.as_bytes()[..16]))
    }

    /// Analyze `notation`, returning a cached result when one exists.
    pub fn analyze(&self, notation: &Notation) -> Result<AnalysisResult> {
        self.analyze_with_progress(notation, |_| {}, &CancellationFlag::new())
    }

    pub fn analyze_with_progress(
        &self,
        notation: &Notation,
        sink: impl FnMut(ProgressEvent),
        cancel: &CancellationFlag,
    ) -> Result<AnalysisResult> {
        let Some(cache) = &self.cache else {
            return self.compute(notation, sink, cancel);
        };

        let hash = self.content_hash(notation)?;
        if let Some(cached) = cache.get(&hash, CURRENT_VERSION)? {
            info!(hash = %hash, id = %notation.id, "analysis cache hit");
            return Ok(cached);
        }

        info!(hash = %hash, id = %notation.id, "analysis cache miss, computing");
        let result = self.compute(notation, sink, cancel)?;
        cache.put(&hash, CURRENT_VERSION, &result)?;
        Ok(result)
    }

    fn compute(
        &self,
        notation: &Notation,
        sink: impl FnMut(ProgressEvent),
        cancel: &CancellationFlag,
    ) -> Result<AnalysisResult> {
        pipeline::run(self.analyzer.as_ref(), notation, &self.params, sink, cancel)
            .with_context(|| format!("analyzing {}", notation.filename))
    }
}
