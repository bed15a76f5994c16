//! chordscope - harmonic analysis of recognized sheet music
//!
//! Subcommands:
//! - `chordscope analyze <notation.json>` - Analyze a notation document
//! - `chordscope explain <numeral>` - Describe a Roman numeral's function
//! - `chordscope chord <symbol> --key <key>` - Read a chord symbol in a key
//! - `chordscope config` - Print the effective configuration

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chordconf::{ChordConfig, ConfigSources};
use chordscope::{
    degree_profile, describe_chord, AnalysisEngine, AnalysisResult, CancellationFlag, Key, Notation,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chordscope")]
#[command(about = "Chords, keys, functions and modulations from recognized notation")]
#[command(version)]
struct Cli {
    /// Config file replacing ./chordscope.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a notation JSON document
    Analyze {
        /// Notation document (JSON)
        path: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the result cache
        #[arg(long)]
        no_cache: bool,

        /// Print stage progress events to stderr as JSON lines
        #[arg(long)]
        progress: bool,
    },

    /// Explain what a Roman numeral does (e.g. V7, ii, bVII)
    Explain { numeral: String },

    /// Read a chord symbol (e.g. Cmaj7, D7/F#) in a key
    Chord {
        symbol: String,

        /// Key context: "C", "Am", "F# minor"
        #[arg(short, long, default_value = "C")]
        key: Key,

        /// Chord that follows, for applied dominants
        #[arg(long)]
        next: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, sources) =
        ChordConfig::load_with_sources_from(cli.config.as_deref()).context("loading configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze {
            path,
            output,
            no_cache,
            progress,
        } => analyze(&config, &path, output.as_deref(), no_cache, progress),
        Commands::Explain { numeral } => {
            let profile = degree_profile(&numeral);
            println!("{}", serde_json::to_string_pretty(&profile)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Chord { symbol, key, next } => {
            let description = describe_chord(&symbol, &key, next.as_deref(), config.analysis.spelling)?;
            println!("{}", serde_json::to_string_pretty(&description)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}{}", source_comments(&sources), config.to_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn source_comments(sources: &ConfigSources) -> String {
    let mut out = String::new();
    for file in &sources.files {
        out.push_str(&format!("# loaded {}\n", file.display()));
    }
    for var in &sources.env_overrides {
        out.push_str(&format!("# overridden by {}\n", var));
    }
    out
}

fn analyze(
    config: &ChordConfig,
    path: &Path,
    output: Option<&Path>,
    no_cache: bool,
    progress: bool,
) -> Result<ExitCode> {
    let notation = match read_notation(path) {
        Ok(notation) => notation,
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{:#}", e), "unreadable notation");
            let id = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            let filename = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            write_result(&AnalysisResult::failed(id, filename, format!("{:#}", e)), output)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(id = %notation.id, notes = notation.note_count(), "loaded notation");

    let params = config.analysis.clone();
    let engine = if no_cache || !config.cache.enabled {
        AnalysisEngine::without_cache(params)
    } else {
        AnalysisEngine::new(params, &config.cache.path)?
    };

    let result = engine.analyze_with_progress(
        &notation,
        |event| {
            if progress {
                if let Ok(line) = serde_json::to_string(&event) {
                    eprintln!("{}", line);
                }
            }
        },
        &CancellationFlag::new(),
    )?;

    write_result(&result, output)?;
    Ok(ExitCode::SUCCESS)
}

fn read_notation(path: &Path) -> Result<Notation> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn write_result(result: &AnalysisResult, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}
