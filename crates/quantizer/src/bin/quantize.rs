use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tactus_domain::{ExportFormat, JsonExporter, LilyPondExporter, NotationExporter, Pitch};
use tactus_quantizer::{QEventSequence, Quantizer, QuantizerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Lilypond,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Quantize timed note events into notation", long_about = None)]
struct Cli {
    /// JSON list of `{ "duration_ms": .., "pitches": [..] | null }` records
    input: PathBuf,
    /// YAML or JSON quantizer settings
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Lilypond)]
    format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    duration_ms: f64,
    #[serde(default)]
    pitches: Option<Vec<i32>>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => QuantizerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => QuantizerConfig::default(),
    };

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading events {}", cli.input.display()))?;
    let records: Vec<EventRecord> = serde_json::from_str(&text)
        .with_context(|| format!("parsing events {}", cli.input.display()))?;
    let pairs: Vec<(f64, Option<Vec<Pitch>>)> = records
        .into_iter()
        .map(|record| {
            let pitches = record
                .pitches
                .map(|pitches| pitches.into_iter().map(Pitch::new).collect());
            (record.duration_ms, pitches)
        })
        .collect();
    let sequence = QEventSequence::from_millisecond_pitch_pairs(&pairs)?;
    info!(events = sequence.len(), "loaded event sequence");

    let quantizer = Quantizer::new(config.options()?);
    let voice = quantizer.quantize(&sequence, &config.schema()?)?;

    let bytes = match cli.format {
        OutputFormat::Lilypond => LilyPondExporter.export(&voice, ExportFormat::LilyPond)?,
        OutputFormat::Json => JsonExporter.export(&voice, ExportFormat::Json)?,
    };
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}
