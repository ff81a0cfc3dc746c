//! Command-line converter
//!
//! Run with: cargo run -p rag-convert --bin rag-convert -- report.pdf -o report.json

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rag_convert::{ConversionService, ConverterConfig, UploadedDocument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "rag-convert",
    version,
    about = "Convert a PDF, EPUB, XLSX, DTA or CSV file into RAG-ready JSON"
)]
struct Cli {
    /// File to convert; its extension selects the format
    input: PathBuf,

    /// Write the JSON to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML configuration file (defaults to $RAG_CONVERT_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_convert=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConverterConfig::load(path)?,
        None => ConverterConfig::from_env()?,
    };
    let service = ConversionService::new(&config)?;

    let filename = cli
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} is not a file path", cli.input.display()))?;
    let data = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let converted = service.convert(UploadedDocument::new(&filename, None, data))?;

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &converted.json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Wrote {} ({} units/rows) to {}",
                converted.output_filename,
                converted.artifact.len(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&converted.json)?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}
