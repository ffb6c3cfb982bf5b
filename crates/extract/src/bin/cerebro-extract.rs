//! cerebro-extract — batch waste-material extraction for one document.
//!
//! Reads a PDF (or a plain-text material description), runs every page
//! window through the configured generation backend and prints the
//! consolidated records with per-chunk diagnostics as JSON on stdout.
//! Logs go to stderr. Ctrl-C stops after the current attempt and still
//! prints what was extracted so far.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use cerebro_core::config::{self, Config};
use cerebro_extract::Pipeline;
use cerebro_llm::create_generator;

// ── CLI ─────────────────────────────────────────────────────────────

/// Extract waste-material records from a technical document.
#[derive(Parser, Debug)]
#[command(name = "cerebro-extract", version, about)]
struct Cli {
    /// Document to analyze (.pdf, .txt).
    #[arg(long)]
    file: PathBuf,

    /// Pages per chunk (1-4). Overrides PAGES_PER_CHUNK.
    #[arg(long)]
    pages_per_chunk: Option<usize>,

    /// Attempts per chunk. Overrides MAX_ATTEMPTS.
    #[arg(long)]
    max_attempts: Option<u32>,

    /// File holding the extraction instruction.
    #[arg(long, env = "EXTRACTION_INSTRUCTION_FILE")]
    instruction_file: Option<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    config::load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(pages) = cli.pages_per_chunk {
        config.pipeline.pages_per_chunk =
            pages.clamp(config::MIN_PAGES_PER_CHUNK, config::MAX_PAGES_PER_CHUNK);
    }
    if let Some(attempts) = cli.max_attempts {
        config.pipeline.max_attempts = attempts;
    }
    if cli.instruction_file.is_some() {
        config.pipeline.instruction_file = cli.instruction_file.clone();
    }
    config.validate()?;
    config.log_summary();

    let generator = create_generator(&config.llm, &config.ollama)?;
    let pipeline = Pipeline::from_config(&config, generator)?;

    let cancel = pipeline.context().cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing current attempt");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let filename = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.file.display().to_string());

    let result = pipeline
        .process_bytes(&bytes, &filename)
        .await
        .with_context(|| format!("failed to process {}", cli.file.display()))?;

    info!(
        run_id = %result.run_id,
        records = result.records.len(),
        cancelled = result.summary.cancelled,
        "extraction finished"
    );

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
