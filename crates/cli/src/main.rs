//! `eobscan` - extract billing rows from statement scans and reconcile them
//! against a fee schedule.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use eobscan_core::BillingRow;
use eobscan_ocr::{
    format_lines, FeeSchedule, PipelineConfig, PresetRecognizer, Reconciler, StatementPipeline,
};

#[derive(Parser)]
#[command(name = "eobscan")]
#[command(about = "Rebuild statement layout from OCR words and extract billing rows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deskew a statement image, rebuild its lines and print billing rows as JSON
    Extract {
        /// Statement image (PNG, JPEG, ...)
        #[arg(short, long)]
        image: PathBuf,

        /// Word list from the OCR engine: JSON array of {text, vertices}
        #[arg(short, long)]
        words: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat the image as already upright
        #[arg(long)]
        no_deskew: bool,

        /// Print pre- and post-rotation lines to stderr
        #[arg(long)]
        dump_lines: bool,

        /// Label stored on every row (defaults to the image file name)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Compare extracted rows against a fee schedule
    Reconcile {
        /// Rows previously printed by `extract`
        #[arg(short, long)]
        rows: PathBuf,

        /// Fee schedule: JSON array of {"Procedure Code", "Price" | "PriceLTEQ21" + "PriceGT21"}
        #[arg(short, long)]
        schedule: PathBuf,

        /// Allowed difference between billed and scheduled amounts
        #[arg(short, long)]
        tolerance: Option<Decimal>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Accept a match against either age tier instead of requiring both
        #[arg(long)]
        any_tier: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON only.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            image,
            words,
            config,
            no_deskew,
            dump_lines,
            source,
        } => extract(&image, &words, config.as_deref(), no_deskew, dump_lines, source).await,
        Commands::Reconcile {
            rows,
            schedule,
            tolerance,
            config,
            any_tier,
        } => reconcile(&rows, &schedule, tolerance, config.as_deref(), any_tier),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

async fn extract(
    image: &Path,
    words: &Path,
    config: Option<&Path>,
    no_deskew: bool,
    dump_lines: bool,
    source: Option<String>,
) -> Result<()> {
    let mut config = load_config(config)?;
    config.skip_deskew |= no_deskew;

    let json = tokio::fs::read_to_string(words)
        .await
        .with_context(|| format!("Failed to read word list {}", words.display()))?;
    let recognizer = PresetRecognizer::from_json(&json)?;
    let pipeline = StatementPipeline::new(recognizer, config);

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read image {}", image.display()))?;
    let label = source.or_else(|| image.file_name().map(|n| n.to_string_lossy().into_owned()));
    let result = pipeline
        .process_bytes(&bytes, label.as_deref())
        .with_context(|| format!("Failed to process {}", image.display()))?;

    if dump_lines {
        let name = label.as_deref().unwrap_or("statement");
        eprint!("{}", format_lines(&format!("{name}  (lines_pre)"), &result.layout.pre_lines));
        eprint!("{}", format_lines(&format!("{name}  (lines_post)"), &result.layout.post_lines));
    }

    tracing::info!(
        angle_deg = result.layout.angle_deg,
        rows = result.rows.len(),
        "Extraction finished"
    );
    println!("{}", serde_json::to_string_pretty(&result.rows)?);
    Ok(())
}

fn reconcile(
    rows: &Path,
    schedule: &Path,
    tolerance: Option<Decimal>,
    config: Option<&Path>,
    any_tier: bool,
) -> Result<()> {
    let mut config = load_config(config)?.reconcile;
    if let Some(tolerance) = tolerance {
        anyhow::ensure!(!tolerance.is_sign_negative(), "Tolerance must not be negative");
        config.tolerance = tolerance;
    }
    if any_tier {
        config.compare_single_against_both = false;
    }

    let rows_json = std::fs::read_to_string(rows)
        .with_context(|| format!("Failed to read rows {}", rows.display()))?;
    let rows: Vec<BillingRow> = serde_json::from_str(&rows_json)
        .context("Rows file is not a JSON array of billing rows")?;
    let schedule_json = std::fs::read_to_string(schedule)
        .with_context(|| format!("Failed to read fee schedule {}", schedule.display()))?;
    let schedule = FeeSchedule::from_json(&schedule_json).context("Invalid fee schedule")?;

    let report = Reconciler::from_config(&config).reconcile(&rows, &schedule);
    tracing::info!(
        matched = report.summary.matched,
        mismatched = report.summary.mismatched,
        codes = schedule.len(),
        "Reconciliation finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
