//! turbine-watch - wind turbine telemetry quality and anomaly pipeline
//!
//! Replays raw turbine readings (JSON lines) through the quality gate, the
//! tumbling-window aggregator and the anomaly detector, committing the clean,
//! window-statistics and anomaly tables after every micro-batch.
//!
//! # Usage
//!
//! ```bash
//! # Replay a file
//! turbine-watch --input readings.jsonl --output-dir out/
//!
//! # Stream from stdin with a custom config and JSON logs
//! cat readings.jsonl | turbine-watch --input - --config turbine_watch.toml --json-logs
//! ```
//!
//! # Environment Variables
//!
//! - `TURBINE_WATCH_CONFIG`: Path to a TOML config file (used when `--config` is absent)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use turbine_watch::config::PipelineConfig;
use turbine_watch::pipeline::processing_loop::ProcessingLoop;
use turbine_watch::pipeline::{BatchRunner, Pipeline};
use turbine_watch::sink::OutputSink;
use turbine_watch::source::JsonLinesSource;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "turbine-watch")]
#[command(about = "Wind turbine telemetry quality gate, window baselines and anomaly detection")]
#[command(version)]
struct CliArgs {
    /// JSON-lines file with raw readings, or "-" for stdin
    #[arg(long, default_value = "-")]
    input: String,

    /// Directory receiving clean_readings.jsonl, window_stats.jsonl and anomalies.jsonl
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Pipeline config (TOML). Falls back to $TURBINE_WATCH_CONFIG, then ./turbine_watch.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override runner.batch_size from the config
    #[arg(long)]
    batch_size: Option<usize>,

    /// Emit logs as JSON objects
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let mut config = PipelineConfig::load(args.config.as_deref()).context("Failed to load pipeline config")?;
    if let Some(batch_size) = args.batch_size {
        config.runner.batch_size = batch_size;
        config.validate().context("Invalid --batch-size")?;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!(
        window_secs = config.window.length_secs,
        sigma = config.anomaly.sigma_multiplier,
        batch_size = config.runner.batch_size,
        "turbine-watch starting"
    );

    let sink = OutputSink::new(args.output_dir.clone())
        .with_context(|| format!("Failed to prepare output directory {}", args.output_dir.display()))?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, finishing without committing the current batch");
        shutdown_token.cancel();
    });

    let processing = ProcessingLoop::new(config, BatchRunner::new(Pipeline::new()), sink, cancel_token);

    let result = if args.input == "-" {
        let mut source = JsonLinesSource::stdin();
        processing.run(&mut source).await
    } else {
        let path = PathBuf::from(&args.input);
        let mut source = JsonLinesSource::open(&path)
            .await
            .with_context(|| format!("Failed to open input {}", path.display()))?;
        processing.run(&mut source).await
    };
    let stats = result.context("Pipeline run failed")?;

    info!(
        batches = stats.batches_committed,
        anomalies = stats.anomalies,
        cancelled = stats.cancelled,
        "turbine-watch finished"
    );
    Ok(())
}
