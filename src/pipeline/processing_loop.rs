//! Micro-batch processing loop shared by every input mode.
//!
//! Pulls raw readings from a [`ReadingSource`], cuts them into batches of
//! `runner.batch_size`, runs each batch through the [`BatchRunner`] and
//! commits the resulting tables to the [`OutputSink`].
//!
//! Cancellation is checked between readings. A batch interrupted before its
//! commit is discarded, so the sink keeps the last fully committed snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{BatchRunner, PipelineError};
use crate::config::PipelineConfig;
use crate::context::{BatchSnapshot, PipelineContext};
use crate::quality::GateMetrics;
use crate::sink::{OutputSink, SinkError};
use crate::source::{IngestError, ReadingEvent, ReadingSource};
use crate::types::RawReading;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Final statistics of a loop run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStats {
    pub batches_committed: u64,
    pub readings_seen: u64,
    pub clean_readings: usize,
    pub window_stats: usize,
    pub anomalies: usize,
    pub gate: GateMetrics,
    /// Raw readings of a batch abandoned on shutdown
    pub discarded_on_shutdown: usize,
    pub cancelled: bool,
}

/// Owns all state needed for the processing loop.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    /// Context template; each batch gets its own snapshot
    ctx: PipelineContext,
    runner: BatchRunner,
    sink: OutputSink,
    cancel_token: CancellationToken,
    clock: fn() -> DateTime<Utc>,
}

impl ProcessingLoop {
    pub fn new(config: PipelineConfig, runner: BatchRunner, sink: OutputSink, cancel_token: CancellationToken) -> Self {
        Self {
            ctx: PipelineContext::new(config, BatchSnapshot::new(0, DateTime::UNIX_EPOCH)),
            runner,
            sink,
            cancel_token,
            clock: Utc::now,
        }
    }

    /// Override the clock that stamps each batch's `processed_at`.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Run until the source is exhausted or cancellation.
    pub async fn run<S: ReadingSource>(mut self, source: &mut S) -> Result<LoopStats, LoopError> {
        let batch_size = self.ctx.config.runner.batch_size.max(1);
        let mut stats = LoopStats::default();
        let mut pending: Vec<RawReading> = Vec::with_capacity(batch_size);
        let mut next_batch_id = 1u64;

        info!(source = source.source_name(), batch_size, "Processing raw readings");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    stats.cancelled = true;
                    break;
                }
                result = source.next_reading() => result?,
            };

            let at_eof = match event {
                ReadingEvent::Reading(raw) => {
                    stats.readings_seen += 1;
                    pending.push(raw);
                    false
                }
                ReadingEvent::Eof => {
                    info!(readings = stats.readings_seen, "[ProcessingLoop] Source reached end");
                    true
                }
            };

            let flush = pending.len() >= batch_size || (at_eof && (!pending.is_empty() || next_batch_id == 1));
            if flush {
                let batch = BatchSnapshot::new(next_batch_id, (self.clock)());
                self.process_batch(batch, std::mem::take(&mut pending), &mut stats)?;
                next_batch_id += 1;
            }
            if at_eof {
                break;
            }
        }

        if !pending.is_empty() {
            warn!(readings = pending.len(), "Discarding uncommitted batch on shutdown");
            stats.discarded_on_shutdown = pending.len();
        }

        info!(
            batches = stats.batches_committed,
            readings = stats.readings_seen,
            clean = stats.clean_readings,
            windows = stats.window_stats,
            anomalies = stats.anomalies,
            dropped = stats.gate.dropped(),
            "[ProcessingLoop] Final statistics"
        );
        Ok(stats)
    }

    fn process_batch(
        &mut self,
        batch: BatchSnapshot,
        raw: Vec<RawReading>,
        stats: &mut LoopStats,
    ) -> Result<(), LoopError> {
        let ctx = self.ctx.with_batch(batch);
        let outcome = self.runner.run_batch(&ctx, raw)?;

        let summary = self.sink.commit(&outcome.clean, &outcome.window_stats, &outcome.anomalies)?;

        stats.batches_committed += 1;
        stats.clean_readings = summary.clean_readings;
        stats.window_stats = summary.window_stats;
        stats.anomalies = summary.anomalies;
        stats.gate.merge(&outcome.metrics.gate);

        info!(
            batch = batch.batch_id,
            accepted = outcome.accepted,
            dropped = outcome.metrics.gate.dropped(),
            anomalies = summary.anomalies,
            "Batch committed to {}",
            self.sink.dir().display()
        );
        Ok(())
    }
}
