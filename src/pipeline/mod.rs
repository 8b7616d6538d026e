//! Processing Pipeline Module
//!
//! ## Stage Graph
//!
//! ```text
//! raw readings (bronze)
//!      │
//!      ▼
//! QualityGate        drop incomplete / out-of-range, stamp loaded_time
//!      │ clean readings (silver)
//!      ├──────────────────────┐
//!      ▼                      │
//! WindowAggregator            │  per-(turbine, window) avg/min/max/std
//!      │ window stats (gold)  │
//!      ▼                      ▼
//! AnomalyDetector    join reading ⋈ window, keep |power - avg| > k·std
//!      │
//!      ▼
//! anomalies (gold)
//! ```
//!
//! The graph is fixed at compile time and [`Pipeline::stages`] orders it so
//! every stage runs after the stages it reads from. [`Pipeline::run`] is a
//! pure function of the context and the raw snapshot; [`BatchRunner`] layers
//! micro-batch accumulation on top of it.

mod runner;
pub mod processing_loop;

pub use runner::{BatchOutcome, BatchRunner};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::ConfigError;
use crate::context::PipelineContext;
use crate::detector::{AnomalyDetector, DetectorError, DetectorMetrics};
use crate::quality::{GateMetrics, QualityGate};
use crate::types::{AnomalyRecord, CleanReading, RawReading, WindowStat};
use crate::window::WindowAggregator;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Anomaly detection failed: {0}")]
    Detector(#[from] DetectorError),
}

// ============================================================================
// Stage Graph
// ============================================================================

/// A node of the dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    QualityGate,
    WindowAggregator,
    AnomalyDetector,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::QualityGate, Stage::WindowAggregator, Stage::AnomalyDetector];

    /// Stages whose output this stage reads.
    pub fn dependencies(&self) -> &'static [Stage] {
        match self {
            Stage::QualityGate => &[],
            Stage::WindowAggregator => &[Stage::QualityGate],
            Stage::AnomalyDetector => &[Stage::QualityGate, Stage::WindowAggregator],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::QualityGate => "quality_gate",
            Stage::WindowAggregator => "window_aggregator",
            Stage::AnomalyDetector => "anomaly_detector",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Output & Metrics
// ============================================================================

/// Summary of one pipeline evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineMetrics {
    pub batch_id: u64,
    pub gate: GateMetrics,
    pub windows: u64,
    pub detector: DetectorMetrics,
}

/// Every table the pipeline materializes.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub clean: Vec<CleanReading>,
    pub window_stats: Vec<WindowStat>,
    pub anomalies: Vec<AnomalyRecord>,
    pub metrics: PipelineMetrics,
}

/// Window statistics and anomalies derived from a clean table.
#[derive(Debug, Clone, Default)]
pub struct Derived {
    pub window_stats: Vec<WindowStat>,
    pub anomalies: Vec<AnomalyRecord>,
    pub detector: DetectorMetrics,
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    gate: QualityGate,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default quality gate (e.g. to add expectations)
    pub fn with_gate(gate: QualityGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Stages in an order where every stage follows its dependencies.
    pub fn stages() -> Vec<Stage> {
        fn visit(stage: Stage, order: &mut Vec<Stage>) {
            if order.contains(&stage) {
                return;
            }
            for dep in stage.dependencies() {
                visit(*dep, order);
            }
            order.push(stage);
        }

        let mut order = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            visit(stage, &mut order);
        }
        order
    }

    /// Evaluate the whole graph over one raw snapshot.
    pub fn run<I>(&self, ctx: &PipelineContext, raw: I) -> Result<PipelineOutput, PipelineError>
    where
        I: IntoIterator<Item = RawReading>,
    {
        ctx.config.validate()?;

        let (clean, gate) = self.clean(ctx, raw);
        let derived = self.derive(ctx, &clean)?;

        Ok(PipelineOutput {
            clean,
            metrics: PipelineMetrics {
                batch_id: ctx.batch.batch_id,
                gate,
                windows: derived.window_stats.len() as u64,
                detector: derived.detector,
            },
            window_stats: derived.window_stats,
            anomalies: derived.anomalies,
        })
    }

    /// Quality gate stage only.
    pub fn clean<I>(&self, ctx: &PipelineContext, raw: I) -> (Vec<CleanReading>, GateMetrics)
    where
        I: IntoIterator<Item = RawReading>,
    {
        let (clean, metrics) = self.gate.apply(ctx, raw);
        info!(
            stage = %Stage::QualityGate,
            batch = ctx.batch.batch_id,
            seen = metrics.seen,
            accepted = metrics.accepted,
            malformed = metrics.malformed,
            dropped = metrics.dropped(),
            "Stage complete"
        );
        (clean, metrics)
    }

    /// Every stage downstream of the quality gate, over a clean table.
    pub fn derive(&self, ctx: &PipelineContext, clean: &[CleanReading]) -> Result<Derived, PipelineError> {
        let mut derived = Derived::default();

        for stage in Self::stages() {
            match stage {
                // Input is already gated
                Stage::QualityGate => continue,
                Stage::WindowAggregator => {
                    derived.window_stats = WindowAggregator::aggregate(ctx, clean);
                    info!(
                        stage = %stage,
                        batch = ctx.batch.batch_id,
                        readings = clean.len(),
                        windows = derived.window_stats.len(),
                        "Stage complete"
                    );
                }
                Stage::AnomalyDetector => {
                    let detection = AnomalyDetector::detect(ctx, clean, &derived.window_stats)?;
                    info!(
                        stage = %stage,
                        batch = ctx.batch.batch_id,
                        joined = detection.metrics.joined,
                        unclassifiable = detection.metrics.unclassifiable,
                        anomalies = detection.metrics.anomalies,
                        "Stage complete"
                    );
                    derived.anomalies = detection.anomalies;
                    derived.detector = detection.metrics;
                }
            }
        }

        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::context::BatchSnapshot;
    use chrono::{TimeZone, Utc};

    fn ctx() -> PipelineContext {
        let processed_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        PipelineContext::new(PipelineConfig::default(), BatchSnapshot::new(7, processed_at))
    }

    fn raw(ts: &str, power_output: f64) -> RawReading {
        RawReading {
            timestamp: Some(ts.to_string()),
            turbine_id: Some(1),
            wind_speed: Some(12.0),
            wind_direction: Some(180.0),
            power_output: Some(power_output),
        }
    }

    #[test]
    fn test_stage_order_respects_dependencies() {
        let order = Pipeline::stages();
        assert_eq!(order, Stage::ALL.to_vec());
        assert_eq!(order, vec![Stage::QualityGate, Stage::WindowAggregator, Stage::AnomalyDetector]);
        for (i, stage) in order.iter().enumerate() {
            for dep in stage.dependencies() {
                let pos = order.iter().position(|s| s == dep).unwrap();
                assert!(pos < i, "{dep} must run before {stage}");
            }
        }
    }

    #[test]
    fn test_run_produces_all_tables() {
        let mut input: Vec<RawReading> = (0..10)
            .map(|i| raw(&format!("2024-01-01T{:02}:00:00", i), [4.0, 5.0, 6.0][i % 3]))
            .collect();
        input.push(raw("2024-01-01T20:00:00", 9.9));
        input.push(raw("2024-01-01T21:00:00", 12.0)); // out of range

        let out = Pipeline::new().run(&ctx(), input).unwrap();
        assert_eq!(out.clean.len(), 11);
        assert_eq!(out.window_stats.len(), 1);
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].reading.power_output, 9.9);
        assert_eq!(out.metrics.batch_id, 7);
        assert_eq!(out.metrics.gate.dropped(), 1);
        assert_eq!(out.metrics.windows, 1);
    }

    #[test]
    fn test_derive_detects_against_freshly_aggregated_windows() {
        let ctx = ctx();
        let (clean, _) = Pipeline::new().clean(
            &ctx,
            (0..10)
                .map(|i| raw(&format!("2024-01-01T{:02}:00:00", i), [4.0, 5.0, 6.0][i % 3]))
                .chain(std::iter::once(raw("2024-01-01T20:00:00", 9.9))),
        );

        let derived = Pipeline::new().derive(&ctx, &clean).unwrap();
        assert_eq!(derived.window_stats.len(), 1);
        assert_eq!(derived.window_stats[0].reading_count, 11);
        assert_eq!(derived.detector.joined, 11);
        assert_eq!(derived.anomalies.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.anomaly.sigma_multiplier = 0.0;
        let ctx = PipelineContext::new(config, ctx().batch);
        let err = Pipeline::new().run(&ctx, Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_empty_snapshot() {
        let out = Pipeline::new().run(&ctx(), Vec::new()).unwrap();
        assert!(out.clean.is_empty());
        assert!(out.window_stats.is_empty());
        assert!(out.anomalies.is_empty());
    }
}
