//! turbine-watch: Wind Turbine Telemetry Pipeline
//!
//! Three-stage dataflow over raw turbine readings.
//!
//! ## Architecture
//!
//! - **Quality Gate**: drops incomplete and out-of-range readings (bronze → silver)
//! - **Window Aggregator**: per-turbine tumbling-window power baselines (silver → gold)
//! - **Anomaly Detector**: flags readings outside `avg ± k·std` of their window (gold)
//!
//! Every stage receives an explicit [`PipelineContext`]; there is no global state.

pub mod config;
pub mod context;
pub mod detector;
pub mod pipeline;
pub mod quality;
pub mod sink;
pub mod source;
pub mod types;
pub mod window;

// Re-export configuration
pub use config::PipelineConfig;
pub use context::{BatchSnapshot, PipelineContext};

// Re-export commonly used types
pub use types::{
    AnomalyBounds, AnomalyRecord, CleanReading, Field, RawReading, TurbineId, WindowBounds, WindowStat,
};

// Re-export stages
pub use detector::{AnomalyDetector, DetectorError, DetectorMetrics};
pub use pipeline::{BatchOutcome, BatchRunner, Pipeline, PipelineError, PipelineOutput, Stage};
pub use quality::{DropReason, GateMetrics, QualityGate};
pub use window::{TumblingWindow, WindowAggregator};
