//! Explicit execution context handed to every pipeline stage.
//!
//! Carries the configuration and the identity of the batch being processed.
//! Stages read nothing else: no environment, no global session, no clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::window::TumblingWindow;

/// Handle for the input snapshot of one micro-batch.
///
/// `processed_at` is the ingestion time stamped on every clean reading of
/// the batch. Pinning it here makes a retried batch reproduce identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub batch_id: u64,
    pub processed_at: DateTime<Utc>,
}

impl BatchSnapshot {
    pub fn new(batch_id: u64, processed_at: DateTime<Utc>) -> Self {
        Self { batch_id, processed_at }
    }

    /// Snapshot stamped with the current wall-clock time
    pub fn now(batch_id: u64) -> Self {
        Self::new(batch_id, Utc::now())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub batch: BatchSnapshot,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig, batch: BatchSnapshot) -> Self {
        Self { config, batch }
    }

    /// Same configuration, different batch
    pub fn with_batch(&self, batch: BatchSnapshot) -> Self {
        Self {
            config: self.config.clone(),
            batch,
        }
    }

    /// Tumbling window described by the configuration.
    pub fn window(&self) -> TumblingWindow {
        TumblingWindow::from_secs(self.config.window.length_secs)
    }

    pub fn sigma_multiplier(&self) -> f64 {
        self.config.anomaly.sigma_multiplier
    }
}
