//! Window Aggregator (silver → gold)
//!
//! Assigns clean readings to epoch-aligned tumbling windows and computes
//! per-(turbine, window) power statistics with anomaly bounds.
//!
//! ## Semantics
//!
//! - `window_start = floor(epoch_secs / length) × length`, `window_end = start + length`
//! - Statistics are recomputed from the full set of readings handed in, never
//!   patched incrementally, so late or out-of-order readings simply land in
//!   their window on the next run.
//! - Empty windows produce no row; single-reading windows have no standard
//!   deviation and therefore no bounds.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::debug;

use crate::context::PipelineContext;
use crate::types::{CleanReading, TurbineId, WindowBounds, WindowStat};

// ============================================================================
// Tumbling Window Arithmetic
// ============================================================================

/// Fixed-length, epoch-aligned, non-overlapping windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TumblingWindow {
    length_secs: i64,
}

impl TumblingWindow {
    /// Window of `secs` seconds (clamped to at least one second).
    pub fn from_secs(secs: u64) -> Self {
        Self {
            length_secs: i64::try_from(secs).unwrap_or(i64::MAX).max(1),
        }
    }

    pub fn length_secs(&self) -> i64 {
        self.length_secs
    }

    pub fn length(&self) -> Duration {
        Duration::seconds(self.length_secs)
    }

    /// Window containing `ts`.
    ///
    /// Uses Euclidean division so instants before 1970 floor toward the past.
    /// Returns `None` only when the window end is not representable.
    pub fn assign(&self, ts: DateTime<Utc>) -> Option<WindowBounds> {
        let start_secs = ts.timestamp().div_euclid(self.length_secs) * self.length_secs;
        let end_secs = start_secs.checked_add(self.length_secs)?;
        Some(WindowBounds {
            start: DateTime::from_timestamp(start_secs, 0)?,
            end: DateTime::from_timestamp(end_secs, 0)?,
        })
    }

    /// Whether `bounds` is exactly one of this window's tiles.
    pub fn is_aligned(&self, bounds: &WindowBounds) -> bool {
        bounds.start.timestamp_subsec_nanos() == 0
            && bounds.start.timestamp().rem_euclid(self.length_secs) == 0
            && bounds.length() == self.length()
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Computes [`WindowStat`] rows from a snapshot of clean readings.
pub struct WindowAggregator;

impl WindowAggregator {
    /// Group readings by (turbine, window) and summarize each non-empty group.
    ///
    /// Output is ordered by `(turbine_id, window_start)`; groups are summarized
    /// in parallel.
    pub fn aggregate<'a, I>(ctx: &PipelineContext, readings: I) -> Vec<WindowStat>
    where
        I: IntoIterator<Item = &'a CleanReading>,
    {
        let window = ctx.window();
        let sigma = ctx.sigma_multiplier();

        let mut groups: BTreeMap<(TurbineId, WindowBounds), Vec<f64>> = BTreeMap::new();
        let mut unassigned = 0usize;
        for reading in readings {
            match window.assign(reading.timestamp) {
                Some(bounds) => groups
                    .entry((reading.turbine_id, bounds))
                    .or_default()
                    .push(reading.power_output),
                None => unassigned += 1,
            }
        }
        if unassigned > 0 {
            debug!(unassigned, "Readings with unrepresentable window end skipped");
        }

        groups
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|((turbine_id, bounds), powers)| summarize(turbine_id, bounds, &powers, sigma))
            .collect()
    }
}

/// Summary statistics for one non-empty group of power readings.
pub fn summarize(turbine_id: TurbineId, window: WindowBounds, powers: &[f64], sigma_multiplier: f64) -> WindowStat {
    // statrs returns NaN for the sample deviation of fewer than two values
    let std = powers.iter().std_dev();
    WindowStat {
        turbine_id,
        window,
        avg_power: powers.iter().mean(),
        min_power: Statistics::min(powers.iter()),
        max_power: Statistics::max(powers.iter()),
        std_power: (powers.len() > 1 && std.is_finite()).then_some(std),
        reading_count: powers.len() as u64,
        sigma_multiplier,
    }
}
