//! Window statistic types (gold layer)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TurbineId;

/// Half-open interval `[start, end)` of one tumbling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowBounds {
    /// Whether `ts` falls inside `[start, end)`
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn length(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Whether the two intervals share at least one instant
    pub fn overlaps(&self, other: &WindowBounds) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Outlier thresholds derived from a window baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyBounds {
    pub lower: f64,
    pub upper: f64,
}

impl AnomalyBounds {
    /// True when `value` lies strictly outside `[lower, upper]`
    pub fn is_outlier(&self, value: f64) -> bool {
        value > self.upper || value < self.lower
    }
}

/// Summary statistics of power output for one (turbine, window) group.
///
/// Bounds are never stored: [`WindowStat::bounds`] derives them from
/// `avg_power`, `std_power` and the sigma multiplier in force when the
/// statistic was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "WindowStatRow")]
pub struct WindowStat {
    pub turbine_id: TurbineId,
    pub window: WindowBounds,
    pub avg_power: f64,
    pub min_power: f64,
    pub max_power: f64,
    /// Sample standard deviation; undefined for single-reading windows
    pub std_power: Option<f64>,
    pub reading_count: u64,
    pub sigma_multiplier: f64,
}

impl WindowStat {
    /// `avg ± k·std`, or `None` when the standard deviation is undefined.
    pub fn bounds(&self) -> Option<AnomalyBounds> {
        let std = self.std_power?;
        let spread = self.sigma_multiplier * std;
        Some(AnomalyBounds {
            lower: self.avg_power - spread,
            upper: self.avg_power + spread,
        })
    }

    /// Classify a power value against this window.
    ///
    /// Returns `None` when the window has no defined bounds: such a reading is
    /// neither anomalous nor normal.
    pub fn classify(&self, power_output: f64) -> Option<bool> {
        self.bounds().map(|b| b.is_outlier(power_output))
    }
}

/// Flat output row for a [`WindowStat`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStatRow {
    pub turbine_id: TurbineId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub avg_power: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub std_power: Option<f64>,
    pub reading_count: u64,
    pub upper_bound: Option<f64>,
    pub lower_bound: Option<f64>,
}

impl From<WindowStat> for WindowStatRow {
    fn from(stat: WindowStat) -> Self {
        let bounds = stat.bounds();
        Self {
            turbine_id: stat.turbine_id,
            window_start: stat.window.start,
            window_end: stat.window.end,
            avg_power: stat.avg_power,
            min_power: stat.min_power,
            max_power: stat.max_power,
            std_power: stat.std_power,
            reading_count: stat.reading_count,
            upper_bound: bounds.map(|b| b.upper),
            lower_bound: bounds.map(|b| b.lower),
        }
    }
}
