//! Anomaly Detector (silver ⋈ gold → anomalies)
//!
//! Joins every clean reading to the statistics of the window containing it,
//! flags readings outside `[lower_bound, upper_bound]`, and emits the
//! deduplicated anomalous subset.
//!
//! ## Join predicate
//!
//! `reading.turbine_id == stat.turbine_id && stat.start <= reading.timestamp < stat.end`
//!
//! The window set is validated before joining: every window must be an
//! aligned tile of the configured length and no two windows of one turbine
//! may overlap. A reading therefore matches at most one window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::PipelineContext;
use crate::types::{AnomalyRecord, CleanReading, TurbineId, WindowBounds, WindowStat};
use crate::window::TumblingWindow;

// ============================================================================
// Error Types
// ============================================================================

/// Contract breaches in the window statistics handed to the detector.
#[derive(Debug, Error, PartialEq)]
pub enum DetectorError {
    #[error("Window {window} for turbine {turbine_id} is not an aligned {expected_secs}s tumbling window")]
    MisalignedWindow {
        turbine_id: TurbineId,
        window: WindowBounds,
        expected_secs: i64,
    },

    #[error("Overlapping windows for turbine {turbine_id}: {first} and {second}")]
    OverlappingWindows {
        turbine_id: TurbineId,
        first: WindowBounds,
        second: WindowBounds,
    },
}

// ============================================================================
// Window Index
// ============================================================================

/// Per-turbine lookup of validated, disjoint windows.
#[derive(Debug)]
pub struct WindowIndex<'a> {
    by_turbine: HashMap<TurbineId, BTreeMap<DateTime<Utc>, &'a WindowStat>>,
}

impl<'a> WindowIndex<'a> {
    /// Index `stats`, rejecting misaligned or overlapping windows.
    pub fn build(stats: &'a [WindowStat], window: TumblingWindow) -> Result<Self, DetectorError> {
        let mut by_turbine: HashMap<TurbineId, BTreeMap<DateTime<Utc>, &'a WindowStat>> = HashMap::new();

        for stat in stats {
            if !window.is_aligned(&stat.window) {
                return Err(DetectorError::MisalignedWindow {
                    turbine_id: stat.turbine_id,
                    window: stat.window,
                    expected_secs: window.length_secs(),
                });
            }
            let windows = by_turbine.entry(stat.turbine_id).or_default();
            if let Some(existing) = windows.insert(stat.window.start, stat) {
                return Err(DetectorError::OverlappingWindows {
                    turbine_id: stat.turbine_id,
                    first: existing.window,
                    second: stat.window,
                });
            }
        }

        for (turbine_id, windows) in &by_turbine {
            let ordered: Vec<&WindowStat> = windows.values().copied().collect();
            for pair in ordered.windows(2) {
                if pair[0].window.overlaps(&pair[1].window) {
                    return Err(DetectorError::OverlappingWindows {
                        turbine_id: *turbine_id,
                        first: pair[0].window,
                        second: pair[1].window,
                    });
                }
            }
        }

        Ok(Self { by_turbine })
    }

    /// The single window of `turbine_id` containing `ts`, if any.
    pub fn lookup(&self, turbine_id: TurbineId, ts: DateTime<Utc>) -> Option<&'a WindowStat> {
        self.by_turbine
            .get(&turbine_id)?
            .range(..=ts)
            .next_back()
            .map(|(_, stat)| *stat)
            .filter(|stat| stat.window.contains(ts))
    }

    pub fn len(&self) -> usize {
        self.by_turbine.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Join Results & Metrics
// ============================================================================

/// A clean reading paired with its window, before anomaly filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedReading {
    pub reading: CleanReading,
    pub window: WindowStat,
    /// `None` when the window has no bounds (single reading)
    pub is_anomaly: Option<bool>,
}

/// Inner-join output.
#[derive(Debug, Clone, Default)]
pub struct JoinOutput {
    pub joined: Vec<JoinedReading>,
    /// Readings with no window of their turbine covering their timestamp
    pub misses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectorMetrics {
    pub readings: u64,
    pub joined: u64,
    pub join_misses: u64,
    /// Joined readings whose window has undefined bounds
    pub unclassifiable: u64,
    pub anomalies: u64,
    /// Exact duplicates collapsed
    pub duplicates_collapsed: u64,
    /// Anomalies sharing (turbine, timestamp) with different measurements
    pub conflicting_duplicates: u64,
}

/// Detector output: anomalies sorted by `(turbine_id, timestamp)`.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub anomalies: Vec<AnomalyRecord>,
    pub metrics: DetectorMetrics,
}

// ============================================================================
// Anomaly Detector
// ============================================================================

pub struct AnomalyDetector;

impl AnomalyDetector {
    /// Inner-join readings to their containing window and classify them.
    pub fn join(
        ctx: &PipelineContext,
        readings: &[CleanReading],
        stats: &[WindowStat],
    ) -> Result<JoinOutput, DetectorError> {
        let index = WindowIndex::build(stats, ctx.window())?;

        let mut out = JoinOutput::default();
        for reading in readings {
            match index.lookup(reading.turbine_id, reading.timestamp) {
                Some(stat) => out.joined.push(JoinedReading {
                    reading: reading.clone(),
                    window: stat.clone(),
                    is_anomaly: stat.classify(reading.power_output),
                }),
                None => out.misses += 1,
            }
        }
        Ok(out)
    }

    /// Join, keep anomalous readings, collapse duplicates.
    pub fn detect(
        ctx: &PipelineContext,
        readings: &[CleanReading],
        stats: &[WindowStat],
    ) -> Result<Detection, DetectorError> {
        let join = Self::join(ctx, readings, stats)?;

        let mut metrics = DetectorMetrics {
            readings: readings.len() as u64,
            joined: join.joined.len() as u64,
            join_misses: join.misses,
            ..Default::default()
        };

        let mut kept: HashMap<(TurbineId, DateTime<Utc>), AnomalyRecord> = HashMap::new();
        for row in join.joined {
            match row.is_anomaly {
                None => {
                    metrics.unclassifiable += 1;
                    continue;
                }
                Some(false) => continue,
                Some(true) => {}
            }

            let key = (row.reading.turbine_id, row.reading.timestamp);
            match kept.get(&key) {
                Some(existing) if same_measurements(&existing.reading, &row.reading) => {
                    metrics.duplicates_collapsed += 1;
                }
                Some(_) => {
                    metrics.conflicting_duplicates += 1;
                    warn!(
                        turbine_id = key.0,
                        timestamp = %key.1,
                        "Conflicting anomalous readings share a timestamp, keeping the first"
                    );
                }
                None => {
                    kept.insert(
                        key,
                        AnomalyRecord {
                            reading: row.reading,
                            window: row.window,
                            is_anomaly: true,
                        },
                    );
                }
            }
        }

        let mut anomalies: Vec<AnomalyRecord> = kept.into_values().collect();
        anomalies.sort_by_key(|a| (a.reading.turbine_id, a.reading.timestamp));
        metrics.anomalies = anomalies.len() as u64;

        debug!(
            joined = metrics.joined,
            misses = metrics.join_misses,
            anomalies = metrics.anomalies,
            "Anomaly detection complete"
        );
        Ok(Detection { anomalies, metrics })
    }
}

/// Bitwise equality of the measured columns; `loaded_time` is ignored so a
/// replayed reading collapses onto its first ingestion.
fn same_measurements(a: &CleanReading, b: &CleanReading) -> bool {
    a.turbine_id == b.turbine_id
        && a.timestamp == b.timestamp
        && a.wind_speed.to_bits() == b.wind_speed.to_bits()
        && a.wind_direction.to_bits() == b.wind_direction.to_bits()
        && a.power_output.to_bits() == b.power_output.to_bits()
}
