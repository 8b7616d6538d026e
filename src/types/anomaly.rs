//! Anomaly output record (gold layer)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CleanReading, TurbineId, WindowStat};

/// A clean reading joined to the statistics of its containing window.
///
/// Only readings classified as outliers become records, so `is_anomaly`
/// is always true in emitted output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "AnomalyRow")]
pub struct AnomalyRecord {
    pub reading: CleanReading,
    pub window: WindowStat,
    pub is_anomaly: bool,
}

/// Flat output row for an [`AnomalyRecord`]; carries the turbine id once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    pub timestamp: DateTime<Utc>,
    pub turbine_id: TurbineId,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub power_output: f64,
    pub loaded_time: DateTime<Utc>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub avg_power: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub std_power: Option<f64>,
    pub upper_bound: Option<f64>,
    pub lower_bound: Option<f64>,
    pub is_anomaly: bool,
}

impl From<AnomalyRecord> for AnomalyRow {
    fn from(record: AnomalyRecord) -> Self {
        let bounds = record.window.bounds();
        let r = record.reading;
        Self {
            timestamp: r.timestamp,
            turbine_id: r.turbine_id,
            wind_speed: r.wind_speed,
            wind_direction: r.wind_direction,
            power_output: r.power_output,
            loaded_time: r.loaded_time,
            window_start: record.window.window.start,
            window_end: record.window.window.end,
            avg_power: record.window.avg_power,
            min_power: record.window.min_power,
            max_power: record.window.max_power,
            std_power: record.window.std_power,
            upper_bound: bounds.map(|b| b.upper),
            lower_bound: bounds.map(|b| b.lower),
            is_anomaly: record.is_anomaly,
        }
    }
}
