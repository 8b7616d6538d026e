//! Reading types (bronze and silver layers)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TurbineId;

/// One sensor sample exactly as received from the ingestion runtime.
///
/// Every column is nullable. The timestamp stays textual until the quality
/// gate normalizes it, so unparsable values surface as malformed records
/// rather than as schema failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawReading {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub turbine_id: Option<TurbineId>,
    /// Wind speed (m/s)
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Wind direction (degrees from north)
    #[serde(default)]
    pub wind_direction: Option<f64>,
    /// Power output (MW)
    #[serde(default)]
    pub power_output: Option<f64>,
}

impl RawReading {
    /// Current value of a numeric column, `None` for null or for `Field::Timestamp`.
    pub fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Timestamp => None,
            Field::TurbineId => self.turbine_id.map(f64::from),
            Field::WindSpeed => self.wind_speed,
            Field::WindDirection => self.wind_direction,
            Field::PowerOutput => self.power_output,
        }
    }
}

/// A reading that passed every quality expectation.
///
/// Invariants (enforced by the quality gate, never re-checked downstream):
/// `0 <= power_output <= 10`, `0 <= wind_speed <= 100`, `0 <= wind_direction < 360`
/// under the default bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReading {
    /// Sample instant, normalized to UTC
    pub timestamp: DateTime<Utc>,
    pub turbine_id: TurbineId,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub power_output: f64,
    /// Wall-clock instant of the batch that admitted this reading
    pub loaded_time: DateTime<Utc>,
}

/// Columns of the raw reading schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Timestamp,
    TurbineId,
    WindSpeed,
    WindDirection,
    PowerOutput,
}

impl Field {
    /// Column name as it appears in the input schema
    pub fn name(&self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::TurbineId => "turbine_id",
            Field::WindSpeed => "wind_speed",
            Field::WindDirection => "wind_direction",
            Field::PowerOutput => "power_output",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
