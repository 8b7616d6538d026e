//! System-wide default constants.
//!
//! Every value here is only a default: the matching field in
//! `PipelineConfig` overrides it.

// ============================================================================
// Window Aggregation
// ============================================================================

/// Tumbling window length (seconds). 86 400 = 24 hours.
pub const WINDOW_LENGTH_SECS: u64 = 86_400;

/// Multiplier applied to the window standard deviation to derive anomaly bounds.
pub const SIGMA_MULTIPLIER: f64 = 2.0;

// ============================================================================
// Quality Gate Ranges
// ============================================================================

/// Power output range (MW), both ends inclusive.
pub const POWER_OUTPUT_MIN: f64 = 0.0;
pub const POWER_OUTPUT_MAX: f64 = 10.0;

/// Wind speed range (m/s), both ends inclusive.
pub const WIND_SPEED_MIN: f64 = 0.0;
pub const WIND_SPEED_MAX: f64 = 100.0;

/// Wind direction range (degrees), upper end exclusive.
pub const WIND_DIRECTION_MIN: f64 = 0.0;
pub const WIND_DIRECTION_MAX: f64 = 360.0;

// ============================================================================
// Runner
// ============================================================================

/// Raw readings per micro-batch when replaying a file.
pub const BATCH_SIZE: usize = 1_000;

// ============================================================================
// Output Tables
// ============================================================================

pub const CLEAN_READINGS_FILE: &str = "clean_readings.jsonl";
pub const WINDOW_STATS_FILE: &str = "window_stats.jsonl";
pub const ANOMALIES_FILE: &str = "anomalies.jsonl";

/// Default local config file name.
pub const CONFIG_FILE_NAME: &str = "turbine_watch.toml";

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "TURBINE_WATCH_CONFIG";
