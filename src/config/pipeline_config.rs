//! Pipeline Configuration - window, quality and anomaly parameters as TOML values
//!
//! Each struct implements `Default` with the values in [`super::defaults`],
//! so a missing or empty config file yields the standard 24-hour / 2σ pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::types::Field;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a pipeline deployment.
///
/// Load with [`PipelineConfig::load`] which searches:
/// 1. an explicit path
/// 2. `$TURBINE_WATCH_CONFIG`
/// 3. `./turbine_watch.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tumbling window parameters
    #[serde(default)]
    pub window: WindowConfig,

    /// Quality gate value ranges
    #[serde(default)]
    pub quality: QualityConfig,

    /// Anomaly bound parameters
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Micro-batch runner settings (binary only)
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order.
    ///
    /// An explicit path must load cleanly; env/local files fall back to
    /// defaults with a warning when they cannot be used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        // 1. Explicit path
        if let Some(path) = explicit {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded pipeline config");
            return Ok(config);
        }

        // 2. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded pipeline config from {}", defaults::CONFIG_ENV_VAR);
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 3. Check ./turbine_watch.toml
        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded pipeline config from ./{}", defaults::CONFIG_FILE_NAME);
                    return Ok(config);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        // 4. Defaults
        info!("No {} found, using built-in defaults", defaults::CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are reported as warnings only.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        for w in super::validation::validate_plausibility(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all parameters for internal consistency.
    ///
    /// Rules:
    /// - Window length must be > 0
    /// - Sigma multiplier must be finite and > 0
    /// - Every range must be finite with min < max
    /// - Batch size must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.window.length_secs == 0 {
            errors.push("window.length_secs must be > 0".to_string());
        }
        if i64::try_from(self.window.length_secs).is_err() {
            errors.push(format!(
                "window.length_secs = {} does not fit a signed 64-bit second count",
                self.window.length_secs
            ));
        }

        let sigma = self.anomaly.sigma_multiplier;
        if !sigma.is_finite() || sigma <= 0.0 {
            errors.push(format!("anomaly.sigma_multiplier must be finite and > 0 (got {sigma})"));
        }

        for (field, range) in self.quality.ranges() {
            Self::check_range(range, &format!("quality.{field}"), &mut errors);
        }

        if self.runner.batch_size == 0 {
            errors.push("runner.batch_size must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_range(range: &ValueRange, name: &str, errors: &mut Vec<String>) {
        // NaN/Inf comparisons silently pass, so reject them here
        if !range.min.is_finite() || !range.max.is_finite() {
            errors.push(format!(
                "{name}: bounds must be finite (got min={}, max={})",
                range.min, range.max
            ));
            return;
        }
        if range.min >= range.max {
            errors.push(format!(
                "{name}: min ({:.3}) must be < max ({:.3})",
                range.min, range.max
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Window
// ============================================================================

/// Tumbling window parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds; windows are aligned to the Unix epoch.
    #[serde(default = "default_window_length")]
    pub length_secs: u64,
}

fn default_window_length() -> u64 {
    defaults::WINDOW_LENGTH_SECS
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            length_secs: default_window_length(),
        }
    }
}

// ============================================================================
// Quality Gate
// ============================================================================

/// Closed (or half-open when `max_exclusive`) numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    /// Treat `max` as an exclusive upper bound
    #[serde(default)]
    pub max_exclusive: bool,
}

impl ValueRange {
    pub const fn inclusive(min: f64, max: f64) -> Self {
        Self { min, max, max_exclusive: false }
    }

    pub const fn half_open(min: f64, max: f64) -> Self {
        Self { min, max, max_exclusive: true }
    }

    /// Whether `value` satisfies the range. NaN never does.
    pub fn contains(&self, value: f64) -> bool {
        if self.max_exclusive {
            value >= self.min && value < self.max
        } else {
            value >= self.min && value <= self.max
        }
    }
}

impl std::fmt::Display for ValueRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let close = if self.max_exclusive { ')' } else { ']' };
        write!(f, "[{}, {}{}", self.min, self.max, close)
    }
}

/// Value ranges enforced by the quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_power_output_range")]
    pub power_output: ValueRange,

    #[serde(default = "default_wind_speed_range")]
    pub wind_speed: ValueRange,

    #[serde(default = "default_wind_direction_range")]
    pub wind_direction: ValueRange,
}

fn default_power_output_range() -> ValueRange {
    ValueRange::inclusive(defaults::POWER_OUTPUT_MIN, defaults::POWER_OUTPUT_MAX)
}
fn default_wind_speed_range() -> ValueRange {
    ValueRange::inclusive(defaults::WIND_SPEED_MIN, defaults::WIND_SPEED_MAX)
}
fn default_wind_direction_range() -> ValueRange {
    ValueRange::half_open(defaults::WIND_DIRECTION_MIN, defaults::WIND_DIRECTION_MAX)
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            power_output: default_power_output_range(),
            wind_speed: default_wind_speed_range(),
            wind_direction: default_wind_direction_range(),
        }
    }
}

impl QualityConfig {
    /// Ranges in expectation order, keyed by the column they constrain.
    pub fn ranges(&self) -> [(Field, &ValueRange); 3] {
        [
            (Field::PowerOutput, &self.power_output),
            (Field::WindSpeed, &self.wind_speed),
            (Field::WindDirection, &self.wind_direction),
        ]
    }
}

// ============================================================================
// Anomaly
// ============================================================================

/// Anomaly bound parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Bounds are `avg ± sigma_multiplier · std`
    #[serde(default = "default_sigma_multiplier")]
    pub sigma_multiplier: f64,
}

fn default_sigma_multiplier() -> f64 {
    defaults::SIGMA_MULTIPLIER
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            sigma_multiplier: default_sigma_multiplier(),
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Raw readings per micro-batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    defaults::BATCH_SIZE
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}
