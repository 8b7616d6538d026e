//! Config validation: unknown-key detection with Levenshtein suggestions
//! and plausibility checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for PipelineConfig.
///
/// Must be kept in step with the struct hierarchy in pipeline_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [window]
        "window",
        "window.length_secs",
        // [quality]
        "quality",
        "quality.power_output",
        "quality.power_output.min",
        "quality.power_output.max",
        "quality.power_output.max_exclusive",
        "quality.wind_speed",
        "quality.wind_speed.min",
        "quality.wind_speed.max",
        "quality.wind_speed.max_exclusive",
        "quality.wind_direction",
        "quality.wind_direction.min",
        "quality.wind_direction.max",
        "quality.wind_direction.max_exclusive",
        // [anomaly]
        "anomaly",
        "anomaly.sigma_multiplier",
        // [runner]
        "runner",
        "runner.batch_size",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Plausibility Checks
// ============================================================================

/// Flag values that are legal but unusual for wind turbine telemetry.
pub fn validate_plausibility(config: &super::PipelineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Windows that do not tile a day make daily reports straddle window edges
    let len = config.window.length_secs;
    if len > 0 && 86_400 % len != 0 && len % 86_400 != 0 {
        warnings.push(ValidationWarning {
            field: "window.length_secs".to_string(),
            message: format!("window.length_secs = {len} does not evenly divide or tile a day"),
            suggestion: None,
        });
    }

    let sigma = config.anomaly.sigma_multiplier;
    if sigma < 1.0 || sigma > 6.0 {
        warnings.push(ValidationWarning {
            field: "anomaly.sigma_multiplier".to_string(),
            message: format!("anomaly.sigma_multiplier = {sigma:.2} is outside the typical range (1-6)"),
            suggestion: None,
        });
    }

    let dir = &config.quality.wind_direction;
    if dir.min < 0.0 || dir.max > 360.0 {
        warnings.push(ValidationWarning {
            field: "quality.wind_direction".to_string(),
            message: format!("quality.wind_direction = {dir} extends beyond a compass circle"),
            suggestion: None,
        });
    }

    let power = &config.quality.power_output;
    if power.min < 0.0 {
        warnings.push(ValidationWarning {
            field: "quality.power_output.min".to_string(),
            message: format!("quality.power_output.min = {:.2} admits negative output", power.min),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
