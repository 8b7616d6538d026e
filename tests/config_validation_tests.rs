//! Config Validation Tests
//!
//! Tests for typo detection (unknown keys with suggestions), hard validation
//! of parameter ranges and the file/TOML loading paths.
//!
//! These tests exercise the config layer independently from the rest of the
//! pipeline.

use std::io::Write;

use turbine_watch::config::validation::{
    known_config_keys, suggest_correction, validate_plausibility, validate_unknown_keys,
};
use turbine_watch::config::{ConfigError, PipelineConfig, ValueRange};

// ============================================================================
// Typo Detection Tests
// ============================================================================

#[test]
fn typo_in_sigma_multiplier_warns_with_suggestion() {
    let toml_str = r#"
[anomaly]
sigma_multiplyer = 3.0
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("sigma_multiplyer"));
    assert_eq!(warnings[0].suggestion.as_deref(), Some("anomaly.sigma_multiplier"));
}

#[test]
fn typo_in_section_name_warns_for_section_and_key() {
    let toml_str = r#"
[windw]
length_secs = 3600
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 2);
    let suggestions: Vec<_> = warnings.iter().filter_map(|w| w.suggestion.as_deref()).collect();
    assert!(suggestions.contains(&"window"));
    assert!(suggestions.contains(&"window.length_secs"));
}

#[test]
fn valid_config_produces_zero_warnings() {
    let toml_str = r#"
[window]
length_secs = 3600

[quality.power_output]
min = 0.0
max = 12.5

[quality.wind_speed]
min = 0.0
max = 60.0

[quality.wind_direction]
min = 0.0
max = 360.0
max_exclusive = true

[anomaly]
sigma_multiplier = 3.0

[runner]
batch_size = 250
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());

    let config = PipelineConfig::from_toml_str(toml_str).unwrap();
    assert_eq!(config.window.length_secs, 3600);
    assert_eq!(config.quality.power_output.max, 12.5);
    assert!(config.quality.wind_direction.max_exclusive);
    assert_eq!(config.anomaly.sigma_multiplier, 3.0);
    assert_eq!(config.runner.batch_size, 250);
    assert!(validate_plausibility(&config).is_empty());
}

#[test]
fn far_off_key_has_no_suggestion() {
    let known = known_config_keys();
    assert!(suggest_correction("completely_unrelated_setting", &known).is_none());
}

#[test]
fn unknown_key_does_not_prevent_loading() {
    let config = PipelineConfig::from_toml_str("[runner]\nbatch_size = 10\nworkers = 4\n").unwrap();
    assert_eq!(config.runner.batch_size, 10);
}

// ============================================================================
// Defaults & Round Trip
// ============================================================================

#[test]
fn empty_document_yields_defaults() {
    let config = PipelineConfig::from_toml_str("").unwrap();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(config.window.length_secs, 86_400);
    assert_eq!(config.anomaly.sigma_multiplier, 2.0);
    assert_eq!(config.quality.power_output, ValueRange::inclusive(0.0, 10.0));
    assert_eq!(config.quality.wind_speed, ValueRange::inclusive(0.0, 100.0));
    assert_eq!(config.quality.wind_direction, ValueRange::half_open(0.0, 360.0));
}

#[test]
fn partial_section_keeps_other_defaults() {
    let config = PipelineConfig::from_toml_str("[quality.wind_speed]\nmin = 3.0\nmax = 40.0\n").unwrap();
    assert_eq!(config.quality.wind_speed, ValueRange::inclusive(3.0, 40.0));
    assert_eq!(config.quality.power_output, PipelineConfig::default().quality.power_output);
}

#[test]
fn serialized_defaults_parse_back() {
    let text = PipelineConfig::default().to_toml().unwrap();
    assert!(validate_unknown_keys(&text).is_empty());
    assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), PipelineConfig::default());
}

// ============================================================================
// Range Validation Tests
// ============================================================================

#[test]
fn invalid_parameters_are_all_reported() {
    let toml_str = r#"
[window]
length_secs = 0

[quality.power_output]
min = 10.0
max = 0.0

[anomaly]
sigma_multiplier = -1.0

[runner]
batch_size = 0
"#;
    match PipelineConfig::from_toml_str(toml_str) {
        Err(ConfigError::Validation(errors)) => {
            assert_eq!(errors.len(), 4, "{errors:?}");
            assert!(errors.iter().any(|e| e.contains("window.length_secs")));
            assert!(errors.iter().any(|e| e.contains("quality.power_output")));
            assert!(errors.iter().any(|e| e.contains("sigma_multiplier")));
            assert!(errors.iter().any(|e| e.contains("batch_size")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn non_finite_bounds_are_rejected() {
    let toml_str = "[quality.wind_speed]\nmin = 0.0\nmax = nan\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));

    let toml_str = "[anomaly]\nsigma_multiplier = inf\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(toml_str),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn wrong_value_type_is_parse_error() {
    let result = PipelineConfig::from_toml_str("[window]\nlength_secs = \"one day\"\n");
    assert!(matches!(result, Err(ConfigError::Parse(_, _))));
}

// ============================================================================
// Plausibility Tests
// ============================================================================

#[test]
fn odd_window_length_is_flagged_but_allowed() {
    let config = PipelineConfig::from_toml_str("[window]\nlength_secs = 5000\n").unwrap();
    let warnings = validate_plausibility(&config);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "window.length_secs");
}

#[test]
fn multi_day_window_is_plausible() {
    let config = PipelineConfig::from_toml_str("[window]\nlength_secs = 604800\n").unwrap();
    assert!(validate_plausibility(&config).is_empty());
}

#[test]
fn extreme_sigma_is_flagged() {
    let config = PipelineConfig::from_toml_str("[anomaly]\nsigma_multiplier = 10.0\n").unwrap();
    let warnings = validate_plausibility(&config);
    assert!(warnings.iter().any(|w| w.field == "anomaly.sigma_multiplier"));
}

// ============================================================================
// File Loading Tests
// ============================================================================

#[test]
fn explicit_file_is_loaded() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[anomaly]\nsigma_multiplier = 2.5").unwrap();

    let config = PipelineConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.anomaly.sigma_multiplier, 2.5);
}

#[test]
fn explicit_missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(
        PipelineConfig::load(Some(&missing)),
        Err(ConfigError::Io(path, _)) if path == missing
    ));
}

#[test]
fn parse_error_reports_file_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[window\nlength_secs = 1").unwrap();

    let err = PipelineConfig::load_from_file(file.path()).unwrap_err();
    match &err {
        ConfigError::Parse(path, _) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {other:?}"),
    }
    assert!(err.to_string().contains(&file.path().display().to_string()));
}
