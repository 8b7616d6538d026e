//! Quality Gate (bronze → silver)
//!
//! Drops raw readings that are incomplete or out of range, normalizes the
//! timestamp to UTC and stamps the batch ingestion time.
//!
//! Policy is drop-on-violation:
//! - Missing timestamp, turbine id or power output → malformed, dropped
//! - Any named expectation failing → dropped
//!
//! Nothing is logged here; callers read [`GateMetrics`] for per-expectation
//! pass/fail counts.

mod timestamp;

pub use timestamp::normalize_timestamp;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::QualityConfig;
use crate::context::PipelineContext;
use crate::types::{CleanReading, Field, RawReading};

/// Columns that must be non-null for a reading to be usable at all.
pub const REQUIRED_FIELDS: [Field; 3] = [Field::Timestamp, Field::TurbineId, Field::PowerOutput];

// ============================================================================
// Expectations
// ============================================================================

/// A named validity predicate over raw readings.
#[derive(Clone, Copy)]
pub struct Expectation {
    pub name: &'static str,
    predicate: fn(&RawReading, &QualityConfig) -> bool,
}

impl Expectation {
    pub const fn new(name: &'static str, predicate: fn(&RawReading, &QualityConfig) -> bool) -> Self {
        Self { name, predicate }
    }

    pub fn holds(&self, raw: &RawReading, quality: &QualityConfig) -> bool {
        (self.predicate)(raw, quality)
    }
}

impl std::fmt::Debug for Expectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expectation").field("name", &self.name).finish()
    }
}

fn valid_power_output(raw: &RawReading, q: &QualityConfig) -> bool {
    raw.power_output.is_some_and(|v| q.power_output.contains(v))
}

fn valid_wind_speed(raw: &RawReading, q: &QualityConfig) -> bool {
    raw.wind_speed.is_some_and(|v| q.wind_speed.contains(v))
}

fn valid_wind_direction(raw: &RawReading, q: &QualityConfig) -> bool {
    raw.wind_direction.is_some_and(|v| q.wind_direction.contains(v))
}

/// Standard expectations, in evaluation order.
pub const STANDARD_EXPECTATIONS: [Expectation; 3] = [
    Expectation::new("valid_power_output", valid_power_output),
    Expectation::new("valid_wind_speed", valid_wind_speed),
    Expectation::new("valid_wind_direction", valid_wind_direction),
];

// ============================================================================
// Drop Reasons & Metrics
// ============================================================================

/// Why a raw reading did not reach the silver layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    /// Required column is null (or the timestamp is unparsable)
    Missing { field: Field },
    /// Named expectation evaluated false
    Violated { expectation: &'static str },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Missing { field } => write!(f, "missing {field}"),
            DropReason::Violated { expectation } => write!(f, "violated {expectation}"),
        }
    }
}

/// Pass/fail tally for one expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectationMetric {
    pub name: &'static str,
    pub passed: u64,
    pub failed: u64,
}

/// Counters for one gate pass.
///
/// Expectations are only evaluated on readings with every required column,
/// so `passed + failed == seen - malformed` for each expectation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateMetrics {
    pub seen: u64,
    pub accepted: u64,
    pub malformed: u64,
    /// Null count per required column
    pub missing: BTreeMap<Field, u64>,
    pub expectations: Vec<ExpectationMetric>,
}

impl GateMetrics {
    fn for_gate(gate: &QualityGate) -> Self {
        Self {
            expectations: gate
                .expectations
                .iter()
                .map(|e| ExpectationMetric {
                    name: e.name,
                    passed: 0,
                    failed: 0,
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn dropped(&self) -> u64 {
        self.seen - self.accepted
    }

    /// Tally for a named expectation
    pub fn expectation(&self, name: &str) -> Option<&ExpectationMetric> {
        self.expectations.iter().find(|m| m.name == name)
    }

    fn record(&mut self, outcome: &Result<CleanReading, Vec<DropReason>>) {
        self.seen += 1;
        let reasons: &[DropReason] = match outcome {
            Ok(_) => {
                self.accepted += 1;
                &[]
            }
            Err(reasons) => reasons,
        };

        let mut malformed = false;
        for reason in reasons {
            if let DropReason::Missing { field } = reason {
                malformed = true;
                *self.missing.entry(*field).or_insert(0) += 1;
            }
        }
        if malformed {
            self.malformed += 1;
            return;
        }

        for metric in &mut self.expectations {
            let failed = reasons
                .iter()
                .any(|r| matches!(r, DropReason::Violated { expectation } if *expectation == metric.name));
            if failed {
                metric.failed += 1;
            } else {
                metric.passed += 1;
            }
        }
    }

    /// Fold another pass into this one (expectation lists must match).
    pub fn merge(&mut self, other: &GateMetrics) {
        self.seen += other.seen;
        self.accepted += other.accepted;
        self.malformed += other.malformed;
        for (field, count) in &other.missing {
            *self.missing.entry(*field).or_insert(0) += count;
        }
        if self.expectations.is_empty() {
            self.expectations = other.expectations.clone();
            return;
        }
        for (mine, theirs) in self.expectations.iter_mut().zip(&other.expectations) {
            mine.passed += theirs.passed;
            mine.failed += theirs.failed;
        }
    }
}

// ============================================================================
// Quality Gate
// ============================================================================

/// Ordered set of expectations applied to every raw reading.
#[derive(Debug, Clone)]
pub struct QualityGate {
    expectations: Vec<Expectation>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            expectations: STANDARD_EXPECTATIONS.to_vec(),
        }
    }
}

impl QualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extra expectation after the standard ones
    pub fn with_expectation(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }

    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Classify a single reading.
    ///
    /// Returns the clean reading, or every reason it was dropped: all missing
    /// required columns, or (when complete) every failing expectation.
    pub fn check(&self, ctx: &PipelineContext, raw: &RawReading) -> Result<CleanReading, Vec<DropReason>> {
        let timestamp = raw.timestamp.as_deref().and_then(normalize_timestamp);

        let mut reasons: Vec<DropReason> = REQUIRED_FIELDS
            .iter()
            .filter(|&&field| match field {
                Field::Timestamp => timestamp.is_none(),
                other => raw.value(other).is_none(),
            })
            .map(|&field| DropReason::Missing { field })
            .collect();
        if !reasons.is_empty() {
            return Err(reasons);
        }

        let quality = &ctx.config.quality;
        reasons.extend(
            self.expectations
                .iter()
                .filter(|e| !e.holds(raw, quality))
                .map(|e| DropReason::Violated { expectation: e.name }),
        );

        match (timestamp, raw.turbine_id, raw.power_output, raw.wind_speed, raw.wind_direction) {
            (Some(timestamp), Some(turbine_id), Some(power_output), Some(wind_speed), Some(wind_direction))
                if reasons.is_empty() =>
            {
                Ok(CleanReading {
                    timestamp,
                    turbine_id,
                    wind_speed,
                    wind_direction,
                    power_output,
                    loaded_time: ctx.batch.processed_at,
                })
            }
            _ => {
                // Null wind columns always fail their expectation under the
                // standard set; guard anyway for custom expectation lists.
                if reasons.is_empty() {
                    if raw.wind_speed.is_none() {
                        reasons.push(DropReason::Missing { field: Field::WindSpeed });
                    }
                    if raw.wind_direction.is_none() {
                        reasons.push(DropReason::Missing { field: Field::WindDirection });
                    }
                }
                Err(reasons)
            }
        }
    }

    /// Lazily gate a sequence of raw readings.
    ///
    /// Arrival order is preserved. Read the counters through
    /// [`Gated::metrics`] once the iterator is drained.
    pub fn gate<'a, I>(&'a self, ctx: &'a PipelineContext, readings: I) -> Gated<'a, I::IntoIter>
    where
        I: IntoIterator<Item = RawReading>,
    {
        Gated {
            gate: self,
            ctx,
            inner: readings.into_iter(),
            metrics: GateMetrics::for_gate(self),
        }
    }

    /// Eager form of [`QualityGate::gate`].
    pub fn apply<I>(&self, ctx: &PipelineContext, readings: I) -> (Vec<CleanReading>, GateMetrics)
    where
        I: IntoIterator<Item = RawReading>,
    {
        let mut gated = self.gate(ctx, readings);
        let clean: Vec<CleanReading> = gated.by_ref().collect();
        (clean, gated.into_metrics())
    }
}

/// Iterator adapter produced by [`QualityGate::gate`].
pub struct Gated<'a, I> {
    gate: &'a QualityGate,
    ctx: &'a PipelineContext,
    inner: I,
    metrics: GateMetrics,
}

impl<I> Gated<'_, I> {
    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    pub fn into_metrics(self) -> GateMetrics {
        self.metrics
    }
}

impl<I: Iterator<Item = RawReading>> Iterator for Gated<'_, I> {
    type Item = CleanReading;

    fn next(&mut self) -> Option<CleanReading> {
        loop {
            let raw = self.inner.next()?;
            let outcome = self.gate.check(self.ctx, &raw);
            self.metrics.record(&outcome);
            if let Ok(clean) = outcome {
                return Some(clean);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::context::BatchSnapshot;
    use chrono::{TimeZone, Utc};

    fn ctx() -> PipelineContext {
        let processed_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        PipelineContext::new(PipelineConfig::default(), BatchSnapshot::new(1, processed_at))
    }

    fn make_valid_reading() -> RawReading {
        RawReading {
            timestamp: Some("2024-01-01T00:00:00".to_string()),
            turbine_id: Some(1),
            wind_speed: Some(10.0),
            wind_direction: Some(90.0),
            power_output: Some(5.0),
        }
    }

    #[test]
    fn test_valid_reading_passes_and_is_stamped() {
        let ctx = ctx();
        let clean = QualityGate::new().check(&ctx, &make_valid_reading()).unwrap();
        assert_eq!(clean.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(clean.loaded_time, ctx.batch.processed_at);
        assert_eq!(clean.power_output, 5.0);
    }

    #[test]
    fn test_power_out_of_range_rejected() {
        let mut raw = make_valid_reading();
        raw.power_output = Some(15.0);
        let reasons = QualityGate::new().check(&ctx(), &raw).unwrap_err();
        assert_eq!(reasons, vec![DropReason::Violated { expectation: "valid_power_output" }]);
    }

    #[test]
    fn test_boundaries_follow_configured_inclusivity() {
        let gate = QualityGate::new();
        let ctx = ctx();

        let mut raw = make_valid_reading();
        raw.power_output = Some(10.0);
        raw.wind_speed = Some(100.0);
        raw.wind_direction = Some(0.0);
        assert!(gate.check(&ctx, &raw).is_ok());

        raw.wind_direction = Some(360.0);
        assert!(gate.check(&ctx, &raw).is_err());
    }

    #[test]
    fn test_every_failing_expectation_is_reported() {
        let mut raw = make_valid_reading();
        raw.wind_speed = Some(-1.0);
        raw.wind_direction = Some(400.0);
        let reasons = QualityGate::new().check(&ctx(), &raw).unwrap_err();
        assert_eq!(reasons.len(), 2);
        assert!(reasons.contains(&DropReason::Violated { expectation: "valid_wind_speed" }));
        assert!(reasons.contains(&DropReason::Violated { expectation: "valid_wind_direction" }));
    }

    #[test]
    fn test_missing_required_fields_are_malformed() {
        let raw = RawReading {
            wind_speed: Some(10.0),
            wind_direction: Some(90.0),
            ..Default::default()
        };
        let reasons = QualityGate::new().check(&ctx(), &raw).unwrap_err();
        assert_eq!(
            reasons,
            vec![
                DropReason::Missing { field: Field::Timestamp },
                DropReason::Missing { field: Field::TurbineId },
                DropReason::Missing { field: Field::PowerOutput },
            ]
        );
    }

    #[test]
    fn test_unparsable_timestamp_is_malformed() {
        let mut raw = make_valid_reading();
        raw.timestamp = Some("not a time".to_string());
        let reasons = QualityGate::new().check(&ctx(), &raw).unwrap_err();
        assert_eq!(reasons, vec![DropReason::Missing { field: Field::Timestamp }]);
    }

    #[test]
    fn test_null_wind_columns_fail_their_expectations() {
        let mut raw = make_valid_reading();
        raw.wind_speed = None;
        let reasons = QualityGate::new().check(&ctx(), &raw).unwrap_err();
        assert_eq!(reasons, vec![DropReason::Violated { expectation: "valid_wind_speed" }]);
    }

    #[test]
    fn test_nan_power_rejected() {
        let mut raw = make_valid_reading();
        raw.power_output = Some(f64::NAN);
        assert!(QualityGate::new().check(&ctx(), &raw).is_err());
    }

    #[test]
    fn test_custom_range_from_config() {
        let mut config = PipelineConfig::default();
        config.quality.power_output.max = 3.0;
        let ctx = PipelineContext::new(config, ctx().batch);
        assert!(QualityGate::new().check(&ctx, &make_valid_reading()).is_err());
    }

    #[test]
    fn test_extra_expectation_is_applied() {
        fn not_turbine_13(raw: &RawReading, _: &QualityConfig) -> bool {
            raw.turbine_id != Some(13)
        }
        let gate = QualityGate::new().with_expectation(Expectation::new("not_decommissioned", not_turbine_13));
        let mut raw = make_valid_reading();
        raw.turbine_id = Some(13);
        let reasons = gate.check(&ctx(), &raw).unwrap_err();
        assert_eq!(reasons, vec![DropReason::Violated { expectation: "not_decommissioned" }]);
    }

    #[test]
    fn test_gate_is_lazy_and_preserves_order() {
        let ctx = ctx();
        let gate = QualityGate::new();
        let mut bad = make_valid_reading();
        bad.power_output = Some(-0.5);
        let mut second = make_valid_reading();
        second.turbine_id = Some(2);

        let mut gated = gate.gate(&ctx, vec![make_valid_reading(), bad, second]);
        assert_eq!(gated.next().map(|c| c.turbine_id), Some(1));
        assert_eq!(gated.metrics().seen, 1);
        assert_eq!(gated.next().map(|c| c.turbine_id), Some(2));
        assert_eq!(gated.metrics().seen, 3);
        assert!(gated.next().is_none());
    }

    #[test]
    fn test_metrics_count_each_expectation_independently() {
        let ctx = ctx();
        let mut both_bad = make_valid_reading();
        both_bad.power_output = Some(11.0);
        both_bad.wind_speed = Some(101.0);
        let mut no_id = make_valid_reading();
        no_id.turbine_id = None;

        let (clean, metrics) = QualityGate::new().apply(&ctx, vec![make_valid_reading(), both_bad, no_id]);
        assert_eq!(clean.len(), 1);
        assert_eq!(metrics.seen, 3);
        assert_eq!(metrics.accepted, 1);
        assert_eq!(metrics.dropped(), 2);
        assert_eq!(metrics.malformed, 1);
        assert_eq!(metrics.missing.get(&Field::TurbineId), Some(&1));

        let power = metrics.expectation("valid_power_output").unwrap();
        assert_eq!((power.passed, power.failed), (1, 1));
        let speed = metrics.expectation("valid_wind_speed").unwrap();
        assert_eq!((speed.passed, speed.failed), (1, 1));
        let dir = metrics.expectation("valid_wind_direction").unwrap();
        assert_eq!((dir.passed, dir.failed), (2, 0));
    }

    #[test]
    fn test_metrics_merge() {
        let ctx = ctx();
        let gate = QualityGate::new();
        let (_, mut first) = gate.apply(&ctx, vec![make_valid_reading()]);
        let mut bad = make_valid_reading();
        bad.wind_direction = Some(-3.0);
        let (_, second) = gate.apply(&ctx, vec![bad]);
        first.merge(&second);
        assert_eq!(first.seen, 2);
        assert_eq!(first.expectation("valid_wind_direction").unwrap().failed, 1);
    }
}
