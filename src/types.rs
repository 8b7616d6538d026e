//! Shared data structures for the turbine telemetry pipeline
//!
//! This module defines the records that flow between the three stages:
//! - Bronze: RawReading (as delivered by the ingestion runtime, everything nullable)
//! - Silver: CleanReading (passed the quality gate, timestamp normalized to UTC)
//! - Gold: WindowStat (per-turbine tumbling-window baseline) and
//!   AnomalyRecord (reading enriched with its window, flagged as outlier)

mod anomaly;
mod reading;
mod window;

pub use anomaly::{AnomalyRecord, AnomalyRow};
pub use reading::{CleanReading, Field, RawReading};
pub use window::{AnomalyBounds, WindowBounds, WindowStat, WindowStatRow};

/// Identifier of a physical turbine (the entity readings are grouped by).
pub type TurbineId = i32;
