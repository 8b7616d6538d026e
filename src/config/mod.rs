//! Pipeline Configuration Module
//!
//! Provides pipeline configuration loaded from TOML files. Window length,
//! quality-gate ranges and the anomaly sigma multiplier are all named,
//! overridable parameters.
//!
//! ## Loading Order
//!
//! 1. Explicit path (`--config` on the command line)
//! 2. `TURBINE_WATCH_CONFIG` environment variable (path to TOML file)
//! 3. `turbine_watch.toml` in the current working directory
//! 4. Built-in defaults
//!
//! ## Usage
//!
//! The loaded config is handed to [`crate::context::PipelineContext`]; there
//! is no process-wide config singleton.
//!
//! ```ignore
//! let config = PipelineConfig::load(None)?;
//! let ctx = PipelineContext::new(config, BatchSnapshot::now(0));
//! ```

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;
