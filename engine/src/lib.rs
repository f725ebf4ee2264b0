//! Stateful signal analytics.
//!
//! Per-symbol rolling windows feed two detectors (SMA crossover and volume
//! spike); a cooldown gate throttles alerts; [`pipeline`] wires any of them
//! between an event source and a sink.

pub mod detector;
pub mod error;
pub mod keyed;
pub mod limiter;
pub mod metrics;
pub mod pipeline;
pub mod rolling_window;

pub use error::{ConfigError, PipelineError, SinkError};
