use std::time::Duration;

use corelib::{EventError, SignalType};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("short period ({short}) must be positive and below long period ({long})")]
    SmaPeriods { short: usize, long: usize },

    #[error("history ({history}) must exceed the long period ({long})")]
    HistoryTooShort { history: usize, long: usize },

    #[error("spike threshold must be finite and positive, got {0}")]
    SpikeThreshold(f64),

    #[error("window bounds must be positive: {0}")]
    Window(String),

    #[error("cooldown must not be negative")]
    NegativeCooldown,

    #[error("cooldown of {0} minutes is out of range")]
    CooldownOutOfRange(i64),
}

/// Failure handing a signal to a downstream sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode signal: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-event failure reported back to the source. Never fatal for the stream.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] EventError),

    #[error("failed to deliver {signal_type} for {symbol}: {source}")]
    Delivery {
        symbol: String,
        signal_type: SignalType,
        #[source]
        source: SinkError,
    },
}
