//! Source → stage → sink orchestration.
//!
//! A [`Pipeline`] is the [`EventHandler`] that sources call once per inbound
//! message. It decodes the payload, runs the stage under the symbol's lock,
//! and hands any resulting signal to the sink with a bounded deadline.

mod runner;
mod stage;

pub use runner::{DEFAULT_PUBLISH_TIMEOUT, Pipeline, drive};
pub use stage::{AlertGate, DetectorStage, Stage};

use std::sync::Arc;

use async_trait::async_trait;
use corelib::TradingSignal;
use tokio::sync::watch;

use crate::error::{PipelineError, SinkError};

/// Raw message as delivered by a transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Where the message came from (topic/partition/offset, `stdin:<line>`...).
    pub origin: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            origin: origin.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Event consumed; nothing to deliver (no crossover, below threshold,
    /// suppressed, or rate limited).
    NoSignal,
    Delivered,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one message. Errors are per-event: the caller logs them,
    /// treats the message as consumed, and moves on.
    async fn handle(&self, msg: InboundMessage) -> Result<Outcome, PipelineError>;
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Feeds messages to `handler` until the input ends or `shutdown` flips
    /// to `true`. A message already handed to the handler is finished before
    /// returning.
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, topic: &str, signal: &TradingSignal) -> Result<(), SinkError>;

    /// Flushes buffered output. Called once on shutdown.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
