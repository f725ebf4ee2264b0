//! In-process source and sink, for embedding the pipeline and for tests.

use std::sync::Arc;

use async_trait::async_trait;
use corelib::TradingSignal;
use engine::SinkError;
use engine::pipeline::{EventHandler, EventSink, EventSource, InboundMessage};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tracing::debug;

/// Feeds whatever is sent on the paired [`mpsc::Sender`]. Ends when every
/// sender is dropped.
pub struct ChannelSource {
    rx: AsyncMutex<mpsc::Receiver<InboundMessage>>,
}

impl ChannelSource {
    pub fn channel(capacity: usize) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: AsyncMutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut rx = self.rx.lock().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let msg = tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let origin = msg.origin.clone();
            if let Err(e) = handler.handle(msg).await {
                debug!(%origin, error = %e, "event not processed");
            }
        }

        Ok(())
    }
}

/// Keeps every published signal with the topic it was sent to.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, TradingSignal)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, TradingSignal)> {
        self.published.lock().clone()
    }

    pub fn signals(&self) -> Vec<TradingSignal> {
        self.published.lock().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
        self.published.lock().push((topic.to_string(), signal.clone()));
        Ok(())
    }
}
