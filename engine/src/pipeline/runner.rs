use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::logger::{TraceId, event_span, warn_if_slow};
use corelib::{TradingSignal, WireEvent};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{Instrument, debug, error, info, warn};

use super::{EventHandler, EventSink, EventSource, InboundMessage, Outcome, Stage};
use crate::error::{PipelineError, SinkError};
use crate::keyed::KeyedState;
use crate::metrics::{Counters, bump};

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SLOW_PUBLISH: Duration = Duration::from_millis(500);

pub struct Pipeline<S> {
    stage: S,
    sink: Arc<dyn EventSink>,
    topic: String,
    publish_timeout: Duration,
    slow_publish: Duration,
    counters: Counters,
    // Held from evaluate through delivery so same-symbol events finish in
    // arrival order. tokio's mutex is FIFO.
    key_locks: KeyedState<Arc<AsyncMutex<()>>>,
}

impl<S: Stage> Pipeline<S> {
    pub fn new(stage: S, sink: Arc<dyn EventSink>, topic: impl Into<String>) -> Self {
        Self {
            stage,
            sink,
            topic: topic.into(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            slow_publish: DEFAULT_SLOW_PUBLISH,
            counters: Counters::default(),
            key_locks: KeyedState::new(|| Arc::new(AsyncMutex::new(()))),
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    async fn process(&self, input: S::Input) -> Result<Outcome, PipelineError> {
        let symbol = input.symbol();

        let lock = self.key_locks.with(symbol, |l| Arc::clone(l));
        let _guard = lock.lock().await;

        let Some(signal) = self.stage.evaluate(&input) else {
            return Ok(Outcome::NoSignal);
        };
        bump(&self.counters.signals_emitted);

        match self.deliver(&signal).await {
            Ok(()) => {
                bump(&self.counters.signals_delivered);
                self.stage.delivered(&signal);
                info!(
                    topic = %self.topic,
                    signal_type = %signal.signal_type,
                    strength = %signal.signal_strength,
                    direction = %signal.direction,
                    "signal delivered"
                );
                Ok(Outcome::Delivered)
            }
            Err(source) => {
                bump(&self.counters.deliveries_failed);
                error!(
                    topic = %self.topic,
                    signal_type = %signal.signal_type,
                    error = %source,
                    "signal delivery failed; dropping"
                );
                Err(PipelineError::Delivery {
                    symbol: signal.symbol.clone(),
                    signal_type: signal.signal_type,
                    source,
                })
            }
        }
    }

    async fn deliver(&self, signal: &TradingSignal) -> Result<(), SinkError> {
        let publish = warn_if_slow(
            "sink.publish",
            self.slow_publish,
            self.sink.publish(&self.topic, signal),
        );

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout(self.publish_timeout)),
        }
    }
}

#[async_trait]
impl<S: Stage> EventHandler for Pipeline<S> {
    async fn handle(&self, msg: InboundMessage) -> Result<Outcome, PipelineError> {
        bump(&self.counters.events_received);

        let input = match S::Input::decode(&msg.payload) {
            Ok(input) => input,
            Err(e) => {
                bump(&self.counters.events_malformed);
                warn!(origin = %msg.origin, error = %e, "skipping malformed event");
                return Err(e.into());
            }
        };

        let trace_id = TraceId::new();
        let span = event_span(self.stage.name(), &trace_id);
        span.record("symbol", input.symbol());

        self.process(input).instrument(span).await
    }
}

/// Runs `source` into `handler` until the input ends or `shutdown` fires.
///
/// After shutdown the source gets `grace` to finish in-flight work; whatever
/// is still running after that is abandoned.
pub async fn drive(
    source: Arc<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> anyhow::Result<()> {
    let run = source.run(handler, shutdown.clone());
    tokio::pin!(run);

    tokio::select! {
        res = &mut run => return res,
        _ = async {
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                // Sender gone without a stop request; let the source decide.
                pending::<()>().await;
            }
        } => {}
    }

    debug!(grace_secs = grace.as_secs(), "shutdown requested; draining source");
    match tokio::time::timeout(grace, run).await {
        Ok(res) => res,
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs(),
                "source did not drain within grace period; abandoning in-flight work"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{VolumeSpikeConfig, VolumeSpikeDetector};
    use crate::pipeline::DetectorStage;
    use chrono::{TimeZone, Utc};
    use common::time::ManualClock;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, TradingSignal)>>,
    }

    #[async_trait]
    impl EventSink for Recording {
        async fn publish(&self, topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
            self.seen.lock().push((topic.to_string(), signal.clone()));
            Ok(())
        }
    }

    fn pipeline(sink: Arc<Recording>) -> Pipeline<DetectorStage<VolumeSpikeDetector>> {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let detector =
            VolumeSpikeDetector::new(VolumeSpikeConfig::default(), Arc::new(ManualClock::new(now)))
                .unwrap();
        Pipeline::new(DetectorStage::new(detector), sink, "trading-signals")
    }

    fn price_event(ts: &str, volume: f64) -> InboundMessage {
        let payload = serde_json::json!({
            "timestamp": ts,
            "symbol": "BTC",
            "price_usd": 42_000.0,
            "volume_24h": volume,
            "source": "test"
        });
        InboundMessage::new("test", payload.to_string())
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_payload_is_logged_and_skipped() {
        let sink = Arc::new(Recording::default());
        let p = pipeline(Arc::clone(&sink));

        let res = p.handle(InboundMessage::new("test:1", "{not json")).await;

        assert!(matches!(res, Err(PipelineError::Malformed(_))));
        assert!(logs_contain("skipping malformed event"));
        let snap = p.counters().snapshot();
        assert_eq!(snap.events_received, 1);
        assert_eq!(snap.events_malformed, 1);
        assert!(sink.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn signals_go_to_the_configured_topic() {
        let sink = Arc::new(Recording::default());
        let p = pipeline(Arc::clone(&sink));

        let first = p.handle(price_event("2024-03-01T00:00:00Z", 100.0)).await;
        let second = p.handle(price_event("2024-03-01T01:00:00Z", 500.0)).await;

        assert_eq!(first.unwrap(), Outcome::NoSignal);
        assert_eq!(second.unwrap(), Outcome::Delivered);

        let seen = sink.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "trading-signals");
        assert_eq!(seen[0].1.symbol, "BTC");

        let snap = p.counters().snapshot();
        assert_eq!(snap.signals_emitted, 1);
        assert_eq!(snap.signals_delivered, 1);
    }

    #[tokio::test]
    async fn invalid_event_counts_as_malformed() {
        let sink = Arc::new(Recording::default());
        let p = pipeline(sink);

        let res = p.handle(price_event("2024-03-01T00:00:00Z", -1.0)).await;
        assert!(matches!(res, Err(PipelineError::Malformed(_))));
        assert_eq!(p.counters().snapshot().events_malformed, 1);
    }
}
