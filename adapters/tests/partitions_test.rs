use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adapters::PartitionWorkers;
use adapters::partitions::Ack;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::time::ManualClock;
use corelib::TradingSignal;
use engine::SinkError;
use engine::limiter::RateLimiter;
use engine::metrics::Counters;
use engine::pipeline::{AlertGate, EventSink, InboundMessage, Pipeline};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Sleeps before accepting; `slow` symbols take `slow_delay`, the rest `delay`.
struct SlowSink {
    delay: Duration,
    slow: Vec<&'static str>,
    slow_delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl SlowSink {
    fn uniform(delay: Duration) -> Self {
        Self {
            delay,
            slow: Vec::new(),
            slow_delay: delay,
            seen: Mutex::default(),
        }
    }

    fn symbols(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl EventSink for SlowSink {
    async fn publish(&self, _topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
        let delay = if self.slow.contains(&signal.symbol.as_str()) {
            self.slow_delay
        } else {
            self.delay
        };
        tokio::time::sleep(delay).await;
        self.seen.lock().push(signal.symbol.clone());
        Ok(())
    }
}

fn signal(symbol: &str, partition: i32, offset: i64) -> InboundMessage {
    let payload = serde_json::json!({
        "timestamp": "2024-03-01T12:00:00Z",
        "symbol": symbol,
        "signal_type": "volume_spike",
        "signal_strength": "medium",
        "direction": "bullish",
        "details": {"spike_multiplier": 1.8},
        "service_id": "volume-detector-v1",
    });
    InboundMessage::new(format!("trading-signals/{partition}@{offset}"), payload.to_string())
}

fn alert_pipeline(sink: Arc<SlowSink>) -> Arc<Pipeline<AlertGate>> {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    ));
    let counters = Counters::default();
    let gate = AlertGate::new(RateLimiter::from_minutes(5).unwrap(), clock)
        .with_counters(counters.clone());
    Arc::new(Pipeline::new(gate, sink, "trading-alerts").with_counters(counters))
}

type Acks = Arc<Mutex<HashMap<i32, Vec<i64>>>>;

fn recording_acks() -> (Acks, Ack) {
    let acks: Acks = Arc::default();
    let sink = Arc::clone(&acks);
    let ack: Ack = Arc::new(move |partition: i32, offset: i64| {
        sink.lock().entry(partition).or_default().push(offset);
    });
    (acks, ack)
}

#[tokio::test(start_paused = true)]
async fn partitions_share_one_pipeline_concurrently() {
    let sink = Arc::new(SlowSink::uniform(Duration::from_secs(1)));
    let pipeline = alert_pipeline(Arc::clone(&sink));
    let (acks, ack) = recording_acks();
    let mut workers = PartitionWorkers::new(pipeline.clone(), ack);

    let started = Instant::now();
    for partition in 0..8 {
        let symbol = format!("SYM{partition}");
        for offset in 0..3 {
            workers
                .dispatch(partition, offset, signal(&symbol, partition, offset))
                .await;
        }
    }
    assert_eq!(workers.partitions(), 8);
    workers.finish().await;

    // Eight one-second deliveries overlap instead of queueing behind each other.
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());

    let mut delivered = sink.symbols();
    delivered.sort();
    assert_eq!(delivered, (0..8).map(|p| format!("SYM{p}")).collect::<Vec<_>>());

    let snap = pipeline.counters().snapshot();
    assert_eq!(snap.signals_delivered, 8);
    assert_eq!(snap.signals_suppressed, 16);

    let acks = acks.lock();
    assert_eq!(acks.len(), 8);
    assert!(acks.values().all(|offsets| *offsets == vec![0, 1, 2]));
}

#[tokio::test(start_paused = true)]
async fn slow_partition_does_not_hold_up_the_others() {
    let sink = Arc::new(SlowSink {
        delay: Duration::from_millis(10),
        slow: vec!["BTC"],
        slow_delay: Duration::from_secs(4),
        seen: Mutex::default(),
    });
    let pipeline = alert_pipeline(Arc::clone(&sink));
    let (acks, ack) = recording_acks();
    let mut workers = PartitionWorkers::new(pipeline, ack);

    workers.dispatch(0, 0, signal("BTC", 0, 0)).await;
    workers.dispatch(1, 0, signal("ETH", 1, 0)).await;
    workers.dispatch(1, 1, signal("SOL", 1, 1)).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.symbols(), vec!["ETH", "SOL"]);
    assert_eq!(acks.lock().get(&1), Some(&vec![0, 1]));
    assert_eq!(acks.lock().get(&0), None);

    workers.finish().await;
    assert_eq!(sink.symbols(), vec!["ETH", "SOL", "BTC"]);
    assert_eq!(acks.lock().get(&0), Some(&vec![0]));
}
