use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use adapters::{JsonLinesSink, JsonLinesSource, RecordingSink};
use chrono::{TimeZone, Utc};
use common::time::ManualClock;
use corelib::{SignalStrength, SignalType, TradingSignal, WireEvent};
use engine::detector::{VolumeSpikeConfig, VolumeSpikeDetector};
use engine::pipeline::{DetectorStage, EventSink, EventSource, Pipeline};
use tokio::sync::watch;

fn price_line(hour: u32, volume: f64) -> String {
    serde_json::json!({
        "timestamp": format!("2024-03-01T{hour:02}:00:00Z"),
        "symbol": "BTC",
        "price_usd": 42_000.0,
        "volume_24h": volume,
        "market_cap": 800_000_000_000.0,
        "price_change_24h": 1.2,
        "source": "coingecko",
    })
    .to_string()
}

fn volume_pipeline(threshold: f64, sink: Arc<dyn EventSink>) -> Arc<Pipeline<DetectorStage<VolumeSpikeDetector>>> {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap()));
    let detector =
        VolumeSpikeDetector::new(VolumeSpikeConfig::with_threshold(threshold), clock).unwrap();
    Arc::new(Pipeline::new(DetectorStage::new(detector), sink, "trading-signals"))
}

#[tokio::test]
async fn json_lines_feed_the_pipeline_and_skip_garbage() {
    let mut input = String::new();
    for h in 0..5 {
        input.push_str(&price_line(h, 1_000_000_000.0));
        input.push('\n');
    }
    input.push_str("this is not json\n\n");
    input.push_str(&price_line(5, 1_800_000_000.0));
    input.push('\n');

    let sink = Arc::new(RecordingSink::new());
    let pipeline = volume_pipeline(1.5, sink.clone());
    let source = JsonLinesSource::new("test", Cursor::new(input.into_bytes()));
    let (_tx, rx) = watch::channel(false);

    source.run(pipeline.clone(), rx).await.unwrap();

    let signals = sink.signals();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].signal_type, SignalType::VolumeSpike);
    assert_eq!(signals[0].signal_strength, SignalStrength::Medium);

    let counters = pipeline.counters().snapshot();
    assert_eq!(counters.events_received, 7);
    assert_eq!(counters.events_malformed, 1);
}

#[tokio::test]
async fn sink_output_is_readable_by_the_next_stage() {
    let sink = JsonLinesSink::new(Vec::new());
    let signal = TradingSignal::decode(
        br#"{
            "timestamp": "2024-03-01T05:00:00Z",
            "symbol": "ETH",
            "signal_type": "volume_spike",
            "signal_strength": "strong",
            "direction": "bullish",
            "details": {"spike_multiplier": 2.4},
            "service_id": "volume-detector-v1"
        }"#,
    )
    .unwrap();

    sink.publish("trading-signals", &signal).await.unwrap();
    sink.publish("trading-signals", &signal).await.unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(TradingSignal::decode(lines[0].as_bytes()).unwrap(), signal);
}

#[tokio::test(start_paused = true)]
async fn source_stops_on_shutdown() {
    // Never yields a line, so only the shutdown flag can end the run.
    let (_writer, reader) = tokio::io::duplex(64);
    let source = JsonLinesSource::new("pipe", tokio::io::BufReader::new(reader));
    let pipeline = volume_pipeline(1.3, Arc::new(RecordingSink::new()));
    let (tx, rx) = watch::channel(false);

    let task = tokio::spawn(async move { source.run(pipeline, rx).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    tx.send(true).unwrap();

    task.await.unwrap().unwrap();
}
