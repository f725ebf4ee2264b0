use std::sync::Arc;

use adapters::{ConsoleAlertSink, JsonLinesSink, JsonLinesSource};
use common::time::SystemClock;
use engine::detector::{CrossoverConfig, CrossoverDetector, VolumeSpikeConfig, VolumeSpikeDetector};
use engine::limiter::RateLimiter;
use engine::metrics::Counters;
use engine::pipeline::{AlertGate, DetectorStage, EventHandler, EventSink, EventSource, Pipeline};
use tracing::info;

use crate::cli::ServiceCmd;
use crate::config::{AppConfig, Transport};

/// A fully wired service, ready to be driven.
pub struct Service {
    pub source: Arc<dyn EventSource>,
    pub handler: Arc<dyn EventHandler>,
    pub sink: Arc<dyn EventSink>,
    pub counters: Counters,
}

/// Connects transports and builds the pipeline for `cmd`.
///
/// With the Kafka transport this blocks while broker metadata is fetched.
pub fn build(cmd: &ServiceCmd, cfg: &AppConfig) -> anyhow::Result<Service> {
    let counters = Counters::default();

    let (input_topic, handler, sink): (&str, Arc<dyn EventHandler>, Arc<dyn EventSink>) =
        match cmd {
            ServiceCmd::MaDetector => {
                let detector = CrossoverDetector::new(CrossoverConfig::default())?
                    .with_counters(counters.clone());
                let sink = transport_sink(cfg)?;
                let pipeline = Pipeline::new(
                    DetectorStage::new(detector),
                    Arc::clone(&sink),
                    &cfg.signal_topic,
                );
                (cfg.price_topic.as_str(), finish(pipeline, cfg, &counters), sink)
            }

            ServiceCmd::VolumeDetector { .. } => {
                let detector = VolumeSpikeDetector::new(
                    VolumeSpikeConfig::with_threshold(cfg.spike_threshold),
                    Arc::new(SystemClock),
                )?;
                let sink = transport_sink(cfg)?;
                let pipeline = Pipeline::new(
                    DetectorStage::new(detector),
                    Arc::clone(&sink),
                    &cfg.signal_topic,
                );
                (cfg.price_topic.as_str(), finish(pipeline, cfg, &counters), sink)
            }

            ServiceCmd::AlertService { publish, .. } => {
                let limiter = RateLimiter::from_minutes(cfg.cooldown_minutes)?;
                let gate = AlertGate::new(limiter, Arc::new(SystemClock))
                    .with_counters(counters.clone());
                let sink: Arc<dyn EventSink> = if *publish {
                    transport_sink(cfg)?
                } else {
                    Arc::new(ConsoleAlertSink::stdout())
                };
                let pipeline = Pipeline::new(gate, Arc::clone(&sink), &cfg.alert_topic);
                (cfg.signal_topic.as_str(), finish(pipeline, cfg, &counters), sink)
            }
        };

    let source = transport_source(cfg, input_topic)?;

    info!(
        service = cmd.name(),
        transport = ?cfg.transport,
        input = input_topic,
        "service wired"
    );

    Ok(Service {
        source,
        handler,
        sink,
        counters,
    })
}

fn finish<S: engine::pipeline::Stage>(
    pipeline: Pipeline<S>,
    cfg: &AppConfig,
    counters: &Counters,
) -> Arc<dyn EventHandler> {
    Arc::new(
        pipeline
            .with_publish_timeout(cfg.publish_timeout)
            .with_counters(counters.clone()),
    )
}

fn transport_source(cfg: &AppConfig, topic: &str) -> anyhow::Result<Arc<dyn EventSource>> {
    match cfg.transport {
        Transport::Stdio => Ok(Arc::new(JsonLinesSource::stdin())),
        Transport::Kafka => kafka::source(cfg, topic),
    }
}

fn transport_sink(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EventSink>> {
    match cfg.transport {
        Transport::Stdio => Ok(Arc::new(JsonLinesSink::stdout())),
        Transport::Kafka => kafka::sink(cfg),
    }
}

#[cfg(feature = "kafka")]
mod kafka {
    use std::sync::Arc;

    use adapters::kafka::{KafkaSink, KafkaSource};
    use anyhow::Context;
    use engine::pipeline::{EventSink, EventSource};

    use crate::config::AppConfig;

    pub fn source(cfg: &AppConfig, topic: &str) -> anyhow::Result<Arc<dyn EventSource>> {
        let group = cfg
            .kafka_group_id
            .as_deref()
            .context("kafka group id not set")?;
        Ok(Arc::new(KafkaSource::connect(
            &cfg.kafka_bootstrap,
            group,
            topic,
        )?))
    }

    pub fn sink(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EventSink>> {
        Ok(Arc::new(KafkaSink::connect(&cfg.kafka_bootstrap)?))
    }
}

#[cfg(not(feature = "kafka"))]
mod kafka {
    use std::sync::Arc;

    use engine::pipeline::{EventSink, EventSource};

    use crate::config::AppConfig;

    const MISSING: &str = "kafka transport not compiled in; rebuild with `--features kafka` or pass `--transport stdio`";

    pub fn source(_cfg: &AppConfig, _topic: &str) -> anyhow::Result<Arc<dyn EventSource>> {
        anyhow::bail!(MISSING)
    }

    pub fn sink(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn EventSink>> {
        anyhow::bail!(MISSING)
    }
}
