//! Kafka transport: a consumer-group source and a keyed producer sink.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use corelib::TradingSignal;
use engine::SinkError;
use engine::pipeline::{EventHandler, EventSink, EventSource, InboundMessage};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::partitions::{Ack, PartitionWorkers};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub fn client_config(bootstrap: &str) -> ClientConfig {
    let mut cfg = ClientConfig::new();
    cfg.set("bootstrap.servers", bootstrap);
    cfg
}

/// Consumes one topic as part of a consumer group.
///
/// Every assigned partition is handled by its own worker, so a slow delivery
/// only holds up the symbols on that partition. Offsets are committed per
/// partition after the handler returns, whatever the outcome, so a malformed
/// message or a failed delivery is never redelivered.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaSource {
    /// Subscribes and checks the broker is reachable. Blocks for up to ten
    /// seconds while fetching topic metadata.
    pub fn connect(bootstrap: &str, group_id: &str, topic: &str) -> anyhow::Result<Self> {
        let consumer: StreamConsumer = client_config(bootstrap)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .context("creating kafka consumer")?;

        consumer
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
            .with_context(|| format!("fetching metadata for {topic} from {bootstrap}"))?;

        consumer
            .subscribe(&[topic])
            .with_context(|| format!("subscribing to {topic}"))?;

        info!(%topic, %group_id, "kafka consumer subscribed");
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: topic.to_string(),
        })
    }

    fn committer(&self) -> Ack {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        Arc::new(move |partition: i32, offset: i64| {
            commit(&consumer, &topic, partition, offset)
        })
    }
}

fn commit(consumer: &StreamConsumer, topic: &str, partition: i32, offset: i64) {
    let mut tpl = TopicPartitionList::new();
    let res = tpl
        .add_partition_offset(topic, partition, Offset::Offset(offset + 1))
        .and_then(|_| consumer.commit(&tpl, CommitMode::Async));

    if let Err(e) = res {
        warn!(%topic, partition, offset, error = %e, "offset commit failed");
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    async fn run(
        &self,
        handler: Arc<dyn EventHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut workers = PartitionWorkers::new(handler, self.committer());

        loop {
            if *shutdown.borrow() {
                info!(topic = %self.topic, "shutdown requested; leaving consumer loop");
                break;
            }

            let msg = tokio::select! {
                res = self.consumer.recv() => match res {
                    Ok(m) => m.detach(),
                    Err(e) => {
                        warn!(topic = %self.topic, error = %e, "kafka receive error");
                        continue;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let (partition, offset) = (msg.partition(), msg.offset());
            let origin = format!("{}/{partition}@{offset}", msg.topic());
            let payload = msg.payload().unwrap_or_default().to_vec();

            workers
                .dispatch(partition, offset, InboundMessage::new(origin, payload))
                .await;
        }

        debug!(topic = %self.topic, partitions = workers.partitions(), "draining partition workers");
        workers.finish().await;
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Produces signals as JSON, keyed by symbol so each symbol stays on one
/// partition.
pub struct KafkaSink {
    producer: FutureProducer,
}

impl KafkaSink {
    pub fn connect(bootstrap: &str) -> anyhow::Result<Self> {
        let producer: FutureProducer = client_config(bootstrap)
            .set("message.timeout.ms", "5000")
            .create()
            .context("creating kafka producer")?;

        producer
            .client()
            .fetch_metadata(None, METADATA_TIMEOUT)
            .with_context(|| format!("fetching cluster metadata from {bootstrap}"))?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl EventSink for KafkaSink {
    async fn publish(&self, topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(signal)?;
        let record = FutureRecord::to(topic).key(&signal.symbol).payload(&payload);

        match self.producer.send(record, Timeout::Never).await {
            Ok(delivery) => {
                debug!(%topic, symbol = %signal.symbol, ?delivery, "signal produced");
                Ok(())
            }
            Err((e, _)) => Err(SinkError::Transport(e.to_string())),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.producer
            .flush(Timeout::After(FLUSH_TIMEOUT))
            .context("flushing kafka producer")
    }
}
