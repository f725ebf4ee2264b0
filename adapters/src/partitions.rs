//! Per-partition fan-out for sources that read several ordered shards
//! through one receive loop.
//!
//! Each partition gets its own worker task and bounded queue. Messages of one
//! partition are handled strictly in order; different partitions run
//! concurrently against the same handler.

use std::collections::HashMap;
use std::sync::Arc;

use engine::pipeline::{EventHandler, InboundMessage};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Called with `(partition, offset)` once the handler has returned for that
/// message, whatever the outcome.
pub type Ack = Arc<dyn Fn(i32, i64) + Send + Sync>;

pub struct PartitionWorkers {
    handler: Arc<dyn EventHandler>,
    ack: Ack,
    depth: usize,
    queues: HashMap<i32, mpsc::Sender<(i64, InboundMessage)>>,
    tasks: JoinSet<()>,
}

impl PartitionWorkers {
    pub fn new(handler: Arc<dyn EventHandler>, ack: Ack) -> Self {
        Self {
            handler,
            ack,
            depth: DEFAULT_QUEUE_DEPTH,
            queues: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.depth = depth.max(1);
        self
    }

    /// Number of partitions that have a worker.
    pub fn partitions(&self) -> usize {
        self.queues.len()
    }

    /// Queues `msg` on its partition's worker, spawning the worker on first
    /// use. Waits when that partition's queue is full.
    pub async fn dispatch(&mut self, partition: i32, offset: i64, msg: InboundMessage) {
        let tx = match self.queues.get(&partition) {
            Some(tx) => tx.clone(),
            None => self.spawn(partition),
        };

        if let Err(mpsc::error::SendError((offset, msg))) = tx.send((offset, msg)).await {
            warn!(partition, offset, origin = %msg.origin, "partition worker gone; message dropped");
            self.queues.remove(&partition);
        }
    }

    fn spawn(&mut self, partition: i32) -> mpsc::Sender<(i64, InboundMessage)> {
        let (tx, rx) = mpsc::channel(self.depth);
        self.tasks.spawn(work(
            partition,
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.ack),
        ));
        self.queues.insert(partition, tx.clone());
        debug!(partition, "partition worker started");
        tx
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn finish(mut self) {
        self.queues.clear();
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "partition worker failed");
            }
        }
    }
}

async fn work(
    partition: i32,
    mut rx: mpsc::Receiver<(i64, InboundMessage)>,
    handler: Arc<dyn EventHandler>,
    ack: Ack,
) {
    while let Some((offset, msg)) = rx.recv().await {
        let origin = msg.origin.clone();
        if let Err(e) = handler.handle(msg).await {
            debug!(%origin, error = %e, "event not processed");
        }
        ack(partition, offset);
    }
    debug!(partition, "partition worker stopped");
}
