use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility.
///
/// Cloning shares the underlying atomics; build one at startup and hand clones
/// to every component that reports into it.
#[derive(Clone, Default, Debug)]
pub struct Counters {
    pub events_received: Arc<AtomicU64>,
    pub events_malformed: Arc<AtomicU64>,

    pub signals_emitted: Arc<AtomicU64>,
    pub signals_delivered: Arc<AtomicU64>,

    // dropped on purpose: repeated crossovers, cooldown rejections
    pub signals_suppressed: Arc<AtomicU64>,

    pub deliveries_failed: Arc<AtomicU64>,
}

/// Point-in-time copy of [`Counters`], served on `/metrics`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub events_received: u64,
    pub events_malformed: u64,
    pub signals_emitted: u64,
    pub signals_delivered: u64,
    pub signals_suppressed: u64,
    pub deliveries_failed: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            events_received: read(&self.events_received),
            events_malformed: read(&self.events_malformed),
            signals_emitted: read(&self.signals_emitted),
            signals_delivered: read(&self.signals_delivered),
            signals_suppressed: read(&self.signals_suppressed),
            deliveries_failed: read(&self.deliveries_failed),
        }
    }
}
