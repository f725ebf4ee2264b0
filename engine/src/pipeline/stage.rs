use std::sync::Arc;

use common::time::Clock;
use corelib::{PriceEvent, TradingSignal, WireEvent};
use tracing::info;

use crate::detector::Detector;
use crate::limiter::RateLimiter;
use crate::metrics::{Counters, bump};

/// The stateful step between decode and delivery.
///
/// `evaluate` runs under the symbol's pipeline lock, and so does `delivered`
/// when the sink accepted the signal, so a stage can treat
/// evaluate → deliver → delivered as one atomic step per symbol.
pub trait Stage: Send + Sync + 'static {
    type Input: WireEvent;

    fn name(&self) -> &'static str;

    fn evaluate(&self, input: &Self::Input) -> Option<TradingSignal>;

    fn delivered(&self, _signal: &TradingSignal) {}
}

/// Runs a [`Detector`] over price events.
pub struct DetectorStage<D> {
    detector: D,
}

impl<D: Detector> DetectorStage<D> {
    pub fn new(detector: D) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }
}

impl<D: Detector> Stage for DetectorStage<D> {
    type Input = PriceEvent;

    fn name(&self) -> &'static str {
        "detector"
    }

    fn evaluate(&self, input: &PriceEvent) -> Option<TradingSignal> {
        self.detector.on_event(input)
    }
}

/// Throttles signals into alerts, one per symbol per cooldown.
///
/// The cooldown only starts once the alert sink accepted the alert.
pub struct AlertGate {
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl AlertGate {
    pub fn new(limiter: RateLimiter, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl Stage for AlertGate {
    type Input = TradingSignal;

    fn name(&self) -> &'static str {
        "alert"
    }

    fn evaluate(&self, signal: &TradingSignal) -> Option<TradingSignal> {
        if self.limiter.permit(&signal.symbol, self.clock.now()) {
            return Some(signal.clone());
        }

        bump(&self.counters.signals_suppressed);
        info!(
            symbol = %signal.symbol,
            signal_type = %signal.signal_type,
            cooldown_secs = self.limiter.cooldown().num_seconds(),
            "alert rate limited"
        );
        None
    }

    fn delivered(&self, signal: &TradingSignal) {
        self.limiter.record(&signal.symbol, self.clock.now());
    }
}
