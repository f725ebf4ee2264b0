//! Stateful detectors turning market events into trading signals.
//!
//! A detector owns all of its per-symbol state, is shared by reference across
//! tasks, and applies each event atomically for its symbol: the window update,
//! the decision, and any suppression bookkeeping happen under one lock.

pub mod crossover;
pub mod volume;

pub use crossover::{CrossoverConfig, CrossoverDetector};
pub use volume::{VolumeSpikeConfig, VolumeSpikeDetector};

use corelib::{PriceEvent, TradingSignal};

pub trait Detector: Send + Sync + 'static {
    /// Identifies the emitting service in every signal.
    fn service_id(&self) -> &str;

    /// Folds one event into the symbol's state.
    /// Returns `Some(signal)` when the detector fires.
    fn on_event(&self, event: &PriceEvent) -> Option<TradingSignal>;
}

/// Mean of the last `period` values; `None` when there are fewer.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Mean of all values; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_uses_the_tail() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&v, 2), Some(3.5));
        assert_eq!(sma(&v, 4), Some(2.5));
        assert_eq!(sma(&v, 5), None);
        assert_eq!(sma(&v, 0), None);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
    }
}
