//! Volume spike detector.
//!
//! Compares each new 24h-volume observation against the trailing average of
//! the symbol's window (7 days / 168 samples by default, excluding the new
//! sample). The 7 days are counted back from the detector's clock, not from
//! the sample timestamps. Every observation above the threshold fires; unlike the crossover
//! detector there is no repeat suppression here, throttling is left to the
//! alert stage.

use std::sync::Arc;

use chrono::Duration;
use common::time::Clock;
use corelib::{
    Details, Direction, PriceEvent, SignalStrength, SignalType, TradingSignal, VolumeSample,
};
use serde_json::json;
use tracing::{debug, info};

use super::{Detector, mean};
use crate::error::ConfigError;
use crate::keyed::WindowStore;
use crate::rolling_window::WindowPolicy;

pub const SERVICE_ID: &str = "volume-detector-v1";

pub const DEFAULT_THRESHOLD: f64 = 1.3;
pub const STRONG_ABOVE: f64 = 2.0;
pub const WEAK_BELOW: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeSpikeConfig {
    /// Fires when `current / trailing_avg` is strictly above this.
    pub threshold: f64,
    pub max_samples: usize,
    pub retention: Duration,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_samples: 7 * 24,
            retention: Duration::days(7),
        }
    }
}

impl VolumeSpikeConfig {
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::SpikeThreshold(self.threshold));
        }
        if self.max_samples < 2 {
            return Err(ConfigError::Window(format!(
                "max_samples must be at least 2, got {}",
                self.max_samples
            )));
        }
        if self.retention <= Duration::zero() {
            return Err(ConfigError::Window("retention must be positive".into()));
        }
        Ok(())
    }
}

/// Severity grading of a spike multiplier.
pub fn spike_strength(multiplier: f64) -> SignalStrength {
    if multiplier > STRONG_ABOVE {
        SignalStrength::Strong
    } else if multiplier < WEAK_BELOW {
        SignalStrength::Weak
    } else {
        SignalStrength::Medium
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spike {
    pub current: f64,
    pub trailing_avg: f64,
    pub multiplier: f64,
}

/// Evaluates the newest value of `volumes` (oldest first) against the rest.
///
/// `None` with fewer than two values, a zero baseline, or a ratio at or below
/// `threshold`.
pub fn evaluate(volumes: &[f64], threshold: f64) -> Option<Spike> {
    let (&current, history) = volumes.split_last()?;
    let trailing_avg = mean(history)?;

    if trailing_avg == 0.0 {
        return None;
    }

    let multiplier = current / trailing_avg;
    (multiplier > threshold).then_some(Spike {
        current,
        trailing_avg,
        multiplier,
    })
}

pub struct VolumeSpikeDetector {
    config: VolumeSpikeConfig,
    windows: WindowStore<f64>,
    clock: Arc<dyn Clock>,
}

impl VolumeSpikeDetector {
    pub fn new(config: VolumeSpikeConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            windows: WindowStore::new(WindowPolicy::bounded(config.max_samples, config.retention)),
            config,
            clock,
        })
    }

    pub fn config(&self) -> &VolumeSpikeConfig {
        &self.config
    }

    pub fn observe(&self, sample: &VolumeSample) -> Option<TradingSignal> {
        let symbol = sample.symbol.as_str();

        let now = self.clock.now();

        let volumes = self.windows.update(symbol, |w| {
            w.push_at(now, sample.timestamp, sample.volume_24h);
            w.snapshot()
        });

        debug!(%symbol, volume = sample.volume_24h, history = volumes.len(), "volume sample applied");

        let spike = evaluate(&volumes, self.config.threshold)?;

        info!(
            %symbol,
            multiplier = spike.multiplier,
            current = spike.current,
            trailing_avg = spike.trailing_avg,
            "volume spike detected"
        );

        let mut details = Details::new();
        details.insert("current_volume".into(), json!(spike.current));
        details.insert("avg_volume_7d".into(), json!(spike.trailing_avg));
        details.insert("spike_multiplier".into(), json!(spike.multiplier));
        details.insert("threshold_exceeded".into(), json!(self.config.threshold));

        Some(TradingSignal {
            timestamp: sample.timestamp,
            symbol: symbol.to_string(),
            signal_type: SignalType::VolumeSpike,
            signal_strength: spike_strength(spike.multiplier),
            direction: Direction::Bullish,
            details,
            service_id: SERVICE_ID.to_string(),
        })
    }

    pub fn history(&self, symbol: &str) -> Vec<f64> {
        self.windows.snapshot(symbol)
    }
}

impl Detector for VolumeSpikeDetector {
    fn service_id(&self) -> &str {
        SERVICE_ID
    }

    fn on_event(&self, event: &PriceEvent) -> Option<TradingSignal> {
        self.observe(&event.volume_sample())
    }
}
