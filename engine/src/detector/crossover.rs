//! Moving-average crossover detector.
//!
//! Tracks a short and a long simple moving average per symbol and fires when
//! the short one crosses the long one:
//! - golden cross (bullish): short moves from at-or-below to strictly above
//! - death cross (bearish): short moves from at-or-above to strictly below
//!
//! Firing is edge-triggered and additionally suppressed while the crossover
//! type equals the last one emitted for the symbol, so a persisting (or
//! re-touching) condition yields a single signal until the opposite cross.

use chrono::{DateTime, Utc};
use corelib::{
    CrossoverKind, Details, PriceEvent, PriceSample, SignalStrength, SignalType, TradingSignal,
};
use serde_json::json;
use tracing::{debug, info};

use super::{Detector, sma};
use crate::error::ConfigError;
use crate::keyed::KeyedState;
use crate::metrics::{Counters, bump};
use crate::rolling_window::{RollingWindow, WindowPolicy};

pub const SERVICE_ID: &str = "ma-detector-v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrossoverConfig {
    pub short_period: usize,
    pub long_period: usize,
    /// Count cap of the per-symbol price window.
    pub max_history: usize,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            short_period: 20,
            long_period: 50,
            max_history: 100,
        }
    }
}

impl CrossoverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.short_period == 0 || self.short_period >= self.long_period {
            return Err(ConfigError::SmaPeriods {
                short: self.short_period,
                long: self.long_period,
            });
        }
        // One extra sample is needed to evaluate the previous state.
        if self.max_history <= self.long_period {
            return Err(ConfigError::HistoryTooShort {
                history: self.max_history,
                long: self.long_period,
            });
        }
        Ok(())
    }
}

/// Both averages at the current and the previous sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmaPair {
    pub short: f64,
    pub long: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Crossover {
    pub kind: CrossoverKind,
    pub current: SmaPair,
    pub previous: SmaPair,
}

/// Evaluates the newest sample of `prices` (oldest first) for a crossover.
pub fn classify(prices: &[f64], cfg: &CrossoverConfig) -> Option<Crossover> {
    if prices.len() < cfg.long_period + 1 {
        return None;
    }

    let current = SmaPair {
        short: sma(prices, cfg.short_period)?,
        long: sma(prices, cfg.long_period)?,
    };

    let prev = &prices[..prices.len() - 1];
    let previous = SmaPair {
        short: sma(prev, cfg.short_period)?,
        long: sma(prev, cfg.long_period)?,
    };

    let kind = if previous.short <= previous.long && current.short > current.long {
        CrossoverKind::GoldenCross
    } else if previous.short >= previous.long && current.short < current.long {
        CrossoverKind::DeathCross
    } else {
        return None;
    };

    Some(Crossover {
        kind,
        current,
        previous,
    })
}

/// Per-symbol state: the price window and the last crossover type emitted.
struct SymbolState {
    prices: RollingWindow<f64>,
    last_emitted: Option<CrossoverKind>,
}

pub struct CrossoverDetector {
    config: CrossoverConfig,
    state: KeyedState<SymbolState>,
    counters: Counters,
}

impl CrossoverDetector {
    pub fn new(config: CrossoverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let policy = WindowPolicy::count(config.max_history);
        Ok(Self {
            config,
            state: KeyedState::new(move || SymbolState {
                prices: RollingWindow::new(policy),
                last_emitted: None,
            }),
            counters: Counters::default(),
        })
    }

    /// Reports suppressed repeats into shared counters.
    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn config(&self) -> &CrossoverConfig {
        &self.config
    }

    /// Applies one price sample; see the module docs for when this fires.
    pub fn observe(&self, sample: &PriceSample) -> Option<TradingSignal> {
        let symbol = sample.symbol.as_str();

        let crossover = self.state.with(symbol, |st| {
            st.prices.push(sample.timestamp, sample.price_usd);

            let history = st.prices.len();
            if history == 1 {
                debug!(%symbol, "started tracking price history");
            }
            debug!(%symbol, price = sample.price_usd, history, "price sample applied");

            if history < self.config.long_period + 1 {
                return None;
            }

            let prices = st.prices.snapshot();
            let crossover = classify(&prices, &self.config)?;

            if st.last_emitted == Some(crossover.kind) {
                bump(&self.counters.signals_suppressed);
                debug!(
                    %symbol,
                    kind = %crossover.kind,
                    "crossover repeats the last emitted type; suppressed"
                );
                return None;
            }

            st.last_emitted = Some(crossover.kind);
            Some(crossover)
        })?;

        info!(
            %symbol,
            kind = %crossover.kind,
            sma_short = crossover.current.short,
            sma_long = crossover.current.long,
            "crossover detected"
        );

        Some(self.build_signal(symbol, sample.timestamp, &crossover))
    }

    /// Last crossover type emitted for `symbol`, if any.
    pub fn last_emitted(&self, symbol: &str) -> Option<CrossoverKind> {
        self.state.peek(symbol, |st| st.last_emitted).flatten()
    }

    pub fn history_len(&self, symbol: &str) -> usize {
        self.state.peek(symbol, |st| st.prices.len()).unwrap_or(0)
    }

    fn build_signal(&self, symbol: &str, ts: DateTime<Utc>, c: &Crossover) -> TradingSignal {
        let mut details = Details::new();
        details.insert(format!("sma_{}", self.config.short_period), json!(c.current.short));
        details.insert(format!("sma_{}", self.config.long_period), json!(c.current.long));
        details.insert("crossover_type".into(), json!(c.kind.as_str()));

        TradingSignal {
            timestamp: ts,
            symbol: symbol.to_string(),
            signal_type: SignalType::MovingAverageCrossover,
            signal_strength: SignalStrength::Strong,
            direction: c.kind.direction(),
            details,
            service_id: SERVICE_ID.to_string(),
        }
    }
}

impl Detector for CrossoverDetector {
    fn service_id(&self) -> &str {
        SERVICE_ID
    }

    fn on_event(&self, event: &PriceEvent) -> Option<TradingSignal> {
        self.observe(&event.price_sample())
    }
}
