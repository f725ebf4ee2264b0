use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::EventError;

/// A message type that can arrive on an inbound topic.
pub trait WireEvent: DeserializeOwned + Send + Sync + 'static {
    /// Partitioning key; all per-key state hangs off this.
    fn symbol(&self) -> &str;

    /// Semantic checks that serde cannot express.
    fn validate(&self) -> Result<(), EventError>;

    /// Parses and validates one payload.
    fn decode(payload: &[u8]) -> Result<Self, EventError> {
        let event: Self = serde_json::from_slice(payload)?;
        event.validate()?;
        Ok(event)
    }
}

/// Raw market data point published by the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price_usd: f64,
    pub volume_24h: f64,
    #[serde(default)]
    pub market_cap: f64,
    #[serde(default)]
    pub price_change_24h: f64,
    #[serde(default)]
    pub source: String,
}

impl PriceEvent {
    pub fn price_sample(&self) -> PriceSample {
        PriceSample {
            timestamp: self.timestamp,
            symbol: self.symbol.clone(),
            price_usd: self.price_usd,
        }
    }

    pub fn volume_sample(&self) -> VolumeSample {
        VolumeSample {
            timestamp: self.timestamp,
            symbol: self.symbol.clone(),
            volume_24h: self.volume_24h,
        }
    }
}

impl WireEvent for PriceEvent {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.symbol.trim().is_empty() {
            return Err(EventError::Invalid("empty symbol".into()));
        }
        if !self.price_usd.is_finite() || self.price_usd < 0.0 {
            return Err(EventError::Invalid(format!(
                "price_usd must be finite and non-negative, got {}",
                self.price_usd
            )));
        }
        if !self.volume_24h.is_finite() || self.volume_24h < 0.0 {
            return Err(EventError::Invalid(format!(
                "volume_24h must be finite and non-negative, got {}",
                self.volume_24h
            )));
        }
        Ok(())
    }
}

/// Price observation fed to the crossover detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price_usd: f64,
}

/// Volume observation fed to the spike detector.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSample {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub volume_24h: f64,
}
