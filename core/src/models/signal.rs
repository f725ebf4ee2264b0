use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventError, WireEvent};

/// Free-form, detector-specific numbers and labels attached to a signal.
pub type Details = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    MovingAverageCrossover,
    VolumeSpike,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::MovingAverageCrossover => "moving_average_crossover",
            SignalType::VolumeSpike => "volume_spike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Weak,
    Medium,
    Strong,
}

impl SignalStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStrength::Weak => "weak",
            SignalStrength::Medium => "medium",
            SignalStrength::Strong => "strong",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }
}

/// Which way the short SMA crossed the long SMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverKind {
    GoldenCross,
    DeathCross,
}

impl CrossoverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossoverKind::GoldenCross => "golden_cross",
            CrossoverKind::DeathCross => "death_cross",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            CrossoverKind::GoldenCross => Direction::Bullish,
            CrossoverKind::DeathCross => Direction::Bearish,
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(SignalType, SignalStrength, Direction, CrossoverKind);

/// A detected market condition. Also the payload of a dispatched alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub signal_type: SignalType,
    pub signal_strength: SignalStrength,
    pub direction: Direction,
    #[serde(default)]
    pub details: Details,
    pub service_id: String,
}

impl WireEvent for TradingSignal {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn validate(&self) -> Result<(), EventError> {
        if self.symbol.trim().is_empty() {
            return Err(EventError::Invalid("empty symbol".into()));
        }
        Ok(())
    }
}
