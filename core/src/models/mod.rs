//! Wire models shared by every service.
//!
//! Field names are the on-the-wire JSON names; timestamps are RFC3339.

mod error;
mod event;
mod signal;

pub use error::EventError;
pub use event::{PriceEvent, PriceSample, VolumeSample, WireEvent};
pub use signal::{CrossoverKind, Details, Direction, SignalStrength, SignalType, TradingSignal};
