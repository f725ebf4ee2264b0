use std::fmt::Write as _;
use std::io::{Stdout, Write};

use async_trait::async_trait;
use chrono::SecondsFormat;
use corelib::TradingSignal;
use engine::SinkError;
use engine::pipeline::EventSink;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

const BANNER: &str = "🚨 TRADING SIGNAL ALERT 🚨";

/// Human-facing alert output.
pub struct ConsoleAlertSink<W> {
    out: Mutex<W>,
}

impl ConsoleAlertSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleAlertSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

/// Multi-line body of an alert; details are listed in key order.
pub fn format_alert(signal: &TradingSignal) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Symbol: {}", signal.symbol);
    let _ = writeln!(s, "Signal Type: {}", signal.signal_type);
    let _ = writeln!(s, "Direction: {}", signal.direction);
    let _ = writeln!(s, "Strength: {}", signal.signal_strength);
    let _ = writeln!(
        s,
        "Time: {}",
        signal.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(s, "Service: {}", signal.service_id);

    if !signal.details.is_empty() {
        s.push_str("Details:\n");
        for (key, value) in &signal.details {
            match value {
                Value::String(v) => {
                    let _ = writeln!(s, "  {key}: {v}");
                }
                other => {
                    let _ = writeln!(s, "  {key}: {other}");
                }
            }
        }
    }

    s
}

#[async_trait]
impl<W: Write + Send + 'static> EventSink for ConsoleAlertSink<W> {
    async fn publish(&self, _topic: &str, signal: &TradingSignal) -> Result<(), SinkError> {
        let body = format_alert(signal);
        {
            let mut out = self.out.lock();
            writeln!(out, "{BANNER}")?;
            writeln!(out, "{body}")?;
            writeln!(out, "{}", "=".repeat(51))?;
            out.flush()?;
        }

        info!(
            symbol = %signal.symbol,
            signal_type = %signal.signal_type,
            direction = %signal.direction,
            strength = %signal.signal_strength,
            "alert sent"
        );
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}
