use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use common::logger::LogFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Kafka,
    Stdio,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(Transport::Kafka),
            "stdio" => Ok(Transport::Stdio),
            other => Err(format!("unknown transport `{other}`")),
        }
    }
}

/// Process configuration, read from plain environment variables.
///
/// Empty or unparsable values fall back to the default; the offending keys
/// are kept in `rejected` so they can be logged once logging is up.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub kafka_bootstrap: String,
    /// Falls back to the per-service group when unset.
    pub kafka_group_id: Option<String>,
    pub port: u16,
    pub log_format: LogFormat,

    pub spike_threshold: f64,
    pub cooldown_minutes: i64,

    pub price_topic: String,
    pub signal_topic: String,
    pub alert_topic: String,

    pub transport: Transport,
    pub publish_timeout: Duration,
    pub shutdown_grace: Duration,

    pub rejected: Vec<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut env = Lookup {
            get: &lookup,
            rejected: Vec::new(),
        };

        let production = env
            .string("APP_ENV")
            .is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let log_format = match env.string("LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw),
            None if production => LogFormat::Json,
            None => LogFormat::Pretty,
        };

        Self {
            kafka_bootstrap: env
                .string("KAFKA_BOOTSTRAP_SERVERS")
                .unwrap_or_else(|| "localhost:9092".into()),
            kafka_group_id: env.string("KAFKA_GROUP_ID"),
            port: env.parse_or("PORT", 8080),
            log_format,
            spike_threshold: env.parse_or("SPIKE_THRESHOLD", 1.3),
            cooldown_minutes: env.parse_or("COOLDOWN_MINUTES", 5),
            price_topic: env
                .string("PRICE_TOPIC")
                .unwrap_or_else(|| "crypto-prices".into()),
            signal_topic: env
                .string("SIGNAL_TOPIC")
                .unwrap_or_else(|| "trading-signals".into()),
            alert_topic: env
                .string("ALERT_TOPIC")
                .unwrap_or_else(|| "trading-alerts".into()),
            transport: env.parse_or("TRANSPORT", Transport::Kafka),
            publish_timeout: Duration::from_millis(env.parse_or("PUBLISH_TIMEOUT_MS", 5_000)),
            shutdown_grace: Duration::from_secs(env.parse_or("SHUTDOWN_GRACE_SECS", 30)),
            rejected: env.rejected,
        }
    }
}

struct Lookup<'a> {
    get: &'a dyn Fn(&str) -> Option<String>,
    rejected: Vec<(String, String)>,
}

impl Lookup<'_> {
    fn string(&self, key: &str) -> Option<String> {
        (self.get)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.string(key) else {
            return default;
        };

        match raw.trim().parse() {
            Ok(v) => v,
            Err(e) => {
                self.rejected.push((key.to_string(), format!("{raw:?}: {e}")));
                default
            }
        }
    }
}
