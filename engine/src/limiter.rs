use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::error::ConfigError;

pub const DEFAULT_COOLDOWN_MINUTES: i64 = 5;

/// Per-symbol alert cooldown.
///
/// `permit` and `record` are separate so a caller can deliver in between and
/// only start the cooldown once the alert actually went out. Callers that
/// need the check-deliver-record sequence to be atomic per symbol must
/// serialize it themselves.
#[derive(Debug)]
pub struct RateLimiter {
    cooldown: Duration,
    last_alert: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Result<Self, ConfigError> {
        if cooldown < Duration::zero() {
            return Err(ConfigError::NegativeCooldown);
        }

        Ok(Self {
            cooldown,
            last_alert: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_minutes(minutes: i64) -> Result<Self, ConfigError> {
        let cooldown =
            Duration::try_minutes(minutes).ok_or(ConfigError::CooldownOutOfRange(minutes))?;
        Self::new(cooldown)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// True when no alert was recorded for `symbol`, or the last one is at
    /// least `cooldown` old at `now`. A zero cooldown always permits.
    pub fn permit(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        if self.cooldown.is_zero() {
            return true;
        }

        match self.last_alert.read().get(symbol) {
            Some(&last) => now - last >= self.cooldown,
            None => true,
        }
    }

    pub fn record(&self, symbol: &str, now: DateTime<Utc>) {
        self.last_alert.write().insert(symbol.to_string(), now);
    }

    pub fn last_alert(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_alert.read().get(symbol).copied()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(DEFAULT_COOLDOWN_MINUTES),
            last_alert: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(mins: i64, secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
            + Duration::minutes(mins)
            + Duration::seconds(secs)
    }

    #[test]
    fn second_alert_inside_cooldown_is_blocked() {
        let limiter = RateLimiter::from_minutes(5).unwrap();

        assert!(limiter.permit("BTC", at(0, 0)));
        limiter.record("BTC", at(0, 0));

        assert!(!limiter.permit("BTC", at(2, 0)));
        assert!(!limiter.permit("BTC", at(4, 59)));
        assert!(limiter.permit("BTC", at(5, 0)));
        assert!(limiter.permit("BTC", at(6, 0)));
    }

    #[test]
    fn permit_alone_does_not_start_cooldown() {
        let limiter = RateLimiter::default();
        assert!(limiter.permit("ETH", at(0, 0)));
        assert!(limiter.permit("ETH", at(0, 1)));
        assert_eq!(limiter.last_alert("ETH"), None);
    }

    #[test]
    fn symbols_have_independent_cooldowns() {
        let limiter = RateLimiter::from_minutes(5).unwrap();
        limiter.record("BTC", at(0, 0));

        assert!(!limiter.permit("BTC", at(1, 0)));
        assert!(limiter.permit("ETH", at(1, 0)));
    }

    #[test]
    fn zero_cooldown_always_permits() {
        let limiter = RateLimiter::from_minutes(0).unwrap();
        limiter.record("BTC", at(1, 0));

        assert!(limiter.permit("BTC", at(1, 0)));
        // Even with a clock that moved backwards.
        assert!(limiter.permit("BTC", at(0, 0)));
    }

    #[test]
    fn negative_cooldown_is_rejected() {
        assert_eq!(
            RateLimiter::from_minutes(-1).unwrap_err(),
            ConfigError::NegativeCooldown
        );
    }

    #[test]
    fn out_of_range_cooldown_is_a_config_error() {
        assert_eq!(
            RateLimiter::from_minutes(i64::MAX / 2).unwrap_err(),
            ConfigError::CooldownOutOfRange(i64::MAX / 2)
        );
        assert!(RateLimiter::from_minutes(i64::MIN).is_err());
    }

    #[test]
    fn record_overwrites_previous_alert() {
        let limiter = RateLimiter::from_minutes(5).unwrap();
        limiter.record("SOL", at(0, 0));
        limiter.record("SOL", at(3, 0));

        assert_eq!(limiter.last_alert("SOL"), Some(at(3, 0)));
        assert!(!limiter.permit("SOL", at(7, 0)));
        assert!(limiter.permit("SOL", at(8, 0)));
    }
}
