use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Eviction limits for a [`RollingWindow`]. Either cap may be absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Maximum number of retained samples.
    pub max_len: Option<usize>,
    /// Maximum age of a retained sample, measured against the caller's "now".
    pub max_age: Option<Duration>,
}

impl WindowPolicy {
    pub fn count(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            max_age: None,
        }
    }

    pub fn age(max_age: Duration) -> Self {
        Self {
            max_len: None,
            max_age: Some(max_age),
        }
    }

    pub fn bounded(max_len: usize, max_age: Duration) -> Self {
        Self {
            max_len: Some(max_len),
            max_age: Some(max_age),
        }
    }
}

/// Ordered buffer of timestamped samples, in arrival order.
///
/// Appends never fail. Age eviction only looks at the front, so a late sample
/// stays until everything ahead of it has expired.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    window: VecDeque<(DateTime<Utc>, T)>,
    policy: WindowPolicy,
}

impl<T> RollingWindow<T> {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            window: VecDeque::with_capacity(policy.max_len.unwrap_or(0).min(1024)),
            policy,
        }
    }

    /// Appends `item` and trims to the count cap. Does not age anything out.
    pub fn push(&mut self, ts: DateTime<Utc>, item: T) {
        self.window.push_back((ts, item));
        self.evict_overflow();
    }

    /// Drops entries older than the retention as of `now`, then appends.
    pub fn push_at(&mut self, now: DateTime<Utc>, ts: DateTime<Utc>, item: T) {
        self.evict_expired(now);
        self.push(ts, item);
    }

    /// Pops front entries timestamped before `now - max_age`.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = self
            .policy
            .max_age
            .and_then(|max| now.checked_sub_signed(max))
        else {
            return;
        };

        while self.window.front().is_some_and(|(ts, _)| *ts < cutoff) {
            self.window.pop_front();
        }
    }

    fn evict_overflow(&mut self) {
        if let Some(max) = self.policy.max_len {
            while self.window.len() > max {
                self.window.pop_front();
            }
        }
    }

    pub fn latest(&self) -> Option<&T> {
        self.window.back().map(|(_, item)| item)
    }

    pub fn oldest(&self) -> Option<&T> {
        self.window.front().map(|(_, item)| item)
    }

    pub fn oldest_ts(&self) -> Option<DateTime<Utc>> {
        self.window.front().map(|(ts, _)| *ts)
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.window.iter().map(|(_, item)| item)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl<T: Clone> RollingWindow<T> {
    /// Owned copy of the values, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn count_cap_keeps_most_recent() {
        let mut w = RollingWindow::new(WindowPolicy::count(3));
        for i in 0..5 {
            w.push(t(i), i);
        }

        assert_eq!(w.len(), 3);
        assert_eq!(w.snapshot(), vec![2, 3, 4]);
        assert_eq!(w.oldest(), Some(&2));
        assert_eq!(w.latest(), Some(&4));
    }

    #[test]
    fn age_cap_evicts_from_the_front() {
        let mut w = RollingWindow::new(WindowPolicy::age(Duration::seconds(10)));
        w.push_at(t(0), t(0), "a");
        w.push_at(t(5), t(5), "b");
        w.push_at(t(11), t(11), "c"); // "a" is 11s old

        assert_eq!(w.snapshot(), vec!["b", "c"]);
        assert_eq!(w.oldest_ts(), Some(t(5)));
    }

    #[test]
    fn sample_exactly_at_retention_is_kept() {
        let mut w = RollingWindow::new(WindowPolicy::age(Duration::seconds(10)));
        w.push_at(t(0), t(0), 1);
        w.push_at(t(10), t(10), 2);

        assert_eq!(w.len(), 2);
    }

    #[test]
    fn dual_cap_applies_both_limits() {
        let mut w = RollingWindow::new(WindowPolicy::bounded(2, Duration::seconds(100)));
        w.push_at(t(0), t(0), 1);
        w.push_at(t(1), t(1), 2);
        w.push_at(t(2), t(2), 3);
        assert_eq!(w.snapshot(), vec![2, 3]);

        w.push_at(t(200), t(200), 4);
        assert_eq!(w.snapshot(), vec![4]);
    }

    #[test]
    fn late_sample_is_still_appended() {
        let mut w = RollingWindow::new(WindowPolicy::age(Duration::seconds(10)));
        w.push_at(t(100), t(100), 1);
        w.push_at(t(100), t(50), 2);

        assert_eq!(w.snapshot(), vec![1, 2]);

        // Once the front expires, the stale sample behind it goes too.
        w.evict_expired(t(111));
        assert!(w.is_empty());
    }

    #[test]
    fn age_is_measured_from_now_not_from_the_samples() {
        let mut w = RollingWindow::new(WindowPolicy::age(Duration::days(7)));
        let now = t(0) + Duration::days(30);
        for i in 0..5 {
            w.push_at(now, t(i), i);
        }

        // Everything before the newest append was already a month old.
        assert_eq!(w.snapshot(), vec![4]);
    }

    #[test]
    fn count_only_window_ignores_age() {
        let mut w = RollingWindow::new(WindowPolicy::count(10));
        w.push_at(t(1_000_000), t(0), 1);
        w.push_at(t(1_000_000), t(1), 2);

        assert_eq!(w.len(), 2);
    }
}
