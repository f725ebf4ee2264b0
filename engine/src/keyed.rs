//! Per-key state with lazy creation and per-key exclusive access.
//!
//! The outer map is only write-locked to insert a new key; all
//! read-modify-write work happens under the key's own mutex, so distinct
//! symbols never contend on anything but the brief map lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::rolling_window::{RollingWindow, WindowPolicy};

type Factory<S> = Box<dyn Fn() -> S + Send + Sync>;

pub struct KeyedState<S> {
    entries: RwLock<HashMap<String, Arc<Mutex<S>>>>,
    factory: Factory<S>,
}

impl<S> KeyedState<S> {
    pub fn new(factory: impl Fn() -> S + Send + Sync + 'static) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Returns the entry for `key`, creating it on first use.
    fn entry(&self, key: &str) -> Arc<Mutex<S>> {
        if let Some(e) = self.entries.read().get(key) {
            return Arc::clone(e);
        }

        let mut map = self.entries.write();
        Arc::clone(
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new((self.factory)()))),
        )
    }

    /// Runs `f` with exclusive access to the state for `key`.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(&mut S) -> R) -> R {
        let entry = self.entry(key);
        let mut guard = entry.lock();
        f(&mut guard)
    }

    /// Like [`with`](Self::with) but never creates the entry.
    pub fn peek<R>(&self, key: &str, f: impl FnOnce(&S) -> R) -> Option<R> {
        let entry = self.entries.read().get(key).cloned()?;
        let guard = entry.lock();
        Some(f(&guard))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of distinct keys seen so far.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// One [`RollingWindow`] per key, all sharing the same policy.
pub struct WindowStore<T> {
    windows: KeyedState<RollingWindow<T>>,
}

impl<T: Send + 'static> WindowStore<T> {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            windows: KeyedState::new(move || RollingWindow::new(policy)),
        }
    }

    /// Runs `f` against the window for `key` under its lock.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut RollingWindow<T>) -> R) -> R {
        self.windows.with(key, f)
    }

    pub fn keys(&self) -> usize {
        self.windows.len()
    }
}

impl<T: Clone + Send + 'static> WindowStore<T> {
    /// Copy of the window for `key`; empty when the key was never seen.
    pub fn snapshot(&self, key: &str) -> Vec<T> {
        self.windows.peek(key, |w| w.snapshot()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::thread;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn entries_are_created_lazily() {
        let state: KeyedState<u32> = KeyedState::new(|| 0);
        assert!(state.is_empty());
        assert_eq!(state.peek("BTC", |v| *v), None);

        state.with("BTC", |v| *v += 1);
        assert!(state.contains("BTC"));
        assert_eq!(state.peek("BTC", |v| *v), Some(1));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn keys_are_independent() {
        let store = WindowStore::new(WindowPolicy::count(2));
        store.update("BTC", |w| w.push(t(0), 1.0));
        store.update("BTC", |w| w.push(t(1), 2.0));
        store.update("BTC", |w| w.push(t(2), 3.0));
        store.update("ETH", |w| w.push(t(0), 10.0));

        assert_eq!(store.snapshot("BTC"), vec![2.0, 3.0]);
        assert_eq!(store.snapshot("ETH"), vec![10.0]);
        assert!(store.snapshot("SOL").is_empty());
        assert_eq!(store.keys(), 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let state: Arc<KeyedState<u64>> = Arc::new(KeyedState::new(|| 0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    let key = if i % 2 == 0 { "BTC" } else { "ETH" };
                    for _ in 0..1_000 {
                        state.with(key, |v| *v += 1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(state.peek("BTC", |v| *v), Some(4_000));
        assert_eq!(state.peek("ETH", |v| *v), Some(4_000));
    }
}
