//! Typed per-operation storage: cached results and in-flight calls

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;
use vlink_core::TransportResult;

/// A single underlying call that any number of callers can await
pub(crate) type SharedCall<V> = Shared<BoxFuture<'static, TransportResult<V>>>;

/// A cached result and when it was stored
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Cached results of one operation, keyed by its arguments
#[derive(Debug)]
pub(crate) struct ResultCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K: Eq + Hash, V: Clone> ResultCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The cached value, if present and within `ttl`
    pub fn get_fresh(&self, key: &K, ttl: Duration, now: Instant) -> Option<V> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(ttl, now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries past `ttl`, returning how many were dropped
    pub fn sweep(&mut self, ttl: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(ttl, now));
        before - self.entries.len()
    }

    /// (total, fresh) entry counts
    pub fn counts(&self, ttl: Duration, now: Instant) -> (usize, usize) {
        let fresh = self
            .entries
            .values()
            .filter(|entry| entry.is_fresh(ttl, now))
            .count();
        (self.entries.len(), fresh)
    }
}

/// In-flight calls of one operation.
///
/// Each registration carries a call id so that a call which was detached
/// (by invalidation) cannot deregister its replacement when it completes.
pub(crate) struct InFlight<K, V> {
    calls: HashMap<K, (u64, SharedCall<V>)>,
}

impl<K: Eq + Hash, V: Clone> InFlight<K, V> {
    pub fn new() -> Self {
        Self {
            calls: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<SharedCall<V>> {
        self.calls.get(key).map(|(_, call)| call.clone())
    }

    pub fn insert(&mut self, key: K, id: u64, call: SharedCall<V>) {
        self.calls.insert(key, (id, call));
    }

    /// Deregister `key` only if it is still registered to call `id`
    pub fn remove_if(&mut self, key: &K, id: u64) -> bool {
        match self.calls.get(key) {
            Some((current, _)) if *current == id => {
                self.calls.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Forget the in-flight call for `key`; it still runs to completion
    /// for the callers already attached to it
    pub fn detach(&mut self, key: &K) -> bool {
        self.calls.remove(key).is_some()
    }

    pub fn detach_all(&mut self) {
        self.calls.clear();
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test(start_paused = true)]
    async fn test_result_cache_ttl() {
        let ttl = Duration::from_secs(5);
        let mut cache: ResultCache<String, u32> = ResultCache::new();
        cache.insert("a".into(), 1, Instant::now());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get_fresh(&"a".to_string(), ttl, Instant::now()), Some(1));
        assert_eq!(cache.counts(ttl, Instant::now()), (1, 1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get_fresh(&"a".to_string(), ttl, Instant::now()), None);
        assert_eq!(cache.counts(ttl, Instant::now()), (1, 0));
        assert_eq!(cache.sweep(ttl, Instant::now()), 1);
        assert_eq!(cache.counts(ttl, Instant::now()), (0, 0));
    }

    #[test]
    fn test_in_flight_remove_checks_id() {
        let mut calls: InFlight<&'static str, u32> = InFlight::new();
        let call: SharedCall<u32> = async { Ok(7) }.boxed().shared();
        calls.insert("k", 1, call.clone());

        assert!(!calls.remove_if(&"k", 2));
        assert_eq!(calls.len(), 1);

        // a detached call is replaced; the old id must not remove the new one
        assert!(calls.detach(&"k"));
        calls.insert("k", 3, call);
        assert!(!calls.remove_if(&"k", 1));
        assert!(calls.remove_if(&"k", 3));
        assert_eq!(calls.len(), 0);
    }
}
