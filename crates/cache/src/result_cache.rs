//! TTL memoization for aggregation results, keyed by the serialized filter.
//! Absorbs repeated identical dashboard queries without a background sweep.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Short-lived result cache with lazy, on-read eviction.
///
/// Expiry is checked inside `get`; there is no sweeper task. Per-key
/// atomicity comes from DashMap's shard locking — no cross-key coordination.
pub struct ResultCache<V: Clone> {
    store: Arc<DashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    #[cfg(test)]
    fn with_ttl(ttl: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Get a cached value, evicting it first if its TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.store.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(key);
            metrics::counter!("cache.expired").increment(1);
            return None;
        }
        metrics::counter!("cache.hit").increment(1);
        Some(entry.value.clone())
    }

    /// Insert or overwrite a value, restarting its TTL.
    pub fn set(&self, key: String, value: V) {
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries. Optional; `get` already evicts lazily.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        let evicted = before - self.store.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Result cache eviction complete");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cache: ResultCache<u64> = ResultCache::new(20);
        cache.set("k".to_string(), 42);
        assert_eq!(cache.get("k"), Some(42));
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let cache: ResultCache<u64> = ResultCache::new(20);
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn test_expired_entry_is_evicted_on_read() {
        let cache: ResultCache<u64> = ResultCache::with_ttl(Duration::from_millis(20));
        cache.set("k".to_string(), 7);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_restarts_ttl() {
        let cache: ResultCache<u64> = ResultCache::with_ttl(Duration::from_millis(50));
        cache.set("k".to_string(), 1);
        std::thread::sleep(Duration::from_millis(30));
        cache.set("k".to_string(), 2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_evict_expired_sweep() {
        let cache: ResultCache<u64> = ResultCache::with_ttl(Duration::from_millis(10));
        cache.set("a".to_string(), 1);
        cache.set("b".to_string(), 2);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.evict_expired(), 2);
        assert!(cache.is_empty());
    }
}
