//! Capacity- and TTL-bounded map shared by the trace and evaluation caches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

/// Point-in-time statistics for one cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: u64,
    pub max_capacity: u64,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

/// String-keyed cache with LRU eviction at capacity and per-entry TTL.
///
/// Only get/put/invalidate are exposed; eviction stays internal to moka.
pub struct BoundedCache<V> {
    inner: Cache<String, V>,
    max_capacity: u64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            inner,
            max_capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.inner.get(key);
        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value);
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Invalidate every entry whose key matches `predicate`.
    ///
    /// Returns the number of entries removed; each counts as one invalidation.
    pub fn invalidate_all<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let matched: Vec<String> = self
            .inner
            .iter()
            .filter(|(key, _)| predicate(key.as_str()))
            .map(|(key, _)| key.to_string())
            .collect();
        matched.iter().filter(|key| self.invalidate(key)).count()
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks();
        CacheStats {
            size: self.inner.entry_count(),
            max_capacity: self.max_capacity,
            ttl_secs: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_get_put_invalidate() {
        let cache: BoundedCache<String> = BoundedCache::new(10, Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        cache.put("k", "v".to_string());
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert!(cache.get("k").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.max_capacity, 10);
        assert_eq!(stats.ttl_secs, 60);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache: BoundedCache<u32> = BoundedCache::new(10, Duration::from_millis(50));
        cache.put("k", 1);
        assert_eq!(cache.get("k"), Some(1));
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_capacity_bound() {
        let cache: BoundedCache<u32> = BoundedCache::new(4, Duration::from_secs(60));
        for i in 0..32 {
            cache.put(format!("k{i}"), i);
        }
        assert!(cache.stats().size <= 4);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache: BoundedCache<u32> = BoundedCache::new(3, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        cache.inner.run_pending_tasks();
        assert_eq!(cache.get("a"), Some(1));
        cache.inner.run_pending_tasks();

        cache.put("d", 4);
        cache.inner.run_pending_tasks();

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_predicate_invalidation() {
        let cache: BoundedCache<u32> = BoundedCache::new(10, Duration::from_secs(60));
        cache.put("j1:1:aaaa", 1);
        cache.put("j1:2:aaaa", 2);
        cache.put("j2:1:aaaa", 3);
        assert_eq!(cache.invalidate_all(|k| k.starts_with("j1:")), 2);
        assert_eq!(cache.get("j1:1:aaaa"), None);
        assert_eq!(cache.get("j1:2:aaaa"), None);
        assert_eq!(cache.get("j2:1:aaaa"), Some(3));

        assert_eq!(cache.invalidate_all(|k| k.starts_with("j1:")), 0);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_concurrent_access() {
        let cache: Arc<BoundedCache<usize>> =
            Arc::new(BoundedCache::new(1000, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("k{}", i % 10);
                        cache.put(key.clone(), t * 1000 + i);
                        let _ = cache.get(&key);
                        if i % 7 == 0 {
                            cache.invalidate(&key);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 800);
        assert!(stats.size <= 10);
    }
}
