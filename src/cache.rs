//! Short-lived in-memory cache for shaped API responses.
//!
//! Keys come straight from client query strings, so the cache is bounded in
//! both time and size. Expired entries are never returned and are dropped by
//! the backing cache's own housekeeping, not only when read.

use std::time::Duration;

use moka::sync::Cache;

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default upper bound on cached responses.
pub const DEFAULT_MAX_ENTRIES: u64 = 1000;

/// String-keyed cache with a fixed TTL and a capacity bound.
#[derive(Clone)]
pub struct ResponseCache<V> {
    entries: Cache<String, V>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.entries.policy().max_capacity())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    /// Cache holding at most `max_entries` responses, each for `ttl`.
    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { entries, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key)
    }

    /// Store `value` under `key`, replacing any previous value and
    /// restarting its TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn delete(&self, key: &str) {
        self.entries.invalidate(key);
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
    }

    /// Number of live entries after pending evictions have been applied.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of live entries, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.as_ref().clone()).collect()
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(Duration::from_millis(50));
        cache.set("intake:0:1:", 42);
        assert_eq!(cache.get("intake:0:1:"), Some(42));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("intake:0:1:"), None);
        assert!(cache.is_empty(), "expired entry should be evicted");
    }

    #[test]
    fn test_expired_entries_are_evicted_without_reads() {
        let cache = ResponseCache::new(Duration::from_millis(50));
        for i in 0..500 {
            cache.set(format!("intake:{}::", i), i);
        }

        std::thread::sleep(Duration::from_millis(80));
        cache.set("intake:fresh::", -1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys(), vec!["intake:fresh::".to_string()]);
    }

    #[test]
    fn test_capacity_bounds_distinct_keys() {
        let cache = ResponseCache::with_capacity(Duration::from_secs(60), 10);
        for i in 0..200 {
            cache.set(format!("intake:{}::", i), i);
        }

        assert!(cache.len() <= 10, "cache grew to {}", cache.len());
    }

    #[test]
    fn test_delete_clear_and_keys() {
        let cache = ResponseCache::default();
        cache.set("a", 1);
        cache.set("b", 2);

        let mut keys = cache.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        cache.delete("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_refreshes_value() {
        let cache = ResponseCache::default();
        cache.set("k", 1);
        cache.set("k", 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }
}
