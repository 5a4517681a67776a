//! In-memory TTL cache for idempotent responses.
//!
//! Entries are checked against their own TTL on every lookup and removed
//! once stale. When the entry count exceeds the configured limit, expired
//! entries are dropped first and then the oldest ones.

mod key;

pub use key::{cache_key, normalize_path};

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::metrics::record_cache;

#[derive(Clone, Debug)]
struct CacheEntry<T> {
    data: T,
    timestamp: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self { data, timestamp: Instant::now(), ttl }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) >= self.ttl
    }
}

/// Keyed response store with per-entry TTL.
#[derive(Debug)]
pub struct ResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    max_entries: usize,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self { entries: DashMap::new(), max_entries: max_entries.max(1) }
    }

    /// Fresh value for `key`; a stale entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let stale = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                record_cache("hit");
                return Some(entry.data.clone());
            },
            Some(_) => true,
            None => false,
        };

        if stale {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            debug!(key = %key, "Cache entry expired");
        }
        record_cache("miss");
        None
    }

    /// Store `value` under `key`, stamped now. A zero TTL stores nothing.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let key = key.into();
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Caching response");
        record_cache("store");
        self.entries.insert(key, CacheEntry::new(value, ttl));

        if self.entries.len() > self.max_entries {
            self.cleanup();
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry at or below the path `prefix`; returns the count.
    ///
    /// Matching stops at segment boundaries: `GET /users` covers
    /// `GET /users`, `GET /users/7` and `GET /users?page=2`, but not
    /// `GET /usersettings`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !is_under(key, prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries; returns the count removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        for _ in 0..removed {
            record_cache("evict");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup(&self) {
        let before = self.entries.len();
        self.purge_expired();

        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(Instant, String)> =
                self.entries.iter().map(|e| (e.timestamp, e.key().clone())).collect();
            by_age.sort();
            for (_, key) in by_age.into_iter().take(excess) {
                if self.entries.remove(&key).is_some() {
                    record_cache("evict");
                }
            }
        }

        debug!(before, after = self.entries.len(), "Response cache cleanup");
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with(['/', '?']),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_at_ttl() {
        let cache = ResponseCache::new(10);
        cache.set("GET /users", 1u32, Duration::from_millis(100));

        advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get("GET /users"), Some(1));

        advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("GET /users"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_entry_has_own_ttl() {
        let cache = ResponseCache::new(10);
        cache.set("short", "a", Duration::from_millis(10));
        cache.set("long", "b", Duration::from_secs(10));

        advance(Duration::from_millis(50)).await;
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_not_stored() {
        let cache = ResponseCache::new(10);
        cache.set("k", 1, Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_prefix() {
        let cache = ResponseCache::new(10);
        let ttl = Duration::from_secs(30);
        cache.set("GET /users?page=1", 1, ttl);
        cache.set("GET /users?page=2", 2, ttl);
        cache.set("GET /orders", 3, ttl);

        assert!(cache.invalidate("GET /orders"));
        assert!(!cache.invalidate("GET /orders"));
        assert_eq!(cache.invalidate_prefix("GET /users"), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefix_stops_at_segment_boundary() {
        let cache = ResponseCache::new(10);
        let ttl = Duration::from_secs(30);
        cache.set("GET /users", 1, ttl);
        cache.set("GET /users/7/orders", 2, ttl);
        cache.set("GET /usersettings", 3, ttl);
        cache.set("GET /users_archive?page=1", 4, ttl);

        assert_eq!(cache.invalidate_prefix("GET /users"), 2);
        assert_eq!(cache.get("GET /usersettings"), Some(3));
        assert_eq!(cache.get("GET /users_archive?page=1"), Some(4));

        assert_eq!(cache.invalidate_prefix("GET /"), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_capacity_drops_expired_then_oldest() {
        let cache = ResponseCache::new(2);
        cache.set("stale", 0, Duration::from_millis(10));
        advance(Duration::from_millis(20)).await;

        cache.set("a", 1, Duration::from_secs(60));
        advance(Duration::from_millis(1)).await;
        cache.set("b", 2, Duration::from_secs(60));
        // Expired entry goes first, leaving two
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));

        advance(Duration::from_millis(1)).await;
        cache.set("c", 3, Duration::from_secs(60));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.get("c"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new(10);
        cache.set("a", 1, Duration::from_millis(10));
        cache.set("b", 2, Duration::from_secs(10));

        advance(Duration::from_millis(10)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
