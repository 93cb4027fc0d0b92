//! Generic TTL cache backed by a concurrent map.
//!
//! Expired entries are purged lazily on read and eagerly by
//! [`TtlCache::purge_expired`] or a background sweeper. All timestamps come
//! from `tokio::time::Instant` so paused-clock tests control expiry.

use dashmap::DashMap;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A cached value with its insertion time and lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    name: String,
    default_ttl: Duration,
    entries: DashMap<K, CacheEntry<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            default_ttl,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Value for `key` if present and not older than its TTL
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Full entry (value plus age information) if not expired
    pub fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        // remove_if takes the shard lock, so the expiry check and eviction are one step
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(cache = %self.name, removed = removed, "🧹 Purged expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.name.clone(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Periodically purge expired entries until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }
            debug!(cache = %cache.name, "Cache sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_value_available_until_ttl_then_absent() {
        let cache = TtlCache::new("test", Duration::from_secs(10));
        cache.insert("k".to_string(), 42);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get(&"k".to_string()), Some(42));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"k".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_entry_ttl_overrides_default() {
        let cache = TtlCache::new("test", Duration::from_secs(60));
        cache.insert_with_ttl(1u32, "short", Duration::from_secs(1));
        cache.insert(2u32, "long");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some("long"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_stats() {
        let cache = TtlCache::new("stats", Duration::from_secs(5));
        cache.insert(1u32, 1u32);
        cache.insert(2u32, 2u32);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&3), None);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired(), 2);

        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_in_background() {
        let cache = Arc::new(TtlCache::new("sweep", Duration::from_secs(1)));
        cache.insert(1u32, 1u32);
        let shutdown = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(2), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.len(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
