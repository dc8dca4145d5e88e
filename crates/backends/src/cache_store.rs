// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Response cache storage
//!
//! Entries are opaque response bodies keyed by a request fingerprint. The
//! store owns expiry; callers choose the TTL per entry.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::error::StoreResult;

/// Key-value store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Fetch a live entry
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Store an entry that expires after `ttl`
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value: Bytes,
    stored_at: Instant,
    ttl: Duration,
    last_access: Instant,
    access_count: u64,
}

impl CachedEntry {
    fn new(value: Bytes, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            stored_at: now,
            ttl,
            last_access: now,
            access_count: 0,
        }
    }

    fn is_valid(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) < self.ttl
    }

    fn accessed(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_access = now;
    }
}

/// In-process cache with TTL expiry and LRU eviction
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: DashMap<String, CachedEntry>,
    max_entries: usize,
    stats: DashMap<&'static str, u64>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCacheStore {
    /// Default capacity
    pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

    /// Create a cache holding at most `max_entries` entries
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            stats: DashMap::new(),
        }
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        if let Some(mut cached) = self.entries.get_mut(key) {
            if cached.is_valid(now) {
                cached.accessed(now);
                self.increment_stat("cache_hits");
                trace!(key, access_count = cached.access_count, "cache hit");
                return Some(cached.value.clone());
            }
            drop(cached);
            self.entries.remove(key);
            self.increment_stat("cache_expired");
            debug!(key, "expired cache entry removed");
        }

        self.increment_stat("cache_misses");
        None
    }

    fn store(&self, key: &str, value: Bytes, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let current_size = self.entries.len();
        let capacity_threshold = self.max_entries - self.max_entries / 10;

        if current_size >= self.max_entries && !self.entries.contains_key(key) {
            self.evict_least_recently_used();
        } else if current_size >= capacity_threshold {
            self.cleanup_expired();
        }

        self.entries
            .insert(key.to_string(), CachedEntry::new(value, ttl));
        self.increment_stat("cache_stores");

        trace!(
            key,
            ttl_ms = ttl.as_millis(),
            size = self.entries.len(),
            max = self.max_entries,
            "stored cache entry"
        );
    }

    fn evict_least_recently_used(&self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|item| (item.value().last_access, item.value().access_count))
            .map(|item| item.key().clone());

        if let Some(key) = lru_key
            && let Some((_, entry)) = self.entries.remove(&key)
        {
            self.increment_stat("cache_evictions");
            info!(
                access_count = entry.access_count,
                age_ms = entry.stored_at.elapsed().as_millis(),
                remaining_entries = self.entries.len(),
                "evicted lru cache entry due to capacity limit"
            );
        }
    }

    /// Remove every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            *self.stats.entry("cache_expired").or_insert(0) += removed as u64;
            debug!(removed, "cleaned up expired cache entries");
        }
        removed
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        self.entries.clear();
        self.stats.clear();
    }

    /// Snapshot of cache statistics
    pub fn stats(&self) -> CacheStoreStats {
        let cache_hits = self.get_stat("cache_hits");
        let cache_misses = self.get_stat("cache_misses");
        let total = cache_hits + cache_misses;
        let entry_count = self.entries.len();

        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total > 0 {
            cache_hits as f64 / total as f64
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let utilization_rate = entry_count as f64 / self.max_entries as f64;

        CacheStoreStats {
            entry_count,
            cache_hits,
            cache_misses,
            cache_stores: self.get_stat("cache_stores"),
            cache_evictions: self.get_stat("cache_evictions"),
            cache_expired: self.get_stat("cache_expired"),
            hit_rate,
            utilization_rate,
            max_capacity: self.max_entries,
        }
    }

    fn increment_stat(&self, key: &'static str) {
        *self.stats.entry(key).or_insert(0) += 1;
    }

    fn get_stat(&self, key: &'static str) -> u64 {
        self.stats.get(key).map_or(0, |v| *v)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.lookup(key))
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> StoreResult<()> {
        self.store(key, value, ttl);
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of stored entries
    pub entry_count: usize,
    /// Lookups that found a live entry
    pub cache_hits: u64,
    /// Lookups that found nothing
    pub cache_misses: u64,
    /// Entries written
    pub cache_stores: u64,
    /// Entries evicted for capacity
    pub cache_evictions: u64,
    /// Entries dropped after expiry
    pub cache_expired: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    /// Utilization (0.0 to 1.0)
    pub utilization_rate: f64,
    /// Maximum number of entries
    pub max_capacity: usize,
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn store_and_fetch() {
        let cache = MemoryCacheStore::default();
        assert!(cache.get("a").await.unwrap().is_none());

        cache.put("a", Bytes::from_static(b"{}"), MINUTE).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().unwrap(), Bytes::from_static(b"{}"));

        let stats = cache.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_stores, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = MemoryCacheStore::default();
        cache.put("short", Bytes::from_static(b"1"), Duration::from_secs(1)).await.unwrap();
        cache.put("long", Bytes::from_static(b"2"), MINUTE).await.unwrap();

        advance(Duration::from_millis(999)).await;
        assert!(cache.get("short").await.unwrap().is_some());

        advance(Duration::from_millis(2)).await;
        assert!(cache.get("short").await.unwrap().is_none());
        assert!(cache.get("long").await.unwrap().is_some());
        assert_eq!(cache.stats().cache_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_not_stored() {
        let cache = MemoryCacheStore::default();
        cache.put("a", Bytes::from_static(b"1"), Duration::ZERO).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_expired_entries() {
        let cache = MemoryCacheStore::default();
        cache.put("a", Bytes::from_static(b"1"), Duration::from_secs(1)).await.unwrap();
        cache.put("b", Bytes::from_static(b"2"), MINUTE).await.unwrap();

        advance(Duration::from_secs(2)).await;
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lru_eviction() {
        let cache = MemoryCacheStore::new(2);

        cache.put("a", Bytes::from_static(b"1"), MINUTE).await.unwrap();
        advance(Duration::from_millis(10)).await;
        cache.put("b", Bytes::from_static(b"2"), MINUTE).await.unwrap();
        advance(Duration::from_millis(10)).await;

        // touching "a" makes "b" the least recently used
        assert!(cache.get("a").await.unwrap().is_some());
        advance(Duration::from_millis(10)).await;

        cache.put("c", Bytes::from_static(b"3"), MINUTE).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").await.unwrap().is_some());
        assert!(cache.get("b").await.unwrap().is_none());
        assert!(cache.get("c").await.unwrap().is_some());
        assert_eq!(cache.stats().cache_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_at_capacity_does_not_evict() {
        let cache = MemoryCacheStore::new(2);
        cache.put("a", Bytes::from_static(b"1"), MINUTE).await.unwrap();
        cache.put("b", Bytes::from_static(b"2"), MINUTE).await.unwrap();
        cache.put("b", Bytes::from_static(b"3"), MINUTE).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b").await.unwrap().unwrap(), Bytes::from_static(b"3"));
        assert_eq!(cache.stats().cache_evictions, 0);
    }
}
