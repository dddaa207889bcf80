//! Process-local tier-1 cache
//!
//! A bounded TTL map over `DashMap`. Expired entries read as absent and are
//! purged lazily on access plus by an optional background sweep. Past
//! capacity, oldest entries are evicted first — tier-1 absorbs bursts, it is
//! not a long-lived store.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Bytes,
    stored_at: Instant,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Counters for tier-1 activity. Snapshot via [`MemoryTier::hit_count`] and
/// friends; the tiered cache folds these into its overall stats.
#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// In-process TTL cache used as tier-1
pub struct MemoryTier {
    storage: Arc<DashMap<String, MemoryEntry>>,
    counters: Arc<TierCounters>,
    max_entries: usize,
    sweep_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryTier {
    /// Create a tier without a background sweep
    pub fn new(max_entries: usize) -> Self {
        Self {
            storage: Arc::new(DashMap::with_capacity(max_entries.min(1024))),
            counters: Arc::new(TierCounters::default()),
            max_entries,
            sweep_handle: None,
        }
    }

    /// Create a tier and start the periodic expired-entry sweep
    pub fn with_sweep(max_entries: usize, sweep_interval: Duration) -> Self {
        let mut tier = Self::new(max_entries);
        if sweep_interval > Duration::ZERO {
            tier.start_sweep(sweep_interval);
        }
        tier
    }

    fn start_sweep(&mut self, sweep_interval: Duration) {
        let storage = Arc::clone(&self.storage);
        let counters = Arc::clone(&self.counters);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            loop {
                ticker.tick().await;

                let expired: Vec<String> = storage
                    .iter()
                    .filter(|entry| entry.value().is_expired())
                    .map(|entry| entry.key().clone())
                    .collect();

                let mut removed = 0u64;
                for key in expired {
                    if storage.remove(&key).is_some() {
                        removed += 1;
                    }
                }
                if removed > 0 {
                    counters.expirations.fetch_add(removed, Ordering::Relaxed);
                    trace!(removed, "tier-1 sweep purged expired entries");
                }
            }
        });

        self.sweep_handle = Some(handle);
    }

    /// Look up a key, treating expired entries as absent (and purging them)
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.storage.get(key) {
            Some(entry) if !entry.is_expired() => {
                let value = entry.value.clone();
                drop(entry);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(entry) => {
                drop(entry);
                if self.storage.remove(key).is_some() {
                    self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry. Writes are atomic replacements; a
    /// concurrent reader sees either the old value or the new one, never a
    /// partial write.
    pub fn insert(&self, key: &str, value: Bytes, ttl: Duration) {
        if self.storage.len() >= self.max_entries && !self.storage.contains_key(key) {
            self.evict_oldest();
        }

        let now = Instant::now();
        self.storage.insert(
            key.to_string(),
            MemoryEntry {
                value,
                stored_at: now,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove an exact key. Returns true if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.storage.remove(key).is_some()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Live entry count (may include not-yet-swept expired entries)
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the tier holds no entries
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Tier-1 hits observed so far
    pub fn hit_count(&self) -> u64 {
        self.counters.hits.load(Ordering::Relaxed)
    }

    /// Tier-1 misses observed so far
    pub fn miss_count(&self) -> u64 {
        self.counters.misses.load(Ordering::Relaxed)
    }

    /// Entries evicted for capacity
    pub fn eviction_count(&self) -> u64 {
        self.counters.evictions.load(Ordering::Relaxed)
    }

    /// Entries purged for TTL expiry
    pub fn expiration_count(&self) -> u64 {
        self.counters.expirations.load(Ordering::Relaxed)
    }

    fn evict_oldest(&self) {
        let oldest = self
            .storage
            .iter()
            .min_by_key(|entry| entry.value().stored_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            if self.storage.remove(&key).is_some() {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "tier-1 capacity eviction");
            }
        }
    }
}

impl Drop for MemoryTier {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep_handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ttl_boundary_behaviour() {
        let tier = MemoryTier::new(16);
        tier.insert("products:cat=shoes", Bytes::from("v"), Duration::from_millis(5000));

        tokio::time::advance(Duration::from_millis(4900)).await;
        assert_eq!(tier.get("products:cat=shoes"), Some(Bytes::from("v")));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(tier.get("products:cat=shoes"), None);
        // Lazy purge removed the expired entry
        assert_eq!(tier.len(), 0);
    }

    #[tokio::test]
    async fn overwrite_replaces_atomically() {
        let tier = MemoryTier::new(16);
        tier.insert("k", Bytes::from("one"), Duration::from_secs(60));
        tier.insert("k", Bytes::from("two"), Duration::from_secs(60));
        assert_eq!(tier.get("k"), Some(Bytes::from("two")));
        assert_eq!(tier.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest_first() {
        let tier = MemoryTier::new(2);
        tier.insert("a", Bytes::from("1"), Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(1)).await;
        tier.insert("b", Bytes::from("2"), Duration::from_secs(60));
        tokio::time::advance(Duration::from_millis(1)).await;
        tier.insert("c", Bytes::from("3"), Duration::from_secs(60));

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get("a"), None);
        assert_eq!(tier.get("b"), Some(Bytes::from("2")));
        assert_eq!(tier.get("c"), Some(Bytes::from("3")));
        assert_eq!(tier.eviction_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_purges_expired() {
        let tier = MemoryTier::with_sweep(16, Duration::from_secs(1));
        tier.insert("short", Bytes::from("v"), Duration::from_millis(100));
        tier.insert("long", Bytes::from("v"), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        // Give the sweep task a chance to run after the tick
        tokio::task::yield_now().await;

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("long"), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn counters_track_hits_and_misses() {
        let tier = MemoryTier::new(16);
        tier.insert("k", Bytes::from("v"), Duration::from_secs(60));
        tier.get("k");
        tier.get("missing");
        assert_eq!(tier.hit_count(), 1);
        assert_eq!(tier.miss_count(), 1);
    }
}
