//! Two-tier read-through / write-through cache
//!
//! Tier-1 is the in-process [`MemoryTier`]; tier-2 is an optional shared
//! [`RemoteTier`]. Tier-1 is authoritative for the caller's session: tier-2
//! failures are logged and swallowed, never surfaced, so the cache is a
//! performance dependency only.
//!
//! # Invalidation asymmetry
//!
//! `delete` removes from both tiers by exact key. `invalidate_pattern` is
//! only guaranteed against tier-2: tier-1 entries matching the pattern may
//! persist until their (short) TTL expires. That staleness window is an
//! accepted tradeoff, not a bug — tier-1 has no key index to match patterns
//! against cheaply.

use crate::config::TieredCacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::memory::MemoryTier;
use crate::remote::RemoteTier;
use crate::stats::CacheStats;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tracing::{debug, warn};

/// Two-tier cache with TTL semantics
pub struct TieredCache {
    tier1: MemoryTier,
    remote: Option<Arc<dyn RemoteTier>>,
    config: TieredCacheConfig,
    tier2_hits: AtomicU64,
    tier2_errors: Arc<AtomicU64>,
}

impl TieredCache {
    /// Create a tier-1-only cache
    pub fn new(config: TieredCacheConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            tier1: MemoryTier::with_sweep(config.max_entries, config.sweep_interval),
            remote: None,
            config,
            tier2_hits: AtomicU64::new(0),
            tier2_errors: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Create a cache backed by a shared remote tier
    pub fn with_remote(config: TieredCacheConfig, remote: Arc<dyn RemoteTier>) -> CacheResult<Self> {
        let mut cache = Self::new(config)?;
        cache.remote = Some(remote);
        Ok(cache)
    }

    /// Read raw bytes. Checks tier-1, then tier-2; a tier-2 hit back-fills
    /// tier-1 with the shorter back-fill TTL. A miss is `None`, never an
    /// error; tier-2 failures degrade to a miss.
    pub async fn get_raw(&self, key: &str) -> Option<Bytes> {
        if let Some(value) = self.tier1.get(key) {
            return Some(value);
        }

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(Some(value)) => {
                self.tier2_hits.fetch_add(1, Ordering::Relaxed);
                self.tier1
                    .insert(key, value.clone(), self.config.backfill_ttl);
                debug!(key = %key, "tier-2 hit back-filled into tier-1");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                self.tier2_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "tier-2 read failed, serving tier-1 only");
                None
            }
        }
    }

    /// Write raw bytes: tier-1 synchronously, tier-2 as a detached
    /// best-effort task whose failure is logged, not surfaced.
    pub fn set_raw(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let tier1_ttl = ttl.unwrap_or(self.config.tier1_ttl);
        self.tier1.insert(key, value.clone(), tier1_ttl);

        if let Some(remote) = self.remote.clone() {
            let tier2_ttl = ttl.unwrap_or(self.config.tier2_ttl);
            let key = key.to_string();
            let errors = Arc::clone(&self.tier2_errors);
            tokio::spawn(async move {
                if let Err(e) = remote.set_with_ttl(&key, value, tier2_ttl).await {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!(key = %key, error = %e, "tier-2 write failed");
                }
            });
        }
    }

    /// Read and deserialize a typed value
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        match self.get_raw(key).await {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Serialize and write a typed value
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set_raw(key, Bytes::from(bytes), ttl);
        Ok(())
    }

    /// Delete an exact key from both tiers. The tier-2 delete is awaited but
    /// its failure is swallowed.
    pub async fn delete(&self, key: &str) {
        self.tier1.remove(key);

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(key).await {
                self.tier2_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "tier-2 delete failed");
            }
        }
    }

    /// Invalidate every tier-2 key matching a glob pattern. Returns how many
    /// keys were invalidated; 0 when no remote tier is configured or the
    /// service is unreachable. See the module docs for the tier-1 asymmetry.
    pub async fn invalidate_pattern(&self, pattern: &str) -> usize {
        let Some(remote) = &self.remote else {
            return 0;
        };

        let keys = match remote.keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.tier2_errors.fetch_add(1, Ordering::Relaxed);
                warn!(pattern = %pattern, error = %e, "tier-2 pattern listing failed");
                return 0;
            }
        };

        if keys.is_empty() {
            return 0;
        }

        // Exact keys we learned about can be dropped from tier-1 too
        for key in &keys {
            self.tier1.remove(key);
        }

        match remote.delete_many(&keys).await {
            Ok(()) => {
                debug!(pattern = %pattern, count = keys.len(), "invalidated tier-2 keys");
                keys.len()
            }
            Err(e) => {
                self.tier2_errors.fetch_add(1, Ordering::Relaxed);
                warn!(pattern = %pattern, error = %e, "tier-2 bulk delete failed");
                0
            }
        }
    }

    /// Drop all tier-1 entries. Tier-2 is left alone; use
    /// [`invalidate_pattern`](Self::invalidate_pattern) with `*` for that.
    pub fn clear_local(&self) {
        self.tier1.clear();
    }

    /// Snapshot cache activity
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tier1_hits: self.tier1.hit_count(),
            tier2_hits: self.tier2_hits.load(Ordering::Relaxed),
            // Tier-1 counts a miss before tier-2 is consulted, so subtract
            // the reads tier-2 ended up answering.
            misses: self
                .tier1
                .miss_count()
                .saturating_sub(self.tier2_hits.load(Ordering::Relaxed)),
            evictions: self.tier1.eviction_count(),
            expirations: self.tier1.expiration_count(),
            tier2_errors: self.tier2_errors.load(Ordering::Relaxed),
            entry_count: self.tier1.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemote;

    fn config() -> TieredCacheConfig {
        TieredCacheConfig::new().with_sweep_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let cache = TieredCache::new(config()).unwrap();
        cache
            .set("products:cat=shoes", &vec!["p1", "p2"], None)
            .unwrap();

        let got: Option<Vec<String>> = cache.get("products:cat=shoes").await.unwrap();
        assert_eq!(got, Some(vec!["p1".to_string(), "p2".to_string()]));
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_deserialization_error() {
        let cache = TieredCache::new(config()).unwrap();
        cache.set_raw("k", Bytes::from_static(b"not json"), None);

        let got: CacheResult<Option<Vec<String>>> = cache.get("k").await;
        assert!(matches!(got, Err(CacheError::Deserialization(_))));
    }

    #[tokio::test]
    async fn tier2_hit_backfills_tier1() {
        let remote = Arc::new(InMemoryRemote::new());
        remote
            .set_with_ttl("k", Bytes::from("v"), Duration::from_secs(60))
            .await
            .unwrap();

        let cache = TieredCache::with_remote(config(), remote).unwrap();
        assert_eq!(cache.get_raw("k").await, Some(Bytes::from("v")));

        let stats = cache.stats();
        assert_eq!(stats.tier2_hits, 1);
        // Second read is a tier-1 hit within the back-fill TTL
        assert_eq!(cache.get_raw("k").await, Some(Bytes::from("v")));
        assert_eq!(cache.stats().tier1_hits, 1);
    }

    #[tokio::test]
    async fn miss_is_none_not_error() {
        let cache = TieredCache::new(config()).unwrap();
        assert_eq!(cache.get_raw("absent").await, None);
        assert_eq!(cache.stats().misses, 1);
    }
}
