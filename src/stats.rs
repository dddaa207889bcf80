//! Activity counters and snapshots
//!
//! Counters are plain relaxed atomics updated on the hot path; snapshots are
//! assembled on demand so there is no incremental aggregate to drift.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of tiered cache activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered by tier-1
    pub tier1_hits: u64,
    /// Reads answered by tier-2 (and back-filled into tier-1)
    pub tier2_hits: u64,
    /// Reads that missed both tiers
    pub misses: u64,
    /// Tier-1 entries evicted for capacity
    pub evictions: u64,
    /// Tier-1 entries purged for TTL expiry
    pub expirations: u64,
    /// Tier-2 operations swallowed because the service failed
    pub tier2_errors: u64,
    /// Current tier-1 entry count
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit rate across both tiers, 0.0 when nothing was read yet
    pub fn hit_rate(&self) -> f64 {
        let hits = self.tier1_hits + self.tier2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Atomic counters behind the orchestrator's `stats()` surface
#[derive(Debug, Default)]
pub struct OrchestratorCounters {
    requests: AtomicU64,
    network_attempts: AtomicU64,
    cache_hits: AtomicU64,
    dedup_joins: AtomicU64,
    retries: AtomicU64,
    batch_flushes: AtomicU64,
    failures: AtomicU64,
}

impl OrchestratorCounters {
    /// A logical request entered the orchestrator
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A network attempt was dispatched (retries count individually)
    pub fn record_attempt(&self) {
        self.network_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// A read was answered from cache without a network call
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller joined an identical in-flight request
    pub fn record_dedup_join(&self) {
        self.dedup_joins.fetch_add(1, Ordering::Relaxed);
    }

    /// A failed attempt is being retried
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A batch queue was flushed into one combined call
    pub fn record_batch_flush(&self) {
        self.batch_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// A request settled with a terminal error
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters
    pub fn snapshot(&self) -> OrchestratorStats {
        OrchestratorStats {
            requests: self.requests.load(Ordering::Relaxed),
            network_attempts: self.network_attempts.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batch_flushes: self.batch_flushes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of orchestrator activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// Logical requests received
    pub requests: u64,
    /// Network attempts dispatched, retries included
    pub network_attempts: u64,
    /// Reads served from cache
    pub cache_hits: u64,
    /// Callers that shared another caller's in-flight request
    pub dedup_joins: u64,
    /// Retried attempts
    pub retries: u64,
    /// Batch queue flushes
    pub batch_flushes: u64,
    /// Requests that settled with a terminal error
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_counts_both_tiers() {
        let stats = CacheStats {
            tier1_hits: 3,
            tier2_hits: 1,
            misses: 4,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_stats_rate_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn counters_snapshot() {
        let counters = OrchestratorCounters::default();
        counters.record_request();
        counters.record_attempt();
        counters.record_attempt();
        counters.record_retry();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert_eq!(snapshot.network_attempts, 2);
        assert_eq!(snapshot.retries, 1);
    }
}
