//! Preload outcome records and derived metrics
//!
//! Terminal outcomes append to a capped ring buffer; aggregates are derived
//! on demand from the records rather than maintained incrementally, so they
//! cannot drift from the data.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One terminal preload outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadRecord {
    /// Resource URL
    pub url: String,
    /// Wall time from dequeue to terminal state, in milliseconds
    pub load_time_ms: u64,
    /// Whether the resource ended in the loaded set
    pub success: bool,
    /// Milliseconds since the Unix epoch when the record was made
    pub timestamp_ms: u64,
    /// Whether an intermediate cache answered the load
    pub from_cache: bool,
}

impl PreloadRecord {
    /// Stamp a record with the current wall clock
    pub fn now(url: &str, load_time: Duration, success: bool, from_cache: bool) -> Self {
        Self {
            url: url.to_string(),
            load_time_ms: load_time.as_millis() as u64,
            success,
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            from_cache,
        }
    }
}

/// Capped ring of [`PreloadRecord`]s, oldest evicted past the cap
#[derive(Debug)]
pub struct MetricsRing {
    records: VecDeque<PreloadRecord>,
    capacity: usize,
}

impl MetricsRing {
    /// Create a ring holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest past the cap
    pub fn push(&mut self, record: PreloadRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records currently retained, oldest first
    pub fn records(&self) -> impl Iterator<Item = &PreloadRecord> {
        self.records.iter()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ring is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Derive aggregates from the retained records. Queue/active counts are
    /// supplied by the scheduler since the ring only sees terminal outcomes.
    pub fn aggregate(&self, queued: usize, loading: usize) -> PreloadMetrics {
        let total = self.records.len() as u64;
        let successes = self.records.iter().filter(|r| r.success).count() as u64;
        let cache_hits = self.records.iter().filter(|r| r.from_cache).count() as u64;
        let total_load_ms: u64 = self.records.iter().map(|r| r.load_time_ms).sum();

        PreloadMetrics {
            recorded: total,
            success_rate: if total == 0 {
                0.0
            } else {
                successes as f64 / total as f64
            },
            avg_load_time_ms: if total == 0 {
                0.0
            } else {
                total_load_ms as f64 / total as f64
            },
            cache_hit_rate: if total == 0 {
                0.0
            } else {
                cache_hits as f64 / total as f64
            },
            queued,
            loading,
        }
    }
}

/// Aggregated preloader statistics, derived on demand
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreloadMetrics {
    /// Terminal outcomes currently retained in the ring
    pub recorded: u64,
    /// Fraction of retained outcomes that loaded successfully
    pub success_rate: f64,
    /// Mean load time across retained outcomes, milliseconds
    pub avg_load_time_ms: f64,
    /// Fraction of retained outcomes answered from cache
    pub cache_hit_rate: f64,
    /// Tasks waiting in the priority queue
    pub queued: usize,
    /// Tasks currently loading
    pub loading: usize,
}
