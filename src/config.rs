//! Configuration for the cache, orchestrator and preloader
//!
//! All configs follow the same builder pattern: construct with `new()` or
//! `default()`, chain `with_*` setters, and call `validate()` before use
//! (component constructors do this for you).

use crate::loader::ResourceType;
use crate::preloader::{DeviceClass, NetworkQuality};
use std::time::Duration;

/// Configuration for the two-tier cache
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Upper bound on tier-1 entries; oldest entries are evicted past it
    pub max_entries: usize,
    /// Default TTL for tier-1 writes. Tier-1 exists to absorb bursts, so
    /// this is short (minutes).
    pub tier1_ttl: Duration,
    /// Default TTL for tier-2 writes (tens of minutes)
    pub tier2_ttl: Duration,
    /// TTL applied when back-filling tier-1 from a tier-2 hit
    pub backfill_ttl: Duration,
    /// Interval for the background sweep of expired tier-1 entries.
    /// `Duration::ZERO` disables the sweep (expiry is still enforced on read).
    pub sweep_interval: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 2_000,
            tier1_ttl: Duration::from_secs(5 * 60),
            tier2_ttl: Duration::from_secs(30 * 60),
            backfill_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl TieredCacheConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tier-1 entries
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the default tier-1 TTL
    pub fn with_tier1_ttl(mut self, ttl: Duration) -> Self {
        self.tier1_ttl = ttl;
        self
    }

    /// Set the default tier-2 TTL
    pub fn with_tier2_ttl(mut self, ttl: Duration) -> Self {
        self.tier2_ttl = ttl;
        self
    }

    /// Set the TTL used when back-filling tier-1 from tier-2
    pub fn with_backfill_ttl(mut self, ttl: Duration) -> Self {
        self.backfill_ttl = ttl;
        self
    }

    /// Set the background sweep interval (zero disables the sweep)
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be at least 1".to_string());
        }
        if self.tier1_ttl.is_zero() || self.tier2_ttl.is_zero() {
            return Err("tier TTLs must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Configuration for the request orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum retry count after the initial attempt
    pub max_retries: u32,
    /// Base unit for exponential backoff; delay before retry `n` is
    /// `2^n * base` (capped)
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay
    pub max_backoff: Duration,
    /// Jitter factor in `0.0..=1.0` added to each backoff. Zero keeps delays
    /// exact.
    pub jitter_factor: f64,
    /// Per-attempt deadline; elapse counts as a retryable failure
    pub timeout: Duration,
    /// How long a batch queue collects callers before flushing
    pub batch_flush_delay: Duration,
    /// Default TTL for cache population of successful reads
    pub default_cache_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            jitter_factor: 0.0,
            timeout: Duration::from_secs(15),
            batch_flush_delay: Duration::from_millis(50),
            default_cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl OrchestratorConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base unit
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the backoff cap
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Set the jitter factor, clamped to `0.0..=1.0`
    pub fn with_jitter_factor(mut self, jitter: f64) -> Self {
        self.jitter_factor = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the batch queue flush delay
    pub fn with_batch_flush_delay(mut self, delay: Duration) -> Self {
        self.batch_flush_delay = delay;
        self
    }

    /// Set the default TTL for cached read responses
    pub fn with_default_cache_ttl(mut self, ttl: Duration) -> Self {
        self.default_cache_ttl = ttl;
        self
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be non-zero".to_string());
        }
        if self.batch_flush_delay.is_zero() {
            return Err("batch_flush_delay must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Concurrency policy table keyed by observed network quality and device
/// class. `Slow` always suspends preloading regardless of device.
#[derive(Debug, Clone)]
pub struct ConcurrencyPolicy {
    /// Slots on a medium-quality connection
    pub medium: usize,
    /// Slots on a fast connection from a mobile device
    pub fast_mobile: usize,
    /// Slots on a fast connection from a desktop device
    pub fast_desktop: usize,
    /// Slots before any network signal has been observed
    pub unknown: usize,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            medium: 2,
            fast_mobile: 2,
            fast_desktop: 6,
            unknown: 3,
        }
    }
}

impl ConcurrencyPolicy {
    /// Resolve the slot budget for the observed conditions.
    ///
    /// Returns 0 for `Slow`, which the scheduler treats as full suspension.
    pub fn slots_for(&self, quality: NetworkQuality, device: DeviceClass) -> usize {
        match (quality, device) {
            (NetworkQuality::Slow, _) => 0,
            (NetworkQuality::Medium, _) => self.medium,
            (NetworkQuality::Fast, DeviceClass::Mobile) => self.fast_mobile,
            (NetworkQuality::Fast, DeviceClass::Desktop) => self.fast_desktop,
        }
    }
}

/// Configuration for the adaptive preloader
#[derive(Debug, Clone)]
pub struct PreloaderConfig {
    /// Scheduler tick interval. Dequeues also happen on enqueue/slot-freed
    /// notifications, so the tick is only a safety net.
    pub tick_interval: Duration,
    /// Retry budget per resource after its first failure
    pub max_retries: u32,
    /// Pause between a failure and its re-enqueue
    pub retry_pause: Duration,
    /// Per-resource-type load deadlines
    pub image_timeout: Duration,
    /// Deadline for stylesheet loads
    pub stylesheet_timeout: Duration,
    /// Deadline for script loads
    pub script_timeout: Duration,
    /// Deadline for font loads
    pub font_timeout: Duration,
    /// Deadline for route existence probes
    pub route_timeout: Duration,
    /// Concurrency slot policy
    pub concurrency: ConcurrencyPolicy,
    /// Cap on recorded page views (oldest dropped past it)
    pub max_page_views: usize,
    /// Cap on recorded interactions (oldest dropped past it)
    pub max_interactions: usize,
    /// Cap on the metrics ring buffer
    pub max_metric_records: usize,
    /// Pages seen strictly more than this many times are preloaded at medium
    /// priority
    pub medium_repetition_threshold: usize,
    /// Pages seen strictly more than this many times are preloaded at high
    /// priority
    pub high_repetition_threshold: usize,
}

impl Default for PreloaderConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            max_retries: 2,
            retry_pause: Duration::from_secs(1),
            image_timeout: Duration::from_secs(10),
            stylesheet_timeout: Duration::from_secs(8),
            script_timeout: Duration::from_secs(8),
            font_timeout: Duration::from_secs(8),
            route_timeout: Duration::from_secs(5),
            concurrency: ConcurrencyPolicy::default(),
            max_page_views: 50,
            max_interactions: 100,
            max_metric_records: 100,
            medium_repetition_threshold: 3,
            high_repetition_threshold: 7,
        }
    }
}

impl PreloaderConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduler tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the per-resource retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the pause between failure and re-enqueue
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Set the concurrency policy table
    pub fn with_concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency = policy;
        self
    }

    /// Set the metrics ring buffer cap
    pub fn with_max_metric_records(mut self, cap: usize) -> Self {
        self.max_metric_records = cap;
        self
    }

    /// Set both repetition thresholds for prediction
    pub fn with_repetition_thresholds(mut self, medium: usize, high: usize) -> Self {
        self.medium_repetition_threshold = medium;
        self.high_repetition_threshold = high;
        self
    }

    /// Load deadline for a resource type
    pub fn timeout_for(&self, resource_type: ResourceType) -> Duration {
        match resource_type {
            ResourceType::Image => self.image_timeout,
            ResourceType::Stylesheet => self.stylesheet_timeout,
            ResourceType::Script => self.script_timeout,
            ResourceType::Font => self.font_timeout,
            ResourceType::Route => self.route_timeout,
        }
    }

    /// Check the configuration for contradictions
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be non-zero".to_string());
        }
        if self.max_metric_records == 0 {
            return Err("max_metric_records must be at least 1".to_string());
        }
        if self.high_repetition_threshold < self.medium_repetition_threshold {
            return Err(
                "high_repetition_threshold must be >= medium_repetition_threshold".to_string(),
            );
        }
        Ok(())
    }
}
