//! Request orchestrator: dedup, read-through caching, retry with backoff
//!
//! All outbound traffic funnels through [`Orchestrator::dispatch`]:
//!
//! 1. cacheable reads consult the tiered cache (a hit makes no network call
//!    and creates no pending entry),
//! 2. the pending-request map collapses identical concurrent requests into
//!    one network call whose settled result is broadcast to every joiner,
//! 3. the leader executes with per-attempt timeouts and exponential backoff,
//!    and populates the cache on success.
//!
//! The pending map bounds *duplicate* work only. Callers issuing unbounded
//! concurrent distinct-key requests will issue unbounded concurrent network
//! calls; backpressure is deliberately not this component's job.

use crate::config::OrchestratorConfig;
use crate::error::FetchError;
use crate::key::request_key;
use crate::stats::{OrchestratorCounters, OrchestratorStats};
use crate::tiered::TieredCache;
use crate::transport::{Method, Transport, TransportRequest};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

/// Settled outcome of a logical request, shared verbatim with dedup joiners
pub type FetchOutcome = Result<FetchResponse, FetchError>;

pub(crate) type PendingMap = DashMap<String, broadcast::Sender<FetchOutcome>>;

/// Response handed to orchestrator callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status (200 for cache hits)
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// True when the body was served from the tiered cache with no network
    /// call
    pub from_cache: bool,
}

impl FetchResponse {
    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::InvalidBody(e.to_string()))
    }
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Opt a read out of cache consultation and population
    pub skip_cache: bool,
    /// TTL for cache population, falling back to the config default
    pub ttl: Option<Duration>,
    /// Override the configured retry budget for this call
    pub max_retries: Option<u32>,
    /// Override the configured per-attempt timeout for this call
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options that bypass the cache
    pub fn no_cache() -> Self {
        Self {
            skip_cache: true,
            ..Self::default()
        }
    }

    /// Options with a specific cache TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }
}

/// Removes the pending entry when the leader settles, on every exit path.
struct PendingGuard<'a> {
    map: &'a PendingMap,
    key: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

/// Orchestrates outbound requests for the rest of the application.
///
/// Cheap to clone; clones share the transport, cache, pending map, batch
/// queues and counters.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: Arc<TieredCache>,
    pub(crate) pending: Arc<PendingMap>,
    pub(crate) batches: Arc<crate::batch::BatchQueues>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) counters: Arc<OrchestratorCounters>,
}

impl Orchestrator {
    /// Create an orchestrator over a transport and cache
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<TieredCache>,
        config: OrchestratorConfig,
    ) -> Result<Self, FetchError> {
        config
            .validate()
            .map_err(FetchError::InvalidConfiguration)?;

        Ok(Self {
            transport,
            cache,
            pending: Arc::new(DashMap::new()),
            batches: Arc::new(crate::batch::BatchQueues::new()),
            config,
            counters: Arc::new(OrchestratorCounters::default()),
        })
    }

    /// Cacheable, deduplicated read
    pub async fn get(
        &self,
        url: &str,
        params: &[(&str, &str)],
        options: &RequestOptions,
    ) -> FetchOutcome {
        let request = TransportRequest::new(Method::Get, url).with_params(
            params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        self.dispatch(request, options).await
    }

    /// JSON write
    pub async fn post(
        &self,
        url: &str,
        body: serde_json::Value,
        options: &RequestOptions,
    ) -> FetchOutcome {
        self.dispatch(
            TransportRequest::new(Method::Post, url).with_body(body),
            options,
        )
        .await
    }

    /// JSON replace
    pub async fn put(
        &self,
        url: &str,
        body: serde_json::Value,
        options: &RequestOptions,
    ) -> FetchOutcome {
        self.dispatch(
            TransportRequest::new(Method::Put, url).with_body(body),
            options,
        )
        .await
    }

    /// Delete
    pub async fn delete(&self, url: &str, options: &RequestOptions) -> FetchOutcome {
        self.dispatch(TransportRequest::new(Method::Delete, url), options)
            .await
    }

    /// Invalidate cached reads matching a glob pattern (tier-2 guarantee
    /// only; see [`TieredCache::invalidate_pattern`])
    pub async fn invalidate_cache(&self, pattern: &str) -> usize {
        self.cache.invalidate_pattern(pattern).await
    }

    /// Snapshot orchestrator activity
    pub fn stats(&self) -> OrchestratorStats {
        self.counters.snapshot()
    }

    /// Full pipeline for one logical request: cache, dedup, retry.
    pub(crate) async fn dispatch(
        &self,
        request: TransportRequest,
        options: &RequestOptions,
    ) -> FetchOutcome {
        self.counters.record_request();

        let param_refs: Vec<(&str, &str)> = request
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let key = request_key(request.method, &request.url, &param_refs, request.body.as_ref());

        let cacheable = request.method == Method::Get && !options.skip_cache;
        if cacheable {
            if let Some(body) = self.cache.get_raw(&key).await {
                self.counters.record_cache_hit();
                trace!(key = %key, "served from cache");
                return Ok(FetchResponse {
                    status: 200,
                    body,
                    from_cache: true,
                });
            }
        }

        // Join-or-lead. No await between the vacancy check and the insert,
        // so at most one pending entry exists per key.
        let leader_tx = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let mut rx = entry.get().subscribe();
                drop(entry);
                self.counters.record_dedup_join();
                trace!(key = %key, "joined in-flight request");
                return match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FetchError::Abandoned),
                };
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx.clone());
                tx
            }
        };

        // Pending entry is gone before joiners could observe a settled result
        // without a sender, and before the cache write makes a fresh request
        // redundant.
        let outcome = {
            let _guard = PendingGuard {
                map: &self.pending,
                key: &key,
            };
            self.execute_with_retry(&request, options).await
        };

        if cacheable {
            if let Ok(response) = &outcome {
                self.cache
                    .set_raw(&key, response.body.clone(), options.ttl.or(Some(self.config.default_cache_ttl)));
            }
        }

        // Joiners that subscribed before the guard dropped still hold live
        // receivers; send can only fail when nobody joined.
        let _ = leader_tx.send(outcome.clone());
        outcome
    }

    /// Execute one request with per-attempt timeout and exponential backoff.
    /// Only the final failure propagates; retries are visible to callers as
    /// latency only.
    pub(crate) async fn execute_with_retry(
        &self,
        request: &TransportRequest,
        options: &RequestOptions,
    ) -> FetchOutcome {
        let max_retries = options.max_retries.unwrap_or(self.config.max_retries);
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = self.backoff_for(attempt);
                debug!(
                    url = %request.url,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after backoff"
                );
                sleep(backoff).await;
            }

            self.counters.record_attempt();
            trace!(method = %request.method, url = %request.url, attempt, "dispatching");

            let error = match tokio::time::timeout(timeout, self.transport.execute(request)).await
            {
                Ok(Ok(response)) if (200..300).contains(&response.status) => {
                    return Ok(FetchResponse {
                        status: response.status,
                        body: response.body,
                        from_cache: false,
                    });
                }
                Ok(Ok(response)) => FetchError::Http {
                    status: response.status,
                },
                Ok(Err(e)) => e,
                Err(_elapsed) => FetchError::Timeout(timeout),
            };

            if error.is_retryable() && attempt < max_retries {
                warn!(url = %request.url, attempt, error = %error, "attempt failed, will retry");
                self.counters.record_retry();
                last_error = Some(error);
            } else {
                self.counters.record_failure();
                return Err(error);
            }
        }

        self.counters.record_failure();
        Err(last_error.unwrap_or_else(|| FetchError::Network("retries exhausted".to_string())))
    }

    /// Delay before retry attempt `n`: `2^n * base`, capped, plus optional
    /// jitter.
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_millis() as f64;
        let exponential = base * 2f64.powi(attempt as i32);
        let capped = exponential.min(self.config.max_backoff.as_millis() as f64);

        let jitter_range = capped * self.config.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::random::<f64>() * 2.0 * jitter_range - jitter_range
        } else {
            0.0
        };

        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TieredCacheConfig;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn execute(
            &self,
            _request: &TransportRequest,
        ) -> Result<TransportResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from_static(b"[1]"),
            })
        }
    }

    fn orchestrator(transport: Arc<dyn Transport>) -> Orchestrator {
        let cache = Arc::new(
            TieredCache::new(TieredCacheConfig::new().with_sweep_interval(Duration::ZERO))
                .unwrap(),
        );
        Orchestrator::new(transport, cache, OrchestratorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn successful_read_populates_cache() {
        let transport = Arc::new(FixedTransport {
            calls: AtomicU32::new(0),
        });
        let orch = orchestrator(transport.clone());

        let first = orch
            .get("/api/products", &[("cat", "shoes")], &RequestOptions::default())
            .await
            .unwrap();
        assert!(!first.from_cache);

        let second = orch
            .get("/api/products", &[("cat", "shoes")], &RequestOptions::default())
            .await
            .unwrap();
        assert!(second.from_cache);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn skip_cache_always_dispatches() {
        let transport = Arc::new(FixedTransport {
            calls: AtomicU32::new(0),
        });
        let orch = orchestrator(transport.clone());
        let options = RequestOptions::no_cache();

        orch.get("/api/cart", &[], &options).await.unwrap();
        orch.get("/api/cart", &[], &options).await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn backoff_is_exponential_without_jitter() {
        let orch = orchestrator(Arc::new(FixedTransport {
            calls: AtomicU32::new(0),
        }));
        let d1 = orch.backoff_for(1);
        let d2 = orch.backoff_for(2);
        let d3 = orch.backoff_for(3);
        assert_eq!(d1, Duration::from_millis(200));
        assert_eq!(d2, Duration::from_millis(400));
        assert_eq!(d3, Duration::from_millis(800));
    }

    #[tokio::test]
    async fn backoff_is_capped() {
        let cache = Arc::new(
            TieredCache::new(TieredCacheConfig::new().with_sweep_interval(Duration::ZERO))
                .unwrap(),
        );
        let orch = Orchestrator::new(
            Arc::new(FixedTransport {
                calls: AtomicU32::new(0),
            }),
            cache,
            OrchestratorConfig::new().with_max_backoff(Duration::from_millis(300)),
        )
        .unwrap();
        assert_eq!(orch.backoff_for(10), Duration::from_millis(300));
    }
}
