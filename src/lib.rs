//! Client-side fetch optimization: tiered caching, request orchestration
//! and adaptive preloading
//!
//! This crate bundles three cooperating layers that sit between an
//! application and its backing HTTP services:
//!
//! - [`TieredCache`] — a two-tier read-through/write-through cache. Tier 1
//!   is an in-process store with TTL expiry and FIFO capacity eviction;
//!   tier 2 is any shared store implementing [`RemoteTier`]. Reads check
//!   tier 1 first and back-fill it on a tier-2 hit; tier-2 writes are
//!   fire-and-forget so callers never block on the shared store.
//! - [`Orchestrator`] — request dispatch with in-flight deduplication,
//!   retry with exponential backoff, per-attempt timeouts, read-through
//!   caching of successful GETs, and opt-in batching that coalesces
//!   same-endpoint id lookups into one combined request.
//! - [`Preloader`] — a priority scheduler for speculative resource loads
//!   with a concurrency budget that adapts to observed network quality and
//!   device class, behavioral route prediction, and a bounded metrics ring.
//!
//! Each layer is usable on its own; the orchestrator optionally wraps a
//! [`TieredCache`], and the preloader fetches through whatever
//! [`ResourceLoader`] it is given.
//!
//! # Example
//!
//! ```no_run
//! use storefront_fetch::{
//!     HttpTransport, Orchestrator, OrchestratorConfig, RequestOptions, TieredCache,
//!     TieredCacheConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = Arc::new(TieredCache::new(TieredCacheConfig::default())?);
//! let orchestrator = Orchestrator::new(
//!     Arc::new(HttpTransport::new()?),
//!     cache,
//!     OrchestratorConfig::default(),
//! )?;
//!
//! let response = orchestrator
//!     .get("https://api.example.com/products", &[], &RequestOptions::default())
//!     .await?;
//! println!("cached: {}", response.from_cache);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod behavior;
pub mod config;
pub mod error;
pub mod key;
pub mod loader;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod preloader;
pub mod remote;
pub mod stats;
pub mod tiered;
pub mod transport;

pub use batch::BatchRequest;
pub use config::{ConcurrencyPolicy, OrchestratorConfig, PreloaderConfig, TieredCacheConfig};
pub use error::{CacheError, CacheResult, FetchError, PreloadError};
pub use loader::{HttpResourceLoader, LoadOutcome, ResourceLoader, ResourceType};
pub use metrics::{PreloadMetrics, PreloadRecord};
pub use orchestrator::{FetchOutcome, FetchResponse, Orchestrator, RequestOptions};
pub use preloader::{
    DeviceClass, NetworkQuality, PreloadEvent, PreloadOptions, PreloadOutcome, Preloader, Priority,
};
pub use remote::{InMemoryRemote, RemoteTier};
pub use stats::{CacheStats, OrchestratorStats};
pub use tiered::TieredCache;
pub use transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};
