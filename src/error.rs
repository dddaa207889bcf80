//! Error types for the request/resource optimization layer

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the request orchestrator.
///
/// Cloneable by design: deduplicated callers and batched callers all receive
/// the settled outcome of a single underlying call, so the error must be
/// fan-out friendly. Transport errors are captured by message rather than by
/// wrapping `reqwest::Error`, which is not `Clone`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, TLS, broken body stream)
    #[error("network error: {0}")]
    Network(String),

    /// The per-attempt deadline elapsed before the transport responded
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-2xx response after retries were exhausted (or a non-retryable status)
    #[error("HTTP error: status {status}")]
    Http {
        /// HTTP status code of the final response
        status: u16,
    },

    /// One item of a combined batch call failed while its siblings succeeded
    #[error("batch item {id} failed: {reason}")]
    BatchPartialFailure {
        /// Identifier of the failed sub-request
        id: String,
        /// Why this slice of the batch response could not be delivered
        reason: String,
    },

    /// Response body could not be decoded as expected
    #[error("invalid response body: {0}")]
    InvalidBody(String),

    /// The in-flight request this caller joined was dropped without settling
    #[error("deduplicated request was abandoned before settling")]
    Abandoned,

    /// Invalid orchestrator or transport configuration (construction-time only)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl FetchError {
    /// Whether the orchestrator may transparently retry after this error.
    ///
    /// HTTP 4xx other than 429 is a terminal answer from the server; retrying
    /// would not change it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status } => *status >= 500 || *status == 429,
            Self::BatchPartialFailure { .. }
            | Self::InvalidBody(_)
            | Self::Abandoned
            | Self::InvalidConfiguration(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Errors from cache operations.
///
/// Tier-2 (remote) failures never propagate to request callers; the tiered
/// cache swallows them and degrades to tier-1-only operation. This type is
/// what `RemoteTier` implementations report and what the typed serialization
/// surface returns.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Remote cache service is unreachable or not configured
    #[error("remote cache unavailable: {0}")]
    Unavailable(String),

    /// Value could not be serialized for storage
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be deserialized into the requested type
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid cache configuration
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors from speculative resource loads.
///
/// Never thrown to `preload_*` callers; terminal failures are recorded in
/// metrics and the failed set instead. Cloneable so the same outcome can be
/// broadcast to event subscribers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreloadError {
    /// Transport-level failure while fetching the resource
    #[error("preload transport error: {0}")]
    Transport(String),

    /// The per-resource-type deadline elapsed
    #[error("preload timed out")]
    Timeout,

    /// Existence probe or asset fetch returned a failing status
    #[error("preload probe failed: status {status}")]
    Probe {
        /// HTTP status code returned by the probe
        status: u16,
    },

    /// Invalid preloader configuration (construction-time only)
    #[error("invalid preloader configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for PreloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Result alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
