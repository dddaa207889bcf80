//! Shared tier-2 cache service contract
//!
//! The remote tier is a collaborator, not something this crate implements
//! against a specific service. [`RemoteTier`] captures the contract the
//! tiered cache needs; [`InMemoryRemote`] is a process-local implementation
//! for tests and single-process deployments.

use crate::error::{CacheError, CacheResult};
use crate::key::glob_match;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Contract for the shared remote cache service.
///
/// Every method may fail with [`CacheError::Unavailable`]; the tiered cache
/// swallows those failures and degrades to tier-1-only operation, so
/// implementations should report errors honestly rather than retrying
/// internally.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Fetch a value, `None` on miss
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Store a value with a TTL
    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()>;

    /// Delete an exact key
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// List keys matching a glob pattern (`*` wildcard)
    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Delete a set of keys
    async fn delete_many(&self, keys: &[String]) -> CacheResult<()>;
}

#[derive(Debug, Clone)]
struct RemoteEntry {
    value: Bytes,
    expires_at: Instant,
}

/// Process-local [`RemoteTier`] backed by a `DashMap`.
///
/// Honors TTLs and glob matching like a real shared store would, minus the
/// network. Useful for tests and for deployments that have not configured a
/// shared cache yet.
#[derive(Default)]
pub struct InMemoryRemote {
    storage: DashMap<String, RemoteEntry>,
}

impl InMemoryRemote {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry count, expired entries included until next access
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl RemoteTier for InMemoryRemote {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        match self.storage.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Ok(Some(entry.value.clone())),
            Some(entry) => {
                drop(entry);
                self.storage.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> CacheResult<()> {
        self.storage.insert(
            key.to_string(),
            RemoteEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.storage.remove(key);
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .storage
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.storage.remove(key);
        }
        Ok(())
    }
}

/// A remote tier that always fails. Stands in for an unreachable service in
/// degradation tests.
#[derive(Debug, Default)]
pub struct UnavailableRemote;

#[async_trait]
impl RemoteTier for UnavailableRemote {
    async fn get(&self, _key: &str) -> CacheResult<Option<Bytes>> {
        Err(CacheError::Unavailable("service unreachable".to_string()))
    }

    async fn set_with_ttl(&self, _key: &str, _value: Bytes, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("service unreachable".to_string()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Unavailable("service unreachable".to_string()))
    }

    async fn keys_matching(&self, _pattern: &str) -> CacheResult<Vec<String>> {
        Err(CacheError::Unavailable("service unreachable".to_string()))
    }

    async fn delete_many(&self, _keys: &[String]) -> CacheResult<()> {
        Err(CacheError::Unavailable("service unreachable".to_string()))
    }
}
