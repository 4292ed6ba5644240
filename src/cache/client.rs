// src/cache/client.rs

//! C3: the thin wrapper the catalog actually calls. [`CacheBackend`] is the
//! raw protocol seam (memcached-ASCII or the in-memory test double);
//! `CacheClient` adds the checked/safe split spec.md §4.3 describes: "The
//! core uses checked variants for correctness-critical adds (DIR tokens)
//! and safe variants everywhere else."

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{CacheBackend, CacheError, CacheResult};
use crate::keyscheme::CacheKey;

/// Cheaply cloneable handle over a [`CacheBackend`]. `CachingCatalog` and
/// `PoolManagerCacheShim` both hold one of these rather than the backend
/// directly, so neither needs to know whether the backend is pooled.
pub struct CacheClient<B: CacheBackend> {
    backend: Arc<B>,
}

impl<B: CacheBackend> Clone for CacheClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: CacheBackend> CacheClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<B>) -> Self {
        Self { backend }
    }

    // ---- checked API: raises the underlying CacheError -------------------

    pub async fn checked_get(&self, key: &CacheKey) -> CacheResult<Option<Vec<u8>>> {
        self.backend.get(key.as_str()).await
    }

    pub async fn checked_add(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.backend.add(key.as_str(), value, ttl).await
    }

    pub async fn checked_set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.backend.set(key.as_str(), value, ttl).await
    }

    pub async fn checked_delete(&self, key: &CacheKey) -> CacheResult<()> {
        self.backend.delete(key.as_str()).await
    }

    // ---- safe API: never returns an Err, logs on invalidation paths ------

    /// Read path: a cache-unavailable condition is a plain miss, per
    /// spec.md §7 ("cache-unavailable is swallowed" on reads). No logging —
    /// an unreachable cache is expected to be noisy enough at the backend
    /// level already, and every miss here falls through to the delegate.
    pub async fn safe_get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        self.backend.get(key.as_str()).await.ok().flatten()
    }

    pub async fn safe_mget(&self, keys: &[CacheKey]) -> Vec<Option<Vec<u8>>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let owned: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        self.backend
            .mget(&owned)
            .await
            .unwrap_or_else(|_| vec![None; keys.len()])
    }

    /// Write path: swallowed but logged, per spec.md §7 ("logged on
    /// write-invalidation"). A `set` failure only affects future hit rate;
    /// the authoritative copy was already written through the delegate.
    pub async fn safe_set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) {
        if let Err(e) = self.backend.set(key.as_str(), value, ttl).await {
            warn!(key = %key, error = %e, "cache set failed, entry will be re-fetched on next read");
        }
    }

    pub async fn safe_append(&self, key: &CacheKey, value: Vec<u8>) -> bool {
        match self.backend.append(key.as_str(), value).await {
            Ok(()) => true,
            Err(CacheError::NotStored) => false,
            Err(e) => {
                warn!(key = %key, error = %e, "cache append failed");
                false
            }
        }
    }

    /// Invalidation: this is the core's write side on every mutation's Δ
    /// set (spec.md §4.1). `not-found` is not an error here — deleting an
    /// absent key is a no-op success, not a failure to log.
    pub async fn safe_delete(&self, key: &CacheKey) {
        match self.backend.delete(key.as_str()).await {
            Ok(()) | Err(CacheError::NotFound) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "cache invalidation failed, stale entry will expire by TTL");
            }
        }
    }

    pub async fn safe_delete_all(&self, keys: &[CacheKey]) {
        for key in keys {
            self.safe_delete(key).await;
        }
    }

    pub async fn safe_increment(&self, key: &CacheKey, delta: u64) -> Option<u64> {
        match self.backend.increment(key.as_str(), delta).await {
            Ok(v) => Some(v),
            Err(CacheError::NotFound) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache increment failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeCacheBackend;
    use crate::keyscheme::stat_key;
    use std::time::Duration;

    #[tokio::test]
    async fn safe_get_is_miss_on_outage() {
        let backend = FakeCacheBackend::new();
        backend.set_always_transient(true);
        let client = CacheClient::new(backend);
        let key = stat_key("/a");
        assert_eq!(client.safe_get(&key).await, None);
    }

    #[tokio::test]
    async fn checked_add_surfaces_not_stored_on_contention() {
        let client = CacheClient::new(FakeCacheBackend::new());
        let key = stat_key("/dir");
        client
            .checked_add(&key, b"first".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        let err = client
            .checked_add(&key, b"second".to_vec(), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::NotStored);
    }

    #[tokio::test]
    async fn safe_delete_of_absent_key_does_not_error() {
        let client = CacheClient::new(FakeCacheBackend::new());
        client.safe_delete(&stat_key("/never-set")).await;
    }
}
