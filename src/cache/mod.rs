// src/cache/mod.rs

//! C3: the thin wrapper over the external key-value service, per
//! spec.md §4.3.

pub mod client;
pub mod fake;
pub mod memcached_protocol;

pub use client::CacheClient;
pub use fake::FakeCacheBackend;
pub use memcached_protocol::MemcachedClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// The result partition of spec.md §6: "success, not-found, not-stored,
/// transient, fatal". `CacheClient`'s checked API surfaces these directly;
/// its safe API collapses all of them to `None`/`false`/unit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("key not found")]
    NotFound,
    #[error("not stored (key already exists, or precondition failed)")]
    NotStored,
    #[error("transient cache error: {0}")]
    Transient(String),
    #[error("fatal cache error: {0}")]
    Fatal(String),
}

impl CacheError {
    /// Read paths swallow everything; invalidation paths still swallow but
    /// log, per spec.md §7's propagation policy. Nothing routes a
    /// `CacheError` to the catalog caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Transient(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// The key-value protocol the caching catalog consumes from the cache
/// service (spec.md §6): `get`, `set`, `add` (create-if-absent), `append`,
/// `delete`, `increment`, bulk `mget`.
///
/// Implemented by [`MemcachedClient`] (the real memcached-ASCII-protocol
/// client) and by [`FakeCacheBackend`] (an in-memory test double), so the
/// catalog is generic over `B: CacheBackend` and never depends on the wire
/// protocol directly.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;
    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
    /// Atomic create-if-absent. Returns `Err(CacheError::NotStored)` if the
    /// key already exists — this is the DIR coordination token's
    /// single-builder primitive (spec.md §5).
    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;
    async fn append(&self, key: &str, value: Vec<u8>) -> CacheResult<()>;
    async fn delete(&self, key: &str) -> CacheResult<()>;
    async fn increment(&self, key: &str, delta: u64) -> CacheResult<u64>;
}
