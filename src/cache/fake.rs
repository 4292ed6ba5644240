// src/cache/fake.rs

//! An in-memory [`CacheBackend`] test double. Used by the crate's own unit
//! tests and by `tests/` integration tests; never compiled into a
//! production binary's default path, but not `#[cfg(test)]`-gated either,
//! since `main.rs`'s demonstration wiring and external integration tests
//! both need to name the type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CacheBackend, CacheError, CacheResult};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// A deterministic, process-local stand-in for the memcached-class service,
/// for tests that need one without a real server.
#[derive(Default)]
pub struct FakeCacheBackend {
    store: Mutex<HashMap<String, Entry>>,
    always_transient: AtomicBool,
}

impl FakeCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips every subsequent call into `CacheError::Transient`, simulating
    /// an unreachable cache service for S6 / testable property 7
    /// ("cache-offline liveness").
    pub fn set_always_transient(&self, on: bool) {
        self.always_transient.store(on, Ordering::SeqCst);
    }

    fn outage_check(&self) -> CacheResult<()> {
        if self.always_transient.load(Ordering::SeqCst) {
            Err(CacheError::Transient("simulated cache outage".into()))
        } else {
            Ok(())
        }
    }

    fn expire_locked(store: &mut HashMap<String, Entry>, key: &str) {
        let expired = store.get(key).is_some_and(|e| e.expires_at <= Instant::now());
        if expired {
            store.remove(key);
        }
    }
}

#[async_trait]
impl CacheBackend for FakeCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Self::expire_locked(&mut store, key);
        Ok(store.get(key).map(|e| e.value.clone()))
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Ok(keys
            .iter()
            .map(|k| {
                Self::expire_locked(&mut store, k);
                store.get(k).map(|e| e.value.clone())
            })
            .collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.outage_check()?;
        self.store.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Self::expire_locked(&mut store, key);
        if store.contains_key(key) {
            return Err(CacheError::NotStored);
        }
        store.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn append(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Self::expire_locked(&mut store, key);
        match store.get_mut(key) {
            Some(e) => {
                e.value.extend_from_slice(&value);
                Ok(())
            }
            None => Err(CacheError::NotStored),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Self::expire_locked(&mut store, key);
        match store.remove(key) {
            Some(_) => Ok(()),
            None => Err(CacheError::NotFound),
        }
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<u64> {
        self.outage_check()?;
        let mut store = self.store.lock();
        Self::expire_locked(&mut store, key);
        match store.get_mut(key) {
            Some(e) => {
                let current: u64 = std::str::from_utf8(&e.value)
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0);
                let next = current.wrapping_add(delta);
                e.value = next.to_string().into_bytes();
                Ok(next)
            }
            None => Err(CacheError::NotFound),
        }
    }
}
