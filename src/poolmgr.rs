// src/poolmgr.rs

//! C6: `PoolManagerCacheShim`, a sibling decorator to `CachingCatalog` that
//! fronts pool/location metadata rather than the namespace catalog, per
//! spec.md §4.6. Shares the `CacheClient`/codec machinery with C1 but is a
//! separate decorator over a separate delegate trait (`PoolManager`), not a
//! mode of `CachingCatalog`.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheBackend, CacheClient};
use crate::codec;
use crate::errors::{CatalogError, CatalogResult};
use crate::keyscheme::{self, CacheKey};
use crate::model::{Availability, Location, Pool};

/// The pool-manager contract this shim decorates, standing in for "the pool
/// manager, pool driver, and I/O handlers" spec.md §1 declares out of
/// scope.
#[async_trait]
pub trait PoolManager: Send + Sync {
    async fn get_pools(&self, availability: Availability) -> CatalogResult<Vec<Pool>>;
    async fn get_pool(&self, name: &str) -> CatalogResult<Pool>;
    async fn new_pool(&self, pool: Pool) -> CatalogResult<()>;
    async fn update_pool(&self, pool: Pool) -> CatalogResult<()>;
    async fn delete_pool(&self, name: &str) -> CatalogResult<()>;
    async fn where_to_read(&self, path_or_inode: &str) -> CatalogResult<Vec<Location>>;
    async fn where_to_write(&self, path: &str) -> CatalogResult<Location>;
    async fn cancel_write(&self, location: &Location) -> CatalogResult<()>;
}

/// Whether read-location caching is enabled. The default posture is
/// pass-through (spec.md §4.6: "caching is disabled by default" because
/// "security tokens embedded in URLs expire quickly"); an operator opts in
/// explicitly and accepts a TTL short enough that stale tokens aren't
/// handed out past their validity window.
#[derive(Debug, Clone, Copy)]
pub struct ReadLocationCaching {
    pub enabled: bool,
    pub ttl: Duration,
}

impl Default for ReadLocationCaching {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(30),
        }
    }
}

/// Wraps a `PoolManager` delegate. Mutating calls (`new_pool`,
/// `update_pool`, `delete_pool`, `cancel_write`) always pass through
/// untouched — "pool metadata is low-rate and authoritative from the
/// delegate" (spec.md §4.6) — so there is no Δ-invalidation table here,
/// unlike C1.
pub struct PoolManagerCacheShim<P: PoolManager, B: CacheBackend> {
    delegate: P,
    cache: CacheClient<B>,
    read_cache: ReadLocationCaching,
}

impl<P: PoolManager, B: CacheBackend> PoolManagerCacheShim<P, B> {
    pub fn new(delegate: P, cache: CacheClient<B>, read_cache: ReadLocationCaching) -> Self {
        Self {
            delegate,
            cache,
            read_cache,
        }
    }

    fn read_location_key(path_or_inode: &str) -> CacheKey {
        keyscheme::replica_list_key(path_or_inode)
    }
}

#[async_trait]
impl<P: PoolManager, B: CacheBackend> PoolManager for PoolManagerCacheShim<P, B> {
    async fn get_pools(&self, availability: Availability) -> CatalogResult<Vec<Pool>> {
        self.delegate.get_pools(availability).await
    }

    async fn get_pool(&self, name: &str) -> CatalogResult<Pool> {
        self.delegate.get_pool(name).await
    }

    async fn new_pool(&self, pool: Pool) -> CatalogResult<()> {
        self.delegate.new_pool(pool).await
    }

    async fn update_pool(&self, pool: Pool) -> CatalogResult<()> {
        self.delegate.update_pool(pool).await
    }

    async fn delete_pool(&self, name: &str) -> CatalogResult<()> {
        self.delegate.delete_pool(name).await
    }

    async fn where_to_read(&self, path_or_inode: &str) -> CatalogResult<Vec<Location>> {
        if !self.read_cache.enabled {
            return self.delegate.where_to_read(path_or_inode).await;
        }
        let key = Self::read_location_key(path_or_inode);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(locations) = codec::decode::<Vec<Location>>(&bytes)
        {
            return Ok(locations);
        }
        let locations = self.delegate.where_to_read(path_or_inode).await?;
        self.cache
            .safe_set(&key, codec::encode(&locations), self.read_cache.ttl)
            .await;
        Ok(locations)
    }

    async fn where_to_write(&self, path: &str) -> CatalogResult<Location> {
        // Writes always mint a fresh, single-use location; caching a write
        // target would hand out a stale, already-claimed destination.
        self.delegate.where_to_write(path).await
    }

    async fn cancel_write(&self, location: &Location) -> CatalogResult<()> {
        self.delegate.cancel_write(location).await
    }
}

/// An in-memory `PoolManager` used by `main.rs`'s demonstration wiring and
/// by integration tests; not a teacher/production concern, so it carries
/// no caching semantics of its own.
pub struct StaticPoolManager {
    pools: parking_lot::RwLock<Vec<Pool>>,
}

impl StaticPoolManager {
    pub fn new(pools: Vec<Pool>) -> Self {
        Self {
            pools: parking_lot::RwLock::new(pools),
        }
    }
}

#[async_trait]
impl PoolManager for StaticPoolManager {
    async fn get_pools(&self, _availability: Availability) -> CatalogResult<Vec<Pool>> {
        Ok(self.pools.read().clone())
    }

    async fn get_pool(&self, name: &str) -> CatalogResult<Pool> {
        self.pools
            .read()
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    async fn new_pool(&self, pool: Pool) -> CatalogResult<()> {
        let mut pools = self.pools.write();
        if pools.iter().any(|p| p.name == pool.name) {
            return Err(CatalogError::AlreadyExists(pool.name));
        }
        pools.push(pool);
        Ok(())
    }

    async fn update_pool(&self, pool: Pool) -> CatalogResult<()> {
        let mut pools = self.pools.write();
        let existing = pools
            .iter_mut()
            .find(|p| p.name == pool.name)
            .ok_or_else(|| CatalogError::NotFound(pool.name.clone()))?;
        *existing = pool;
        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> CatalogResult<()> {
        let mut pools = self.pools.write();
        let before = pools.len();
        pools.retain(|p| p.name != name);
        if pools.len() == before {
            return Err(CatalogError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn where_to_read(&self, path_or_inode: &str) -> CatalogResult<Vec<Location>> {
        Ok(vec![Location {
            url: format!("sfn://pool/{path_or_inode}?token=demo"),
            available: true,
        }])
    }

    async fn where_to_write(&self, path: &str) -> CatalogResult<Location> {
        Ok(Location {
            url: format!("sfn://pool/{path}?token=write-demo"),
            available: true,
        })
    }

    async fn cancel_write(&self, _location: &Location) -> CatalogResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeCacheBackend;

    fn shim(read_cache: ReadLocationCaching) -> PoolManagerCacheShim<StaticPoolManager, FakeCacheBackend> {
        PoolManagerCacheShim::new(
            StaticPoolManager::new(vec![Pool {
                name: "pool1".into(),
                pool_type: "filesystem".into(),
                attrs: Default::default(),
            }]),
            CacheClient::new(FakeCacheBackend::new()),
            read_cache,
        )
    }

    #[tokio::test]
    async fn read_locations_are_not_cached_by_default() {
        let shim = shim(ReadLocationCaching::default());
        let first = shim.where_to_read("/a/b").await.unwrap();
        let second = shim.where_to_read("/a/b").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn read_locations_cache_when_enabled() {
        let shim = shim(ReadLocationCaching {
            enabled: true,
            ttl: Duration::from_secs(30),
        });
        let first = shim.where_to_read("/a/b").await.unwrap();
        let second = shim.where_to_read("/a/b").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn mutating_calls_pass_through() {
        let shim = shim(ReadLocationCaching::default());
        shim.new_pool(Pool {
            name: "pool2".into(),
            pool_type: "filesystem".into(),
            attrs: Default::default(),
        })
        .await
        .unwrap();
        assert_eq!(shim.get_pool("pool2").await.unwrap().name, "pool2");
    }
}
