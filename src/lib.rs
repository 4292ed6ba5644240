// src/lib.rs

//! `cachecat`: a coherent memcached-backed caching layer in front of a
//! pluggable POSIX-like namespace catalog.
//!
//! The decorator chain is the crate's spine:
//!
//! - [`catalog::CachingCatalog`] wraps a [`catalog::Catalog`] delegate (the
//!   backing inode store) and a [`cache::CacheBackend`], giving coherent
//!   reads/writes with Δ-invalidation on every mutation.
//! - [`dircursor::DirectoryCursor`] is the per-open-directory state machine
//!   behind `CachingCatalog::open_dir`.
//! - [`poolmgr::PoolManagerCacheShim`] is a sibling decorator over pool and
//!   replica-location metadata.
//! - [`counter::FunctionCounter`] is the optional hit/miss instrumentation
//!   both decorators can be wired up with.
//!
//! [`memcatalog::InMemoryCatalog`] is a demonstration/test `Catalog`
//! delegate; it is not part of the caching layer itself.

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod counter;
pub mod dircursor;
pub mod errors;
pub mod keyscheme;
pub mod memcatalog;
pub mod model;
pub mod pathutil;
pub mod poolmgr;

pub use cache::{CacheBackend, CacheClient, CacheError, FakeCacheBackend, MemcachedClient};
pub use catalog::{CachingCatalog, Catalog};
pub use config::CachingConfig;
pub use counter::FunctionCounter;
pub use dircursor::DirectoryCursor;
pub use errors::{CatalogError, CatalogResult};
pub use memcatalog::InMemoryCatalog;
pub use poolmgr::{PoolManager, PoolManagerCacheShim, ReadLocationCaching, StaticPoolManager};
