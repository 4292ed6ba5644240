// src/cache/memcached_protocol.rs

//! The real [`CacheBackend`]: the memcached ASCII protocol spoken over a
//! pool of TCP connections. Binary protocol is named in `CachingConfig` as
//! an accepted configuration value (spec.md §6 `MemcachedProtocol`) but not
//! implemented — see DESIGN.md for the rationale. Connection pooling
//! follows the `deadpool::managed` pattern, one pool per configured server,
//! mirroring the teacher's scoped-acquisition discipline
//! (`core/storage/db/locking.rs`'s `MutexGuard`-per-shard) generalized from
//! an in-process lock to a network connection checkout.

use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::{Manager, Metrics, Object, Pool, RecycleResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::{CacheBackend, CacheError, CacheResult};
use crate::config::{CachingConfig, HashDistribution, MemcachedServer};

struct ConnManager {
    addr: String,
}

#[async_trait]
impl Manager for ConnManager {
    type Type = BufReader<TcpStream>;
    type Error = std::io::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(BufReader::new(stream))
    }

    async fn recycle(&self, _conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        // The ASCII protocol is request/response with no persistent state
        // beyond the TCP stream itself; a connection is healthy as long as
        // the stream hasn't errored, which `create` would have already
        // surfaced. Nothing to reset between checkouts.
        Ok(())
    }
}

type ConnPool = Pool<ConnManager>;

struct Shard {
    server: MemcachedServer,
    pool: ConnPool,
}

/// A pooled client over one or more memcached-ASCII-protocol servers,
/// distributing keys per `CachingConfig::hash_distribution` (spec.md §6
/// `MemcachedHashDistribution`). Neither distribution strategy affects
/// correctness (spec.md §4.3): each key always maps to exactly one shard,
/// consistently, for the lifetime of this client.
pub struct MemcachedClient {
    shards: Vec<Shard>,
    distribution: HashDistribution,
}

impl MemcachedClient {
    pub fn new(config: &CachingConfig) -> anyhow::Result<Self> {
        if config.memcached_servers.is_empty() {
            anyhow::bail!("MemcachedClient requires at least one MemcachedServer");
        }
        let shards = config
            .memcached_servers
            .iter()
            .map(|server| {
                let addr = format!("{}:{}", server.host, server.port);
                let manager = ConnManager { addr };
                let pool = Pool::builder(manager).max_size(config.pool_size).build()?;
                Ok(Shard {
                    server: server.clone(),
                    pool,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            shards,
            distribution: config.hash_distribution,
        })
    }

    fn shard_for(&self, key: &str) -> &Shard {
        if self.shards.len() == 1 {
            return &self.shards[0];
        }
        let hash = fnv1a(key.as_bytes());
        match self.distribution {
            HashDistribution::Default => &self.shards[(hash as usize) % self.shards.len()],
            HashDistribution::Consistent => {
                // A weight-proportional ring selection. Not a full ketama
                // implementation (that would need a point-ring per server
                // persisted across resizes); adequate for a fixed server
                // set, which is the only case spec.md's static
                // `MemcachedServer = host[:port][/weight]` config supports.
                let total_weight: u64 = self.shards.iter().map(|s| s.server.weight as u64).sum();
                let mut point = hash % total_weight.max(1);
                self.shards
                    .iter()
                    .find(|s| {
                        if point < s.server.weight as u64 {
                            true
                        } else {
                            point -= s.server.weight as u64;
                            false
                        }
                    })
                    .unwrap_or(&self.shards[0])
            }
        }
    }

    async fn checkout(&self, shard: &Shard) -> CacheResult<Object<ConnManager>> {
        shard
            .pool
            .get()
            .await
            .map_err(|e| CacheError::Transient(format!("connection pool: {e}")))
    }

    async fn read_line(conn: &mut BufReader<TcpStream>) -> CacheResult<String> {
        let mut line = String::new();
        conn.read_line(&mut line)
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        if line.is_empty() {
            return Err(CacheError::Transient("connection closed by peer".into()));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Issues a storage command (`set`/`add`/`append`) and interprets the
    /// single-line reply.
    async fn storage_command(
        &self,
        command: &str,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> CacheResult<()> {
        let shard = self.shard_for(key);
        let mut conn = self.checkout(shard).await?;
        let header = format!(
            "{command} {key} 0 {} {}\r\n",
            ttl.as_secs().min(u32::MAX as u64),
            value.len()
        );
        conn.write_all(header.as_bytes())
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        conn.write_all(value)
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        conn.write_all(b"\r\n")
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        let reply = Self::read_line(&mut conn).await?;
        match reply.as_str() {
            "STORED" => Ok(()),
            "NOT_STORED" => Err(CacheError::NotStored),
            other => Err(CacheError::Fatal(format!("unexpected reply to {command}: {other}"))),
        }
    }
}

#[async_trait]
impl CacheBackend for MemcachedClient {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let results = self.mget(std::slice::from_ref(&key.to_string())).await?;
        Ok(results.into_iter().next().flatten())
    }

    async fn mget(&self, keys: &[String]) -> CacheResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        // All requested keys must land on the same shard for a single
        // pipelined `get`; callers (KeyScheme-derived keys never span
        // shards intentionally) pass batches that do in practice, but we
        // degrade to per-key `get` calls if they don't, for correctness.
        let shard_of = |k: &str| self.shard_for(k) as *const Shard;
        let first_shard = shard_of(&keys[0]);
        if !keys.iter().all(|k| shard_of(k) == first_shard) {
            let mut out = Vec::with_capacity(keys.len());
            for k in keys {
                out.push(self.get(k).await?);
            }
            return Ok(out);
        }

        let shard = self.shard_for(&keys[0]);
        let mut conn = self.checkout(shard).await?;
        let command = format!("get {}\r\n", keys.join(" "));
        conn.write_all(command.as_bytes())
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;

        let mut found: std::collections::HashMap<String, Vec<u8>> = std::collections::HashMap::new();
        loop {
            let line = Self::read_line(&mut conn).await?;
            if line == "END" {
                break;
            }
            let mut parts = line.splitn(4, ' ');
            let tag = parts.next().unwrap_or_default();
            if tag != "VALUE" {
                return Err(CacheError::Fatal(format!("unexpected reply to get: {line}")));
            }
            let found_key = parts
                .next()
                .ok_or_else(|| CacheError::Fatal("malformed VALUE line".into()))?;
            let _flags = parts.next();
            let nbytes: usize = parts
                .next()
                .ok_or_else(|| CacheError::Fatal("malformed VALUE line".into()))?
                .parse()
                .map_err(|_| CacheError::Fatal("non-numeric byte count in VALUE line".into()))?;
            let mut buf = vec![0u8; nbytes + 2]; // trailing CRLF
            tokio::io::AsyncReadExt::read_exact(&mut conn, &mut buf)
                .await
                .map_err(|e| CacheError::Transient(e.to_string()))?;
            buf.truncate(nbytes);
            found.insert(found_key.to_string(), buf);
        }
        Ok(keys.iter().map(|k| found.remove(k)).collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.storage_command("set", key, &value, ttl).await
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        self.storage_command("add", key, &value, ttl).await
    }

    async fn append(&self, key: &str, value: Vec<u8>) -> CacheResult<()> {
        self.storage_command("append", key, &value, Duration::ZERO)
            .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let shard = self.shard_for(key);
        let mut conn = self.checkout(shard).await?;
        conn.write_all(format!("delete {key}\r\n").as_bytes())
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        match Self::read_line(&mut conn).await?.as_str() {
            "DELETED" => Ok(()),
            "NOT_FOUND" => Err(CacheError::NotFound),
            other => Err(CacheError::Fatal(format!("unexpected reply to delete: {other}"))),
        }
    }

    async fn increment(&self, key: &str, delta: u64) -> CacheResult<u64> {
        let shard = self.shard_for(key);
        let mut conn = self.checkout(shard).await?;
        conn.write_all(format!("incr {key} {delta}\r\n").as_bytes())
            .await
            .map_err(|e| CacheError::Transient(e.to_string()))?;
        let reply = Self::read_line(&mut conn).await?;
        if reply == "NOT_FOUND" {
            return Err(CacheError::NotFound);
        }
        reply
            .parse::<u64>()
            .map_err(|_| CacheError::Fatal(format!("unexpected reply to incr: {reply}")))
    }
}

/// FNV-1a, used only to pick a shard. No cryptographic property is needed —
/// KeyScheme (C5) already governs cache-key collision handling.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic() {
        assert_eq!(fnv1a(b"/a/b/c"), fnv1a(b"/a/b/c"));
        assert_ne!(fnv1a(b"/a/b/c"), fnv1a(b"/a/b/d"));
    }
}
