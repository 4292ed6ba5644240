// src/config.rs

//! Loads and validates the caching layer's configuration.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Wire protocol spoken to the cache service. Both variants are accepted at
/// the configuration layer; only `Ascii` is implemented by
/// [`crate::cache::MemcachedClient`] (see DESIGN.md for the rationale).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemcachedProtocol {
    #[default]
    Ascii,
    Binary,
}

/// Server-selection distribution strategy. Neither variant changes
/// correctness (§5): a single-server pool is deterministic regardless.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashDistribution {
    #[default]
    Default,
    Consistent,
}

/// One `host[:port][/weight]` cache server entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MemcachedServer {
    pub host: String,
    #[serde(default = "default_memcached_port")]
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_memcached_port() -> u16 {
    11211
}
fn default_weight() -> u32 {
    1
}

impl MemcachedServer {
    /// Parses the `host[:port][/weight]` textual form from spec.md's
    /// `MemcachedServer` config key.
    pub fn parse(raw: &str) -> Result<Self> {
        let (hostport, weight) = match raw.split_once('/') {
            Some((hp, w)) => (
                hp,
                w.parse::<u32>()
                    .with_context(|| format!("invalid MemcachedServer weight in '{raw}'"))?,
            ),
            None => (raw, default_weight()),
        };
        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) => (
                h.to_string(),
                p.parse::<u16>()
                    .with_context(|| format!("invalid MemcachedServer port in '{raw}'"))?,
            ),
            None => (hostport.to_string(), default_memcached_port()),
        };
        if host.is_empty() {
            return Err(anyhow!("MemcachedServer host cannot be empty in '{raw}'"));
        }
        Ok(Self { host, port, weight })
    }
}

fn default_servers() -> Vec<MemcachedServer> {
    vec![MemcachedServer {
        host: "127.0.0.1".to_string(),
        port: default_memcached_port(),
        weight: default_weight(),
    }]
}

/// A raw representation of the config file before validation and
/// range-clamping, mirroring the teacher's `RawConfig`/`Config` split.
#[derive(Deserialize, Debug, Clone)]
struct RawConfig {
    #[serde(default = "default_servers")]
    memcached_server: Vec<MemcachedServer>,
    #[serde(default = "default_expiration_limit")]
    memcached_expiration_limit: u64,
    #[serde(default)]
    memcached_protocol: MemcachedProtocol,
    #[serde(default)]
    memcached_hash_distribution: HashDistribution,
    #[serde(default = "default_posix")]
    memcached_posix: bool,
    #[serde(default = "default_pool_size")]
    memcached_pool_size: usize,
    #[serde(default)]
    memcached_function_counter: bool,
    #[serde(default = "default_counter_log_frequency")]
    memcached_function_counter_log_frequency: u64,
    #[serde(default = "default_symlink_limit")]
    sym_link_limit: u32,
    #[serde(default)]
    local_cache_size: u64,
    #[serde(default)]
    size_reporting_depth: u32,
    #[serde(default = "default_dir_listing_ceiling")]
    dir_listing_size_ceiling_bytes: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_expiration_limit() -> u64 {
    60
}
fn default_posix() -> bool {
    true
}
fn default_pool_size() -> usize {
    8
}
fn default_counter_log_frequency() -> u64 {
    1000
}
fn default_symlink_limit() -> u32 {
    16
}
fn default_dir_listing_ceiling() -> usize {
    1 << 20 // 1 MiB, per the cache service's item size limit.
}
fn default_log_level() -> String {
    "info".to_string()
}

/// The final, validated configuration for the caching catalog, loaded from
/// the keys named in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachingConfig {
    pub memcached_servers: Vec<MemcachedServer>,
    pub expiration: Duration,
    pub protocol: MemcachedProtocol,
    pub hash_distribution: HashDistribution,
    /// Selects the POSIX (per-hop) vs non-POSIX (single lookup) path
    /// resolution mode described in spec.md §4.1. Chosen at construction
    /// time, per REDESIGN FLAGS §9 ("do not branch inside methods when a
    /// constructor-time choice suffices").
    pub posix_mode: bool,
    pub pool_size: usize,
    pub function_counter_enabled: bool,
    pub function_counter_log_frequency: u64,
    pub symlink_limit: u32,
    /// Enables a process-local pre-cache for directory stats. `0` disables
    /// it. Not yet wired to an implementation; reserved per spec.md §6.
    pub local_cache_size: u64,
    /// How many ancestor STAT keys a size-changing mutation also
    /// invalidates. `0` (default) disables ancestor invalidation entirely.
    pub size_reporting_depth: u32,
    pub dir_listing_size_ceiling_bytes: usize,
    pub log_level: String,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            memcached_servers: default_servers(),
            expiration: Duration::from_secs(default_expiration_limit()),
            protocol: MemcachedProtocol::default(),
            hash_distribution: HashDistribution::default(),
            posix_mode: default_posix(),
            pool_size: default_pool_size(),
            function_counter_enabled: false,
            function_counter_log_frequency: default_counter_log_frequency(),
            symlink_limit: default_symlink_limit(),
            local_cache_size: 0,
            size_reporting_depth: 0,
            dir_listing_size_ceiling_bytes: default_dir_listing_ceiling(),
            log_level: default_log_level(),
        }
    }
}

impl CachingConfig {
    /// Creates a new `CachingConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        // "0 < s < 30 days; otherwise default 60" per spec.md §6.
        let thirty_days = 30 * 24 * 60 * 60;
        let expiration_secs = if raw.memcached_expiration_limit == 0
            || raw.memcached_expiration_limit >= thirty_days
        {
            warn!(
                "MemcachedExpirationLimit {} out of range (0, {}), using default 60",
                raw.memcached_expiration_limit, thirty_days
            );
            60
        } else {
            raw.memcached_expiration_limit
        };

        let config = Self {
            memcached_servers: raw.memcached_server,
            expiration: Duration::from_secs(expiration_secs),
            protocol: raw.memcached_protocol,
            hash_distribution: raw.memcached_hash_distribution,
            posix_mode: raw.memcached_posix,
            pool_size: raw.memcached_pool_size,
            function_counter_enabled: raw.memcached_function_counter,
            function_counter_log_frequency: raw.memcached_function_counter_log_frequency,
            symlink_limit: raw.sym_link_limit,
            local_cache_size: raw.local_cache_size,
            size_reporting_depth: raw.size_reporting_depth,
            dir_listing_size_ceiling_bytes: raw.dir_listing_size_ceiling_bytes,
            log_level: raw.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.memcached_servers.is_empty() {
            return Err(anyhow!("at least one MemcachedServer is required"));
        }
        if self.pool_size == 0 {
            return Err(anyhow!("MemcachedPoolSize cannot be 0"));
        }
        if self.dir_listing_size_ceiling_bytes == 0 {
            return Err(anyhow!("dir_listing_size_ceiling_bytes cannot be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_weight() {
        let s = MemcachedServer::parse("cache1.example.com:11212/3").unwrap();
        assert_eq!(s.host, "cache1.example.com");
        assert_eq!(s.port, 11212);
        assert_eq!(s.weight, 3);
    }

    #[test]
    fn parses_host_only() {
        let s = MemcachedServer::parse("cache1.example.com").unwrap();
        assert_eq!(s.host, "cache1.example.com");
        assert_eq!(s.port, 11211);
        assert_eq!(s.weight, 1);
    }

    #[test]
    fn out_of_range_expiration_falls_back_to_default() {
        let raw = RawConfig {
            memcached_server: default_servers(),
            memcached_expiration_limit: 0,
            memcached_protocol: MemcachedProtocol::default(),
            memcached_hash_distribution: HashDistribution::default(),
            memcached_posix: true,
            memcached_pool_size: 4,
            memcached_function_counter: false,
            memcached_function_counter_log_frequency: 1000,
            sym_link_limit: 16,
            local_cache_size: 0,
            size_reporting_depth: 0,
            dir_listing_size_ceiling_bytes: default_dir_listing_ceiling(),
            log_level: default_log_level(),
        };
        let cfg = CachingConfig::from_raw(raw).unwrap();
        assert_eq!(cfg.expiration, Duration::from_secs(60));
    }
}
