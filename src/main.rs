// src/main.rs

//! A thin demonstration binary: load configuration, set up logging, wire a
//! `CachingCatalog` over an in-memory delegate and a real memcached
//! backend, and exercise a handful of operations. Not a server — there is
//! no network-facing protocol in scope (spec.md §1's Non-goals); this
//! exists so the caching layer can be driven end-to-end outside of tests.

use anyhow::Result;
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

use cachecat::cache::MemcachedClient;
use cachecat::model::{Credentials, GroupInfo, SecurityContext, UserInfo};
use cachecat::{CacheClient, CachingCatalog, CachingConfig, InMemoryCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("cachecat version {VERSION}");
        return Ok(());
    }

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config = match config_path {
        Some(path) => match CachingConfig::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e}");
                std::process::exit(1);
            }
        },
        None => CachingConfig::default(),
    };

    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = run_demo(config).await {
        error!("demo run failed: {e}");
        return Err(e);
    }

    Ok(())
}

/// Exercises the caching layer end-to-end against an in-memory delegate.
/// If the configured memcached servers are unreachable, every cache
/// operation degrades to a miss/no-op and the demo still completes
/// correctly — this is the "cache-outage degradation" property
/// (SPEC_FULL.md §8) visible at the command line rather than in a test
/// harness.
async fn run_demo(config: CachingConfig) -> Result<()> {
    info!(?config.memcached_servers, posix_mode = config.posix_mode, "starting cachecat demo");

    let backend = MemcachedClient::new(&config)?;
    let cache = CacheClient::new(backend);
    let delegate = InMemoryCatalog::new();
    let catalog = CachingCatalog::new(delegate, cache, config);

    let root_ctx = SecurityContext {
        credentials: Credentials {
            client_name: "demo".into(),
            remote_address: "127.0.0.1".into(),
        },
        user: UserInfo { uid: 0, name: "root".into() },
        groups: vec![GroupInfo { gid: 0, name: "root".into() }],
    };

    catalog.make_dir("/demo", 0o755, &root_ctx).await?;
    catalog.create("/demo/readme.txt", 0o644, &root_ctx).await?;
    catalog.set_comment("/demo/readme.txt", "created by the cachecat demo", &root_ctx).await?;

    let stat = catalog.extended_stat("/demo/readme.txt", false, &root_ctx).await?;
    info!(ino = stat.ino, mode = format_args!("{:o}", stat.mode), "stat of /demo/readme.txt");

    let mut cursor = catalog.open_dir("/demo", &root_ctx).await?;
    let mut names = Vec::new();
    while let Some(entry) = cursor.next().await? {
        names.push(entry.name);
    }
    cursor.close(true).await?;
    info!(?names, "listing of /demo");

    Ok(())
}
