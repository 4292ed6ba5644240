// src/model/pool.rs

//! Pool, location and chunk entities consumed by
//! [`crate::poolmgr::PoolManagerCacheShim`] (C6), per spec.md §4.6.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Any,
    OnlineOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub pool_type: String,
    pub attrs: BTreeMap<String, String>,
}

/// A URL-like location, typically carrying a short-lived security token
/// (spec.md §4.6: "security tokens embedded in URLs expire quickly").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub url: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub location: Location,
    pub offset: u64,
    pub size: u64,
}
