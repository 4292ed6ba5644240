// src/model/replica.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a physical replica, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaStatus {
    Available,
    BeingPopulated,
    ToBeDeleted,
}

/// Volatile replicas are scratch copies; permanent replicas are durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaKind {
    Volatile,
    Permanent,
}

/// A physical instance of a file, addressable by RFN. Invariant: at most
/// one cached replica record per RFN (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replica {
    pub replica_id: String,
    pub file_id: u64,
    pub status: ReplicaStatus,
    pub kind: ReplicaKind,
    pub pool: String,
    pub server: String,
    pub filesystem: String,
    pub rfn: String,
    pub nb_accesses: u64,
    pub atime: i64,
    pub ptime: i64,
    pub ltime: i64,
    pub extra: BTreeMap<String, String>,
}

/// The string form of a symlink target, resolved by the path resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymLinkTarget(pub String);
