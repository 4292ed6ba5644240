// src/model/directory.rs

//! `DirectoryListing` and its state tag, per spec.md §3/§4.1/§4.2.

use serde::{Deserialize, Serialize};

/// The DRLI state tag. Serialized alongside the names so that two
/// processes reading the same cache entry agree on whether the listing is
/// complete (spec.md §4.2: "part of the serialized DRLI value").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingState {
    /// No process has populated the list; the holder of the DIR token has
    /// the exclusive right to build it.
    Missing,
    /// Contention was detected, or the listing exceeded the size ceiling;
    /// fall back to uncached enumeration.
    Invalid,
    /// Complete and authoritative until invalidated.
    Valid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub state: ListingState,
    pub names: Vec<String>,
}

impl Default for DirectoryListing {
    fn default() -> Self {
        Self {
            state: ListingState::Missing,
            names: Vec::new(),
        }
    }
}
