// src/dircursor.rs

//! C2: `DirectoryCursor`, the per-open-directory state machine behind
//! `CachingCatalog::open_dir`, per spec.md §4.2.
//!
//! Three modes, chosen once at `open_dir` time and never re-evaluated
//! mid-enumeration:
//! - `Replay` — DRLI was `Valid`; hand back the cached name list.
//! - `PopulateAndPublish` — this caller won the DIR token race; it is the
//!   single builder and publishes DRLI on a clean, complete close.
//! - `Uncached` — DRLI was absent/invalid and the token add lost (either
//!   to contention or to a cache outage); enumerate straight from the
//!   delegate with no cache interaction at all.

use tracing::warn;

use crate::cache::CacheBackend;
use crate::catalog::{CachingCatalog, Catalog};
use crate::codec;
use crate::errors::CatalogResult;
use crate::keyscheme;
use crate::model::{DirectoryListing, ExtendedStat, ListingState};
use crate::pathutil;

enum Mode<D: Catalog> {
    Replay {
        names: Vec<String>,
        index: usize,
    },
    PopulateAndPublish {
        handle: D::DirHandle,
        accum: Vec<String>,
        /// Running byte estimate of the accumulated listing, checked
        /// against `dir_listing_size_ceiling_bytes` (spec.md §4.2: "a
        /// listing that grows past the configured ceiling is abandoned,
        /// not truncated — it becomes `Invalid`, not partially `Valid`").
        accum_bytes: usize,
    },
    Uncached {
        handle: D::DirHandle,
    },
}

pub struct DirectoryCursor<'a, D: Catalog, B: CacheBackend> {
    catalog: &'a CachingCatalog<D, B>,
    path: String,
    mode: Mode<D>,
}

impl<'a, D: Catalog, B: CacheBackend> DirectoryCursor<'a, D, B> {
    pub(crate) fn replay(catalog: &'a CachingCatalog<D, B>, path: String, names: Vec<String>) -> Self {
        Self {
            catalog,
            path,
            mode: Mode::Replay { names, index: 0 },
        }
    }

    pub(crate) fn populate_and_publish(catalog: &'a CachingCatalog<D, B>, path: String, handle: D::DirHandle) -> Self {
        Self {
            catalog,
            path,
            mode: Mode::PopulateAndPublish {
                handle,
                accum: Vec::new(),
                accum_bytes: 0,
            },
        }
    }

    pub(crate) fn uncached(catalog: &'a CachingCatalog<D, B>, path: String, handle: D::DirHandle) -> Self {
        Self {
            catalog,
            path,
            mode: Mode::Uncached { handle },
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the next entry's `ExtendedStat`, or `None` at end of stream.
    /// Per-entry stats are themselves cached/read-through via the same
    /// `STAT` key every other lookup uses (spec.md §4.2: "each entry's
    /// `ExtendedStat` is read through the ordinary single-key cache path").
    pub async fn next(&mut self) -> CatalogResult<Option<ExtendedStat>> {
        match &mut self.mode {
            Mode::Replay { names, index } => {
                let Some(name) = names.get(*index).cloned() else {
                    return Ok(None);
                };
                *index += 1;
                let child_path = pathutil::join_child(&self.path, &name);
                let stat = self.catalog.stat_direct(&child_path, false).await?;
                Ok(Some(stat))
            }
            Mode::PopulateAndPublish { handle, accum, accum_bytes } => {
                let Some(stat) = self.catalog.delegate().read_dirx(handle).await? else {
                    return Ok(None);
                };
                accum.push(stat.name.clone());
                *accum_bytes += stat.name.len() + 1;
                let child_path = pathutil::join_child(&self.path, &stat.name);
                let key = keyscheme::stat_key(&child_path);
                self.catalog
                    .cache()
                    .safe_set(&key, codec::encode(&stat), self.catalog.config().expiration)
                    .await;
                Ok(Some(stat))
            }
            Mode::Uncached { handle } => self.catalog.delegate().read_dirx(handle).await,
        }
    }

    /// Ends the enumeration. A `PopulateAndPublish` cursor that reaches
    /// this point having enumerated everything (no early abandonment)
    /// publishes DRLI as `Valid`; one that exceeded the size ceiling, or is
    /// closed early, publishes `Invalid` instead so the next `open_dir`
    /// retries rather than trusting a partial list (spec.md §4.2). There
    /// is no async `Drop`, so callers must call this explicitly — an
    /// unclosed cursor simply leaves the DIR token to expire by its own
    /// TTL and DRLI absent, which is safe but costs the next opener a
    /// rebuild.
    pub async fn close(self, fully_enumerated: bool) -> CatalogResult<()> {
        match self.mode {
            Mode::Replay { .. } => Ok(()),
            Mode::Uncached { handle } => self.catalog.delegate().close_dir(handle).await,
            Mode::PopulateAndPublish { handle, accum, accum_bytes } => {
                self.catalog.delegate().close_dir(handle).await?;
                let ceiling = self.catalog.config().dir_listing_size_ceiling_bytes;
                let drli_key = keyscheme::dir_listing_key(&self.path);
                let listing = if fully_enumerated && accum_bytes <= ceiling {
                    DirectoryListing {
                        state: ListingState::Valid,
                        names: accum,
                    }
                } else {
                    if !fully_enumerated {
                        warn!(path = %self.path, "directory enumeration closed early, publishing DRLI as invalid");
                    } else {
                        warn!(path = %self.path, bytes = accum_bytes, ceiling, "directory listing exceeded size ceiling, publishing DRLI as invalid");
                    }
                    DirectoryListing {
                        state: ListingState::Invalid,
                        names: Vec::new(),
                    }
                };
                self.catalog
                    .cache()
                    .safe_set(&drli_key, codec::encode(&listing), self.catalog.config().expiration)
                    .await;
                // The coordination token's job is done; let it expire
                // naturally rather than deleting it, matching spec.md §4.2
                // ("a crashed or aborted builder's token simply expires by
                // TTL; this implementation does not distinguish a clean
                // close from that case").
                Ok(())
            }
        }
    }
}
