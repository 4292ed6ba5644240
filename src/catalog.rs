// src/catalog.rs

//! C1: `CachingCatalog`, the coherent caching decorator, per spec.md §4.1.
//! This is the core of the crate — everything else (C2–C7) exists to
//! support what happens in here.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheBackend, CacheClient};
use crate::codec;
use crate::config::CachingConfig;
use crate::counter::FunctionCounter;
use crate::dircursor::DirectoryCursor;
use crate::errors::{CatalogError, CatalogResult};
use crate::keyscheme;
use crate::model::acl::{Mode, check_permissions, sticky_bit_allows};
use crate::model::stat::S_IFMT;
use crate::model::{Acl, ExtendedStat, ListingState, Replica, SecurityContext};
use crate::pathutil;

/// The decorated interface (spec.md §1: "the backing inode store and the
/// non-cached catalog implementation"), consumed behind `CachingCatalog`.
/// A caller assembling the decorator chain implements this once over
/// whatever authoritative store it has and hands the implementation to
/// `CachingCatalog::new`.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Opaque per-open-directory delegate state — an iterator position,
    /// typically. Only ever touched through `open_dir`/`read_dirx`/`close_dir`.
    type DirHandle: Send;

    async fn extended_stat(&self, path: &str, follow_symlink: bool) -> CatalogResult<ExtendedStat>;
    async fn extended_stat_by_rfn(&self, rfn: &str) -> CatalogResult<ExtendedStat>;
    /// Inode-to-path walk, needed to derive `RPLI(path)` when a replica
    /// mutation only carries a file id (spec.md §4.1 `updateReplica`).
    async fn path_for_inode(&self, ino: u64) -> CatalogResult<String>;
    async fn read_link(&self, path: &str) -> CatalogResult<String>;
    async fn symlink(&self, target: &str, link_path: &str) -> CatalogResult<()>;
    async fn create(&self, path: &str, mode: u32) -> CatalogResult<()>;
    async fn unlink(&self, path: &str) -> CatalogResult<()>;
    async fn make_dir(&self, path: &str, mode: u32) -> CatalogResult<()>;
    async fn remove_dir(&self, path: &str) -> CatalogResult<()>;
    async fn rename(&self, old_path: &str, new_path: &str) -> CatalogResult<()>;
    async fn set_mode(&self, path: &str, mode: u32) -> CatalogResult<()>;
    async fn set_owner(&self, path: &str, uid: u32, gid: u32) -> CatalogResult<()>;
    async fn set_guid(&self, path: &str, guid: &str) -> CatalogResult<()>;
    async fn set_acl(&self, path: &str, acl: Acl) -> CatalogResult<()>;
    async fn utime(&self, path: &str, atime: i64, mtime: i64) -> CatalogResult<()>;
    async fn update_xattrs(&self, path: &str, updates: BTreeMap<String, String>) -> CatalogResult<()>;
    async fn set_size(&self, path: &str, size: u64) -> CatalogResult<()>;
    async fn set_checksum(&self, path: &str, algo: &str, value: &str) -> CatalogResult<()>;
    async fn set_comment(&self, path: &str, comment: &str) -> CatalogResult<()>;
    async fn get_comment(&self, path: &str) -> CatalogResult<String>;

    async fn open_dir(&self, path: &str) -> CatalogResult<Self::DirHandle>;
    async fn read_dirx(&self, handle: &mut Self::DirHandle) -> CatalogResult<Option<ExtendedStat>>;
    async fn close_dir(&self, handle: Self::DirHandle) -> CatalogResult<()>;

    async fn get_replica(&self, rfn: &str) -> CatalogResult<Replica>;
    async fn get_replicas(&self, path: &str) -> CatalogResult<Vec<Replica>>;
    async fn add_replica(&self, replica: &Replica) -> CatalogResult<()>;
    async fn update_replica(&self, replica: &Replica) -> CatalogResult<()>;
    async fn delete_replica(&self, replica: &Replica) -> CatalogResult<()>;
}

/// The coherent caching decorator. Generic over the delegate (`D`) and the
/// cache backend (`B`) so the decorator chain composes by wrapping
/// (`CachingCatalog<SomeOtherCatalog, MemcachedClient>`) rather than by a
/// class hierarchy, per REDESIGN FLAGS (spec.md §9).
pub struct CachingCatalog<D: Catalog, B: CacheBackend> {
    delegate: D,
    cache: CacheClient<B>,
    config: CachingConfig,
    counter: FunctionCounter,
    /// Process-local (per-instance) current working directory, per
    /// spec.md §4.1 `changeDir`. Not shared across instances — matching
    /// the original's per-client session state, not a process singleton
    /// (spec.md §9: "forbid singletons").
    cwd: Mutex<String>,
}

impl<D: Catalog, B: CacheBackend> CachingCatalog<D, B> {
    pub fn new(delegate: D, cache: CacheClient<B>, config: CachingConfig) -> Self {
        let counter = FunctionCounter::new(config.function_counter_enabled, config.function_counter_log_frequency);
        Self {
            delegate,
            cache,
            config,
            counter,
            cwd: Mutex::new("/".to_string()),
        }
    }

    pub fn config(&self) -> &CachingConfig {
        &self.config
    }

    pub(crate) fn delegate(&self) -> &D {
        &self.delegate
    }

    pub(crate) fn cache(&self) -> &CacheClient<B> {
        &self.cache
    }

    pub(crate) fn counter(&self) -> &FunctionCounter {
        &self.counter
    }

    pub fn cwd(&self) -> String {
        self.cwd.lock().clone()
    }

    /// Process-wide hit/miss snapshot from the optional C7 instrumentation.
    /// Always `(0, 0)` when `function_counter_enabled` is off.
    pub fn function_counter_snapshot(&self) -> (u64, u64) {
        self.counter.snapshot()
    }

    fn normalize_path(&self, path: &str) -> String {
        let cwd = self.cwd.lock().clone();
        pathutil::normalize(&cwd, path)
    }

    fn reconcile_checksum(&self, stat: &mut ExtendedStat) {
        if stat.reconcile_checksum() {
            debug!(path = %stat.name, "checksum xattr/legacy pair diverged at read time, xattr wins");
        }
    }

    /// The single-key read-through path: cache hit decodes and returns;
    /// miss consults the delegate and caches the result with the
    /// configured TTL. Used directly by non-POSIX resolution and by every
    /// per-component lookup in POSIX resolution.
    pub(crate) async fn stat_direct(&self, path: &str, follow_symlink: bool) -> CatalogResult<ExtendedStat> {
        let key = keyscheme::stat_key(path);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(mut stat) = codec::decode::<ExtendedStat>(&bytes)
        {
            self.counter.record_hit("extended_stat");
            self.reconcile_checksum(&mut stat);
            return Ok(stat);
        }
        self.counter.record_miss("extended_stat");
        let mut stat = self.delegate.extended_stat(path, follow_symlink).await?;
        self.reconcile_checksum(&mut stat);
        self.cache.safe_set(&key, codec::encode(&stat), self.config.expiration).await;
        Ok(stat)
    }

    /// Dispatches to POSIX (per-hop, permission-checked) or non-POSIX
    /// (single cache lookup) path resolution, per spec.md §4.1. The choice
    /// is fixed at construction time (`CachingConfig::posix_mode`), never
    /// branched on a per-call basis.
    async fn resolve(&self, normalized_path: &str, follow_symlink: bool, ctx: &SecurityContext) -> CatalogResult<ExtendedStat> {
        if self.config.posix_mode {
            self.resolve_posix(normalized_path, follow_symlink, ctx).await
        } else {
            let mut stat = self.stat_direct(normalized_path, follow_symlink).await?;
            stat.norm_path = Some(normalized_path.to_string());
            Ok(stat)
        }
    }

    async fn resolve_posix(&self, normalized_path: &str, follow_symlink: bool, ctx: &SecurityContext) -> CatalogResult<ExtendedStat> {
        fn split_deque(s: &str) -> VecDeque<String> {
            s.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect()
        }

        let mut remaining = split_deque(normalized_path);
        let mut current_path = String::from("/");
        let mut hops: u32 = 0;

        loop {
            let Some(component) = remaining.pop_front() else {
                let mut stat = self.stat_direct(&current_path, true).await?;
                stat.norm_path = Some(current_path);
                return Ok(stat);
            };
            let next_path = pathutil::join_child(&current_path, &component);
            let is_last = remaining.is_empty();
            let mut stat = self.stat_direct(&next_path, false).await?;

            if stat.is_symlink() && (!is_last || follow_symlink) {
                hops += 1;
                if hops > self.config.symlink_limit {
                    return Err(CatalogError::LinkLoopExceeded { limit: self.config.symlink_limit });
                }
                let target = self.delegate.read_link(&next_path).await?;
                let mut next_remaining = if target.starts_with('/') {
                    current_path = "/".to_string();
                    split_deque(&target)
                } else {
                    split_deque(&target)
                };
                next_remaining.extend(remaining.drain(..));
                remaining = next_remaining;
                continue;
            }

            if is_last {
                stat.norm_path = Some(next_path);
                return Ok(stat);
            }

            if !stat.is_dir() {
                return Err(CatalogError::NotADirectory(next_path));
            }
            check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::EXEC)
                .map_err(|_| CatalogError::PermissionDenied(next_path.clone()))?;
            current_path = next_path;
        }
    }

    fn require_owner_or_root(&self, ctx: &SecurityContext, stat: &ExtendedStat, path: &str) -> CatalogResult<()> {
        if ctx.user.uid == 0 || ctx.user.uid == stat.uid {
            Ok(())
        } else {
            Err(CatalogError::PermissionDenied(path.to_string()))
        }
    }

    async fn stat_for_mutation(&self, normalized: &str, ctx: &SecurityContext) -> CatalogResult<ExtendedStat> {
        self.resolve(normalized, false, ctx).await
    }

    async fn invalidate_entry(&self, path: &str, is_dir: bool) {
        self.cache.safe_delete(&keyscheme::stat_key(path)).await;
        if is_dir {
            self.cache.safe_delete(&keyscheme::dir_listing_key(path)).await;
            self.cache.safe_delete(&keyscheme::dir_token_key(path)).await;
        }
    }

    /// The Δ a new child under `parent` always produces: spec.md's
    /// `create`/`makeDir` rows invalidate `STAT(parent)`, `DIR_LIST(parent)`,
    /// `DIR(parent)`; `symlink`'s row is worded as "only... wiped by any
    /// parent-mutating op", which this crate reads as "apply the same Δ",
    /// since a symlink creation is exactly such an op (decision recorded in
    /// DESIGN.md).
    async fn invalidate_parent_entry_added(&self, parent: &str) {
        self.invalidate_entry(parent, true).await;
    }

    async fn invalidate_size_ancestors(&self, path: &str) {
        if self.config.size_reporting_depth == 0 {
            return;
        }
        for ancestor in pathutil::ancestors(path, self.config.size_reporting_depth) {
            self.cache.safe_delete(&keyscheme::stat_key(&ancestor)).await;
        }
    }

    // ---- public catalog operations (spec.md §4.1) -------------------------

    pub async fn change_dir(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.resolve(&normalized, true, ctx).await?;
        if !stat.is_dir() {
            return Err(CatalogError::NotADirectory(normalized));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        *self.cwd.lock() = normalized;
        Ok(())
    }

    pub async fn extended_stat(&self, path: &str, follow_symlink: bool, ctx: &SecurityContext) -> CatalogResult<ExtendedStat> {
        let normalized = self.normalize_path(path);
        self.resolve(&normalized, follow_symlink, ctx).await
    }

    /// Shares the `STAT` key kind with path-keyed entries, addressed by RFN
    /// instead of path — spec.md §3 explicitly allows this ("a STAT entry
    /// may be addressed by path under different access modes").
    pub async fn extended_stat_by_rfn(&self, rfn: &str) -> CatalogResult<ExtendedStat> {
        let key = keyscheme::stat_key(rfn);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(mut stat) = codec::decode::<ExtendedStat>(&bytes)
        {
            self.reconcile_checksum(&mut stat);
            return Ok(stat);
        }
        let mut stat = self.delegate.extended_stat_by_rfn(rfn).await?;
        self.reconcile_checksum(&mut stat);
        self.cache.safe_set(&key, codec::encode(&stat), self.config.expiration).await;
        Ok(stat)
    }

    pub async fn access(&self, path: &str, required: Mode, ctx: &SecurityContext) -> CatalogResult<bool> {
        let normalized = self.normalize_path(path);
        match self.resolve(&normalized, true, ctx).await {
            Ok(stat) => Ok(check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, required).is_ok()),
            Err(CatalogError::PermissionDenied(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn read_link(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<String> {
        let normalized = self.normalize_path(path);
        let stat = self.resolve(&normalized, false, ctx).await?;
        if !stat.is_symlink() {
            return Err(CatalogError::InvalidArgument(format!("{normalized} is not a symbolic link")));
        }
        self.delegate.read_link(&normalized).await
    }

    pub async fn symlink(&self, target: &str, link_path: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let link_normalized = self.normalize_path(link_path);
        let parent = pathutil::parent_of(&link_normalized);
        let parent_stat = self.resolve(&parent, true, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), parent_stat.uid, parent_stat.gid, parent_stat.mode, &parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(parent.clone()))?;
        if self.resolve(&link_normalized, false, ctx).await.is_ok() {
            return Err(CatalogError::AlreadyExists(link_normalized));
        }
        self.delegate.symlink(target, &link_normalized).await?;
        self.invalidate_parent_entry_added(&parent).await;
        Ok(())
    }

    pub async fn create(&self, path: &str, mode: u32, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let parent = pathutil::parent_of(&normalized);
        let parent_stat = self.resolve(&parent, true, ctx).await?;
        if !parent_stat.is_dir() {
            return Err(CatalogError::NotADirectory(parent));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), parent_stat.uid, parent_stat.gid, parent_stat.mode, &parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(parent.clone()))?;
        if let Ok(existing) = self.resolve(&normalized, false, ctx).await {
            return Err(if existing.is_dir() {
                CatalogError::IsADirectory(normalized)
            } else {
                CatalogError::AlreadyExists(normalized)
            });
        }
        self.delegate.create(&normalized, mode).await?;
        self.invalidate_parent_entry_added(&parent).await;
        Ok(())
    }

    pub async fn unlink(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let parent = pathutil::parent_of(&normalized);
        let parent_stat = self.resolve(&parent, true, ctx).await?;
        let target_stat = self.resolve(&normalized, false, ctx).await?;
        if target_stat.is_dir() {
            return Err(CatalogError::IsADirectory(normalized));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), parent_stat.uid, parent_stat.gid, parent_stat.mode, &parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(parent.clone()))?;
        if !sticky_bit_allows(ctx.user.uid, parent_stat.mode, parent_stat.uid, target_stat.uid) {
            return Err(CatalogError::PermissionDenied(normalized));
        }
        self.delegate.unlink(&normalized).await?;
        self.cache.safe_delete(&keyscheme::stat_key(&normalized)).await;
        self.cache.safe_delete(&keyscheme::replica_list_key(&normalized)).await;
        self.invalidate_parent_entry_added(&parent).await;
        Ok(())
    }

    pub async fn make_dir(&self, path: &str, mode: u32, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let parent = pathutil::parent_of(&normalized);
        let parent_stat = self.resolve(&parent, true, ctx).await?;
        if !parent_stat.is_dir() {
            return Err(CatalogError::NotADirectory(parent));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), parent_stat.uid, parent_stat.gid, parent_stat.mode, &parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(parent.clone()))?;
        if self.resolve(&normalized, false, ctx).await.is_ok() {
            return Err(CatalogError::AlreadyExists(normalized));
        }
        self.delegate.make_dir(&normalized, mode).await?;
        self.invalidate_parent_entry_added(&parent).await;
        Ok(())
    }

    pub async fn remove_dir(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        if normalized == "/" {
            return Err(CatalogError::InvalidArgument("cannot remove the root directory".into()));
        }
        if normalized == self.cwd() {
            return Err(CatalogError::InvalidArgument("cannot remove the current working directory".into()));
        }
        let parent = pathutil::parent_of(&normalized);
        let parent_stat = self.resolve(&parent, true, ctx).await?;
        let target_stat = self.resolve(&normalized, false, ctx).await?;
        if !target_stat.is_dir() {
            return Err(CatalogError::NotADirectory(normalized));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), parent_stat.uid, parent_stat.gid, parent_stat.mode, &parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(parent.clone()))?;
        if !sticky_bit_allows(ctx.user.uid, parent_stat.mode, parent_stat.uid, target_stat.uid) {
            return Err(CatalogError::PermissionDenied(normalized.clone()));
        }
        self.delegate.remove_dir(&normalized).await?;
        self.invalidate_entry(&normalized, true).await;
        self.invalidate_parent_entry_added(&parent).await;
        Ok(())
    }

    pub async fn rename(&self, old_path: &str, new_path: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let old_normalized = self.normalize_path(old_path);
        let new_normalized = self.normalize_path(new_path);
        if old_normalized == "/" || old_normalized == self.cwd() {
            return Err(CatalogError::InvalidArgument("cannot rename the root or the current working directory".into()));
        }
        if new_normalized == old_normalized || new_normalized.starts_with(&format!("{old_normalized}/")) {
            return Err(CatalogError::InvalidArgument("destination is the source or a descendant of it".into()));
        }

        let old_parent = pathutil::parent_of(&old_normalized);
        let new_parent = pathutil::parent_of(&new_normalized);
        let old_parent_stat = self.resolve(&old_parent, true, ctx).await?;
        let new_parent_stat = self.resolve(&new_parent, true, ctx).await?;
        let source_stat = self.resolve(&old_normalized, false, ctx).await?;

        check_permissions(ctx.user.uid, &ctx.gids(), old_parent_stat.uid, old_parent_stat.gid, old_parent_stat.mode, &old_parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(old_parent.clone()))?;
        check_permissions(ctx.user.uid, &ctx.gids(), new_parent_stat.uid, new_parent_stat.gid, new_parent_stat.mode, &new_parent_stat.acl, Mode::WRITE | Mode::EXEC)
            .map_err(|_| CatalogError::PermissionDenied(new_parent.clone()))?;
        if !sticky_bit_allows(ctx.user.uid, old_parent_stat.mode, old_parent_stat.uid, source_stat.uid) {
            return Err(CatalogError::PermissionDenied(old_normalized.clone()));
        }

        if let Ok(dest_stat) = self.resolve(&new_normalized, false, ctx).await
            && dest_stat.is_dir() != source_stat.is_dir()
        {
            return Err(if dest_stat.is_dir() {
                CatalogError::IsADirectory(new_normalized)
            } else {
                CatalogError::NotADirectory(new_normalized)
            });
        }

        self.delegate.rename(&old_normalized, &new_normalized).await?;

        let mut keys = vec![
            keyscheme::stat_key(&old_normalized),
            keyscheme::replica_list_key(&old_normalized),
            keyscheme::stat_key(&old_parent),
            keyscheme::dir_token_key(&old_parent),
            keyscheme::dir_listing_key(&old_parent),
            keyscheme::stat_key(&new_parent),
            keyscheme::dir_token_key(&new_parent),
            keyscheme::dir_listing_key(&new_parent),
            // An overwritten destination (spec.md §4.1 `rename`'s Δ covers
            // "both parents and both entries") must not leave its own stale
            // STAT/RPLI behind.
            keyscheme::stat_key(&new_normalized),
            keyscheme::replica_list_key(&new_normalized),
        ];
        if source_stat.is_dir() {
            keys.push(keyscheme::dir_token_key(&old_normalized));
            keys.push(keyscheme::dir_listing_key(&old_normalized));
        }
        self.cache.safe_delete_all(&keys).await;
        Ok(())
    }

    pub async fn set_mode(&self, path: &str, mode: u32, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        self.require_owner_or_root(ctx, &stat, &normalized)?;
        // S_IFMT is preserved through all mutations (spec.md §3 invariant c).
        let new_mode = (stat.mode & S_IFMT) | (mode & !S_IFMT);
        self.delegate.set_mode(&normalized, new_mode).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn set_owner(&self, path: &str, uid: u32, gid: u32, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        self.require_owner_or_root(ctx, &stat, &normalized)?;
        self.delegate.set_owner(&normalized, uid, gid).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn set_guid(&self, path: &str, guid: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        self.require_owner_or_root(ctx, &stat, &normalized)?;
        self.delegate.set_guid(&normalized, guid).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn set_acl(&self, path: &str, acl: Acl, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        self.require_owner_or_root(ctx, &stat, &normalized)?;
        self.delegate.set_acl(&normalized, acl).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn utime(&self, path: &str, atime: i64, mtime: i64, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        if ctx.user.uid != 0 && ctx.user.uid != stat.uid {
            check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
                .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        }
        self.delegate.utime(&normalized, atime, mtime).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn update_xattrs(&self, path: &str, updates: BTreeMap<String, String>, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        self.delegate.update_xattrs(&normalized, updates).await?;
        self.invalidate_entry(&normalized, stat.is_dir()).await;
        Ok(())
    }

    pub async fn set_size(&self, path: &str, size: u64, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        self.delegate.set_size(&normalized, size).await?;
        self.cache.safe_delete(&keyscheme::stat_key(&normalized)).await;
        self.invalidate_size_ancestors(&normalized).await;
        Ok(())
    }

    pub async fn set_checksum(&self, path: &str, algo: &str, value: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        self.delegate.set_checksum(&normalized, algo, value).await?;
        self.cache.safe_delete(&keyscheme::stat_key(&normalized)).await;
        Ok(())
    }

    pub async fn set_comment(&self, path: &str, comment: &str, ctx: &SecurityContext) -> CatalogResult<()> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        self.delegate.set_comment(&normalized, comment).await?;
        self.cache.safe_delete(&keyscheme::comment_key(&normalized)).await;
        Ok(())
    }

    pub async fn get_comment(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<String> {
        let normalized = self.normalize_path(path);
        let stat = self.stat_for_mutation(&normalized, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::READ)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        let key = keyscheme::comment_key(&normalized);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(comment) = codec::decode::<String>(&bytes)
        {
            return Ok(comment);
        }
        let comment = self.delegate.get_comment(&normalized).await?;
        self.cache.safe_set(&key, codec::encode(&comment), self.config.expiration).await;
        Ok(comment)
    }

    pub async fn open_dir(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<DirectoryCursor<'_, D, B>> {
        let normalized = self.normalize_path(path);
        let stat = self.resolve(&normalized, true, ctx).await?;
        if !stat.is_dir() {
            return Err(CatalogError::NotADirectory(normalized));
        }
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::READ)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;

        let drli_key = keyscheme::dir_listing_key(&normalized);
        if let Some(bytes) = self.cache.safe_get(&drli_key).await {
            let listing = codec::decode_directory_listing(&bytes);
            if listing.state == ListingState::Valid {
                return Ok(DirectoryCursor::replay(self, normalized, listing.names));
            }
        }

        let dir_token_key = keyscheme::dir_token_key(&normalized);
        match self.cache.checked_add(&dir_token_key, vec![1], self.config.expiration).await {
            Ok(()) => {
                let handle = self.delegate.open_dir(&normalized).await?;
                Ok(DirectoryCursor::populate_and_publish(self, normalized, handle))
            }
            Err(_) => {
                // Either genuine contention (another process holds the
                // token) or the cache is unreachable — both fall back to
                // uncached enumeration, satisfying "an unavailable cache
                // service must not break correctness, only performance"
                // (spec.md §1).
                let handle = self.delegate.open_dir(&normalized).await?;
                Ok(DirectoryCursor::uncached(self, normalized, handle))
            }
        }
    }

    pub async fn get_replica_by_rfn(&self, rfn: &str) -> CatalogResult<Replica> {
        let key = keyscheme::replica_key(rfn);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(replica) = codec::decode::<Replica>(&bytes)
        {
            return Ok(replica);
        }
        let replica = self.delegate.get_replica(rfn).await?;
        self.cache.safe_set(&key, codec::encode(&replica), self.config.expiration).await;
        Ok(replica)
    }

    pub async fn get_replicas(&self, path: &str, ctx: &SecurityContext) -> CatalogResult<Vec<Replica>> {
        let normalized = self.normalize_path(path);
        let stat = self.resolve(&normalized, true, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::READ)
            .map_err(|_| CatalogError::PermissionDenied(normalized.clone()))?;
        let key = keyscheme::replica_list_key(&normalized);
        if let Some(bytes) = self.cache.safe_get(&key).await
            && let Some(list) = codec::decode::<Vec<Replica>>(&bytes)
        {
            return Ok(list);
        }
        let list = self.delegate.get_replicas(&normalized).await?;
        self.cache.safe_set(&key, codec::encode(&list), self.config.expiration).await;
        Ok(list)
    }

    pub async fn add_replica(&self, replica: &Replica, ctx: &SecurityContext) -> CatalogResult<()> {
        let path = self.delegate.path_for_inode(replica.file_id).await?;
        let stat = self.resolve(&path, true, ctx).await?;
        check_permissions(ctx.user.uid, &ctx.gids(), stat.uid, stat.gid, stat.mode, &stat.acl, Mode::WRITE)
            .map_err(|_| CatalogError::PermissionDenied(path.clone()))?;
        self.delegate.add_replica(replica).await?;
        self.cache.safe_delete(&keyscheme::stat_key(&path)).await;
        self.cache.safe_delete(&keyscheme::replica_key(&replica.rfn)).await;
        self.cache.safe_delete(&keyscheme::replica_list_key(&path)).await;
        Ok(())
    }

    pub async fn delete_replica(&self, replica: &Replica) -> CatalogResult<()> {
        self.delegate.delete_replica(replica).await?;
        self.cache.safe_delete(&keyscheme::replica_key(&replica.rfn)).await;
        if let Ok(path) = self.delegate.path_for_inode(replica.file_id).await {
            self.cache.safe_delete(&keyscheme::replica_list_key(&path)).await;
        }
        Ok(())
    }

    pub async fn update_replica(&self, replica: &Replica) -> CatalogResult<()> {
        self.delegate.update_replica(replica).await?;
        self.cache.safe_delete(&keyscheme::replica_key(&replica.rfn)).await;
        if let Ok(path) = self.delegate.path_for_inode(replica.file_id).await {
            self.cache.safe_delete(&keyscheme::replica_list_key(&path)).await;
        }
        Ok(())
    }
}
