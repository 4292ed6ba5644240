// tests/catalog_test.rs

//! End-to-end tests driving `CachingCatalog` over the in-memory delegate
//! and the in-memory fake cache backend, covering the scenarios of
//! SPEC_FULL.md's testable-properties section.

use std::time::Duration;

use cachecat::cache::{CacheClient, FakeCacheBackend};
use cachecat::model::{
    Acl, Credentials, GroupInfo, ReplicaKind, ReplicaStatus, SecurityContext, UserInfo,
};
use cachecat::{CachingCatalog, CachingConfig, CatalogError, InMemoryCatalog};

fn ctx(uid: u32) -> SecurityContext {
    SecurityContext {
        credentials: Credentials {
            client_name: "test".into(),
            remote_address: "127.0.0.1".into(),
        },
        user: UserInfo { uid, name: format!("u{uid}") },
        groups: vec![GroupInfo { gid: uid, name: format!("g{uid}") }],
    }
}

fn root_ctx() -> SecurityContext {
    ctx(0)
}

type TestCatalog = CachingCatalog<InMemoryCatalog, FakeCacheBackend>;

fn new_catalog() -> TestCatalog {
    new_catalog_with(CachingConfig::default())
}

fn new_catalog_with(config: CachingConfig) -> TestCatalog {
    CachingCatalog::new(InMemoryCatalog::new(), CacheClient::new(FakeCacheBackend::new()), config)
}

// S1: create then stat.
#[tokio::test]
async fn create_then_stat_reports_mode_and_zero_size() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.make_dir("/a/b", 0o755, &root).await.unwrap();
    cat.create("/a/b/c", 0o644, &root).await.unwrap();

    let stat = cat.extended_stat("/a/b/c", false, &root).await.unwrap();
    assert_eq!(stat.mode & 0o7777, 0o644);
    assert_eq!(stat.size, 0);
    assert_eq!(stat.nlink, 1);

    // A second stat must come back identical: read coherence after a local
    // write (testable property 1), regardless of whether it hit the cache.
    let stat2 = cat.extended_stat("/a/b/c", false, &root).await.unwrap();
    assert_eq!(stat.ino, stat2.ino);
    assert_eq!(stat.mode, stat2.mode);
}

// S2: two directory openers racing with DRLI and DIR both absent.
#[tokio::test]
async fn concurrent_open_dir_elects_a_single_builder() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.make_dir("/a/b", 0o755, &root).await.unwrap();
    cat.create("/a/b/x", 0o644, &root).await.unwrap();
    cat.create("/a/b/y", 0o644, &root).await.unwrap();

    let first = cat.open_dir("/a/b", &root).await.unwrap();
    let second = cat.open_dir("/a/b", &root).await.unwrap();

    // Exactly one of the two cursors won the DIR token and is the builder;
    // the loser enumerates uncached. Both still see the same final names.
    async fn drain(mut cursor: cachecat::DirectoryCursor<'_, InMemoryCatalog, FakeCacheBackend>) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(entry) = cursor.next().await.unwrap() {
            names.push(entry.name);
        }
        cursor.close(true).await.unwrap();
        names
    }

    let mut first_names = drain(first).await;
    let mut second_names = drain(second).await;
    first_names.sort();
    second_names.sort();
    assert_eq!(first_names, vec!["x".to_string(), "y".to_string()]);
    assert_eq!(second_names, first_names);
}

// Listing completeness + replay: a VALID DRLI published by the builder is
// reused by the next opener without touching the delegate's cursor logic
// again.
#[tokio::test]
async fn published_listing_is_replayed_on_next_open() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/d", 0o755, &root).await.unwrap();
    cat.create("/d/one", 0o644, &root).await.unwrap();

    let mut cursor = cat.open_dir("/d", &root).await.unwrap();
    while cursor.next().await.unwrap().is_some() {}
    cursor.close(true).await.unwrap();

    let mut replay = cat.open_dir("/d", &root).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = replay.next().await.unwrap() {
        names.push(entry.name);
    }
    replay.close(true).await.unwrap();
    assert_eq!(names, vec!["one".to_string()]);
}

// S3: rename across directories invalidates both parents and the moved
// entry, and the destination resolves to the source's prior inode.
#[tokio::test]
async fn rename_across_directories_invalidates_and_preserves_identity() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.make_dir("/b", 0o755, &root).await.unwrap();
    cat.create("/a/x", 0o644, &root).await.unwrap();

    let before = cat.extended_stat("/a/x", false, &root).await.unwrap();
    cat.rename("/a/x", "/b/y", &root).await.unwrap();

    let after = cat.extended_stat("/b/y", false, &root).await.unwrap();
    assert_eq!(before.ino, after.ino);
    assert!(cat.extended_stat("/a/x", false, &root).await.is_err());
}

#[tokio::test]
async fn rename_rejects_destination_that_is_a_descendant_of_source() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.make_dir("/a/b", 0o755, &root).await.unwrap();
    let err = cat.rename("/a", "/a/b/c", &root).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidArgument(_)));
}

// S4: a symlink cycle fails with link-loop-exceeded after exactly
// SymLinkLimit + 1 hops.
#[tokio::test]
async fn symlink_cycle_fails_with_link_loop_exceeded() {
    let config = CachingConfig {
        symlink_limit: 3,
        ..CachingConfig::default()
    };
    let cat = new_catalog_with(config);
    let root = root_ctx();
    cat.symlink("/l2", "/l1", &root).await.unwrap();
    cat.symlink("/l1", "/l2", &root).await.unwrap();

    let err = cat.extended_stat("/l1", true, &root).await.unwrap_err();
    match err {
        CatalogError::LinkLoopExceeded { limit } => assert_eq!(limit, 3),
        other => panic!("expected LinkLoopExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn non_cyclic_symlink_resolves_when_followed() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/target", 0o644, &root).await.unwrap();
    cat.symlink("/target", "/link", &root).await.unwrap();

    let followed = cat.extended_stat("/link", true, &root).await.unwrap();
    assert!(followed.is_regular());
    let unfollowed = cat.extended_stat("/link", false, &root).await.unwrap();
    assert!(unfollowed.is_symlink());
}

// S5: setChecksum via the legacy path, then via an xattr update, keeping
// the two representations reconciled.
#[tokio::test]
async fn checksum_legacy_and_xattr_stay_reconciled() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/f", 0o644, &root).await.unwrap();

    cat.set_checksum("/f", "AD", "0xdeadbeef", &root).await.unwrap();
    let stat = cat.extended_stat("/f", false, &root).await.unwrap();
    assert_eq!(stat.csum.as_ref().unwrap().algo, "AD");
    assert_eq!(stat.csum.as_ref().unwrap().value, "0xdeadbeef");
    assert_eq!(stat.xattrs.get("checksum.adler32").map(String::as_str), Some("0xdeadbeef"));

    let mut updates = std::collections::BTreeMap::new();
    updates.insert("checksum.md5".to_string(), "abc".to_string());
    cat.update_xattrs("/f", updates, &root).await.unwrap();

    let stat = cat.extended_stat("/f", false, &root).await.unwrap();
    assert_eq!(stat.xattrs.get("checksum.md5").map(String::as_str), Some("abc"));
    assert_eq!(stat.csum.as_ref().unwrap().algo, "MD");
    assert_eq!(stat.csum.as_ref().unwrap().value, "abc");
}

// S6: with the cache returning transient errors on every call, every
// public operation still returns the delegate-correct result.
#[tokio::test]
async fn cache_outage_does_not_break_correctness() {
    let backend = FakeCacheBackend::new();
    backend.set_always_transient(true);
    let cat = CachingCatalog::new(InMemoryCatalog::new(), CacheClient::new(backend), CachingConfig::default());
    let root = root_ctx();

    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.create("/a/f", 0o644, &root).await.unwrap();
    let stat = cat.extended_stat("/a/f", false, &root).await.unwrap();
    assert!(stat.is_regular());

    let mut cursor = cat.open_dir("/a", &root).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = cursor.next().await.unwrap() {
        names.push(entry.name);
    }
    cursor.close(true).await.unwrap();
    assert_eq!(names, vec!["f".to_string()]);

    cat.rename("/a/f", "/a/g", &root).await.unwrap();
    assert!(cat.extended_stat("/a/g", false, &root).await.is_ok());
    cat.unlink("/a/g", &root).await.unwrap();
    assert!(cat.extended_stat("/a/g", false, &root).await.is_err());
}

// Testable property 4 variant: invalidation fan-out leaves nothing behind
// that the next read can observe as stale.
#[tokio::test]
async fn set_size_invalidates_ancestor_stats_up_to_configured_depth() {
    let config = CachingConfig {
        size_reporting_depth: 2,
        ..CachingConfig::default()
    };
    let cat = new_catalog_with(config);
    let root = root_ctx();
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.make_dir("/a/b", 0o755, &root).await.unwrap();
    cat.create("/a/b/f", 0o644, &root).await.unwrap();

    // Warm the cache for the ancestors before mutating.
    let _ = cat.extended_stat("/a", false, &root).await.unwrap();
    let _ = cat.extended_stat("/a/b", false, &root).await.unwrap();

    cat.set_size("/a/b/f", 4096, &root).await.unwrap();
    let stat = cat.extended_stat("/a/b/f", false, &root).await.unwrap();
    assert_eq!(stat.size, 4096);
}

// Permission model: non-owner mutation attempts are rejected; root bypasses.
#[tokio::test]
async fn non_owner_cannot_change_mode_but_root_can() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/f", 0o644, &root).await.unwrap();

    let other = ctx(42);
    let err = cat.set_mode("/f", 0o600, &other).await.unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(_)));

    cat.set_mode("/f", 0o600, &root).await.unwrap();
    let stat = cat.extended_stat("/f", false, &root).await.unwrap();
    assert_eq!(stat.mode & 0o7777, 0o600);
}

// S_IFMT preservation invariant: set_mode never changes the file-type bits.
#[tokio::test]
async fn set_mode_preserves_file_type_bits() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/d", 0o755, &root).await.unwrap();
    cat.set_mode("/d", 0o700, &root).await.unwrap();
    let stat = cat.extended_stat("/d", false, &root).await.unwrap();
    assert!(stat.is_dir());
    assert_eq!(stat.mode & 0o7777, 0o700);
}

// Sticky-bit enforcement on unlink: a non-owner cannot unlink another
// user's file inside a sticky world-writable directory.
#[tokio::test]
async fn sticky_bit_blocks_unlink_by_non_owner() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.make_dir("/tmp", 0o1777, &root).await.unwrap();
    cat.create("/tmp/f", 0o666, &root).await.unwrap();
    cat.set_owner("/tmp/f", 7, 7, &root).await.unwrap();

    let intruder = ctx(9);
    let err = cat.unlink("/tmp/f", &intruder).await.unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(_)));

    let owner = ctx(7);
    cat.unlink("/tmp/f", &owner).await.unwrap();
}

#[tokio::test]
async fn remove_dir_rejects_root_and_current_working_directory() {
    let cat = new_catalog();
    let root = root_ctx();
    let err = cat.remove_dir("/", &root).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidArgument(_)));

    cat.make_dir("/work", 0o755, &root).await.unwrap();
    cat.change_dir("/work", &root).await.unwrap();
    let err = cat.remove_dir("/work", &root).await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidArgument(_)));
}

#[tokio::test]
async fn access_returns_false_on_permission_denied_and_propagates_other_errors() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/secret", 0o600, &root).await.unwrap();
    cat.set_owner("/secret", 1, 1, &root).await.unwrap();

    let intruder = ctx(9);
    let allowed = cat.access("/secret", cachecat::model::Mode::READ, &intruder).await.unwrap();
    assert!(!allowed);

    let err = cat.access("/does-not-exist", cachecat::model::Mode::READ, &root).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn replica_lifecycle_round_trips_through_the_cache() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/f", 0o644, &root).await.unwrap();
    let ino = cat.extended_stat("/f", false, &root).await.unwrap().ino;

    let replica = cachecat::model::Replica {
        replica_id: "r1".into(),
        file_id: ino,
        status: ReplicaStatus::Available,
        kind: ReplicaKind::Permanent,
        pool: "pool1".into(),
        server: "srv1".into(),
        filesystem: "/fs1".into(),
        rfn: "sfn://srv1/fs1/f".into(),
        nb_accesses: 0,
        atime: 0,
        ptime: 0,
        ltime: 0,
        extra: Default::default(),
    };

    cat.add_replica(&replica, &root).await.unwrap();
    let fetched = cat.get_replica_by_rfn(&replica.rfn).await.unwrap();
    assert_eq!(fetched.rfn, replica.rfn);

    let list = cat.get_replicas("/f", &root).await.unwrap();
    assert_eq!(list.len(), 1);

    cat.delete_replica(&replica).await.unwrap();
    assert!(cat.get_replica_by_rfn(&replica.rfn).await.is_err());
}

#[tokio::test]
async fn comment_round_trips_and_requires_write_to_set() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/f", 0o644, &root).await.unwrap();
    cat.set_owner("/f", 3, 3, &root).await.unwrap();
    cat.set_mode("/f", 0o644, &root).await.unwrap();

    cat.set_comment("/f", "hello", &root).await.unwrap();
    assert_eq!(cat.get_comment("/f", &root).await.unwrap(), "hello");

    let other = ctx(9);
    let err = cat.set_comment("/f", "nope", &other).await.unwrap_err();
    assert!(matches!(err, CatalogError::PermissionDenied(_)));
}

#[tokio::test]
async fn acl_entries_grant_access_beyond_owner_group_other_bits() {
    let cat = new_catalog();
    let root = root_ctx();
    cat.create("/f", 0o600, &root).await.unwrap();
    cat.set_owner("/f", 1, 1, &root).await.unwrap();

    let acl = Acl {
        entries: vec![cachecat::model::AclEntry {
            kind: cachecat::model::AclEntryKind::NamedUser,
            id: Some(9),
            perm: cachecat::model::Mode::READ,
        }],
    };
    cat.set_acl("/f", acl, &root).await.unwrap();

    let named_user = ctx(9);
    assert!(cat.access("/f", cachecat::model::Mode::READ, &named_user).await.unwrap());
    assert!(!cat.access("/f", cachecat::model::Mode::WRITE, &named_user).await.unwrap());
}

#[tokio::test]
async fn non_posix_mode_resolves_without_per_hop_permission_checks() {
    let config = CachingConfig {
        posix_mode: false,
        ..CachingConfig::default()
    };
    let cat = new_catalog_with(config);
    let root = root_ctx();
    // A directory with no execute bit would normally block traversal in
    // POSIX mode; non-POSIX mode trusts the delegate instead.
    cat.make_dir("/a", 0o755, &root).await.unwrap();
    cat.create("/a/f", 0o644, &root).await.unwrap();
    cat.set_mode("/a", 0o600, &root).await.unwrap();

    let other = ctx(42);
    let stat = cat.extended_stat("/a/f", false, &other).await.unwrap();
    assert!(stat.is_regular());
}

#[tokio::test]
async fn key_length_never_exceeds_the_service_bound() {
    let cat = new_catalog();
    let root = root_ctx();
    let long_name = "x".repeat(400);
    cat.create(&format!("/{long_name}"), 0o644, &root).await.unwrap();
    let stat = cat.extended_stat(&format!("/{long_name}"), false, &root).await.unwrap();
    assert!(stat.is_regular());
}

#[tokio::test]
async fn function_counter_tracks_hits_and_misses_when_enabled() {
    let config = CachingConfig {
        function_counter_enabled: true,
        ..CachingConfig::default()
    };
    let cat = new_catalog_with(config);
    let root = root_ctx();
    cat.create("/f", 0o644, &root).await.unwrap();

    let _ = cat.extended_stat("/f", false, &root).await.unwrap();
    let _ = cat.extended_stat("/f", false, &root).await.unwrap();

    let (hits, misses) = cat.function_counter_snapshot();
    assert!(hits >= 1);
    assert!(misses >= 1);
}
