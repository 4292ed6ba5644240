// src/model/stat.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::acl::Acl;

/// Online vs migrated-to-tape status, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Online,
    Migrated,
}

/// A legacy (type, value) checksum pair, e.g. `("AD", "0xdeadbeef")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algo: String,
    pub value: String,
}

/// The short legacy algorithm code a long-form xattr name derives from,
/// e.g. `checksum.adler32` <-> `AD`. Grounded on the original's
/// `checksums::fullChecksumName` lookup table.
pub fn full_checksum_name(short_code: &str) -> Option<&'static str> {
    match short_code.to_ascii_uppercase().as_str() {
        "AD" => Some("adler32"),
        "MD" => Some("md5"),
        "CS" => Some("crc32"),
        "SH" => Some("sha1"),
        _ => None,
    }
}

/// The short code a long-form xattr name derives back to, for refreshing
/// the legacy pair from a newly-set xattr.
pub fn short_checksum_code(full_name: &str) -> Option<&'static str> {
    match full_name {
        "adler32" => Some("AD"),
        "md5" => Some("MD"),
        "crc32" => Some("CS"),
        "sha1" => Some("SH"),
        _ => None,
    }
}

/// The unit of metadata for a filesystem entry; superset of POSIX `stat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedStat {
    pub ino: u64,
    pub parent: u64,
    pub name: String,
    pub guid: String,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub rdev: u64,
    pub dev: u64,
    pub status: FileStatus,
    pub csum: Option<Checksum>,
    pub acl: Acl,
    pub xattrs: BTreeMap<String, String>,

    /// The canonical absolute path recorded on final resolution, per
    /// spec.md §4.1 ("record the canonical absolute path ... as a
    /// transient attribute `normPath`"). Never serialized: it is
    /// recomputed by the resolver on every lookup, not cached.
    #[serde(skip)]
    pub norm_path: Option<String>,
}

/// `S_IFMT`, the file-type bits of `mode`, preserved through all mutations
/// per spec.md §3 invariant (c).
pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;

impl ExtendedStat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Enforces spec.md §3 invariant (a): if a legacy checksum is set and
    /// the corresponding long-form xattr is absent, derive it. If any
    /// `checksum.*` xattr diverges from the legacy pair — whether it is the
    /// same algorithm with a different value, or a different algorithm
    /// entirely set later via `updateExtendedAttributes` — the xattr wins
    /// and the legacy pair is refreshed from it (spec.md §4.1 "Checksum
    /// coherence"). Returns `true` if the stat was mutated to reconcile a
    /// divergence (used by callers to log at `debug!`, per SPEC_FULL.md §9).
    pub fn reconcile_checksum(&mut self) -> bool {
        let Some(csum) = self.csum.clone() else {
            return false;
        };
        let Some(full_name) = full_checksum_name(&csum.algo) else {
            return false;
        };
        let xattr_key = format!("checksum.{full_name}");
        if !self.xattrs.contains_key(&xattr_key) {
            self.xattrs.insert(xattr_key, csum.value.clone());
        }

        // `xattrs` is a `BTreeMap`, so this scan is in sorted key order —
        // deterministic if more than one `checksum.*` xattr diverges at
        // once. The entry matching the current legacy algo with the same
        // value is not a divergence; every other `checksum.*` entry is.
        for (key, value) in self.xattrs.iter() {
            let Some(other_full_name) = key.strip_prefix("checksum.") else {
                continue;
            };
            let Some(short_code) = short_checksum_code(other_full_name) else {
                continue;
            };
            if other_full_name == full_name && value == &csum.value {
                continue;
            }
            self.csum = Some(Checksum {
                algo: short_code.to_string(),
                value: value.clone(),
            });
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::acl::Acl;

    fn base_stat() -> ExtendedStat {
        ExtendedStat {
            ino: 1,
            parent: 0,
            name: "f".into(),
            guid: "guid".into(),
            mode: S_IFREG | 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            blksize: 4096,
            blocks: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            rdev: 0,
            dev: 0,
            status: FileStatus::Online,
            csum: None,
            acl: Acl::default(),
            xattrs: BTreeMap::new(),
            norm_path: None,
        }
    }

    #[test]
    fn derives_xattr_from_legacy_pair_when_absent() {
        let mut s = base_stat();
        s.csum = Some(Checksum {
            algo: "AD".into(),
            value: "0xdeadbeef".into(),
        });
        assert!(!s.reconcile_checksum());
        assert_eq!(
            s.xattrs.get("checksum.adler32").map(String::as_str),
            Some("0xdeadbeef")
        );
    }

    #[test]
    fn xattr_wins_on_divergence() {
        let mut s = base_stat();
        s.csum = Some(Checksum {
            algo: "MD".into(),
            value: "old".into(),
        });
        s.xattrs.insert("checksum.md5".into(), "new".into());
        assert!(s.reconcile_checksum());
        assert_eq!(s.csum.as_ref().unwrap().value, "new");
    }

    #[test]
    fn a_different_algorithm_xattr_overrides_the_legacy_pair() {
        let mut s = base_stat();
        s.csum = Some(Checksum {
            algo: "AD".into(),
            value: "0xdeadbeef".into(),
        });
        // A later `checksum.md5` xattr (set via `updateExtendedAttributes`)
        // is for a different algorithm entirely, not just a differing value
        // for the same one.
        s.xattrs.insert("checksum.md5".into(), "abc".into());
        assert!(s.reconcile_checksum());
        assert_eq!(s.csum.as_ref().unwrap().algo, "MD");
        assert_eq!(s.csum.as_ref().unwrap().value, "abc");
    }
}
