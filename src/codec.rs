// src/codec.rs

//! C4: binary (de)serialization of cached entities, per spec.md §4.4.
//!
//! `serde` derives on every entity type (see `src/model/`) give us the
//! field layout; `bincode` (v2, via `bincode::serde`) gives the compact
//! wire encoding, mirroring the teacher's framing layer
//! (`core/protocol/resp_frame.rs`) in spirit: one `Encoder`-shaped function
//! per direction, defensive on malformed input.
//!
//! Deserialization is defensive per spec.md: a malformed payload yields a
//! fresh empty object rather than propagating an error that would abort
//! the calling catalog operation. Concretely this means every `decode_*`
//! function returns `T::default()` for `DirectoryListing` (state `Missing`,
//! per `Default for DirectoryListing`) and `None` for every other entity on
//! any decode failure — the caller already treats `None` as a cache miss
//! and falls back to the delegate, so "defensive" and "miss" collapse into
//! the same code path.

use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::model::DirectoryListing;

fn bincode_config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Encodes any codec-supported entity to its wire representation. Encoding
/// a well-formed in-memory value cannot fail under `bincode`'s standard
/// configuration, so this returns the raw bytes rather than a `Result`;
/// callers that need fallibility (none currently do) can match on
/// `encode_fallible`.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    encode_to_vec(value, bincode_config()).expect("encoding a well-formed value cannot fail")
}

/// Decodes a codec-supported entity, treating any malformed payload as a
/// miss (`None`) rather than propagating the decode error, per spec.md
/// §4.4's "defensive deserialization" requirement.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    decode_from_slice(bytes, bincode_config())
        .ok()
        .map(|(value, _)| value)
}

/// Directory listings get their own decode entry point because a malformed
/// DRLI payload degrades to an empty, `Missing`-state listing (so the
/// caller re-enters the openDir state machine from scratch) rather than a
/// plain miss, per spec.md §4.4 ("a fresh empty object").
pub fn decode_directory_listing(bytes: &[u8]) -> DirectoryListing {
    decode::<DirectoryListing>(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::stat::{Checksum, ExtendedStat, FileStatus};
    use crate::model::{Acl, DirectoryListing, ListingState, Replica, ReplicaKind, ReplicaStatus};
    use std::collections::BTreeMap;

    fn sample_stat() -> ExtendedStat {
        ExtendedStat {
            ino: 42,
            parent: 1,
            name: "f".into(),
            guid: "guid-1".into(),
            mode: 0o100644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            size: 123,
            blksize: 4096,
            blocks: 1,
            atime: 10,
            mtime: 11,
            ctime: 12,
            rdev: 0,
            dev: 0,
            status: FileStatus::Online,
            csum: Some(Checksum {
                algo: "AD".into(),
                value: "0xdeadbeef".into(),
            }),
            acl: Acl::default(),
            xattrs: BTreeMap::new(),
            norm_path: None,
        }
    }

    #[test]
    fn extended_stat_round_trips() {
        let original = sample_stat();
        let bytes = encode(&original);
        let decoded: ExtendedStat = decode(&bytes).expect("decode should succeed");
        // `norm_path` is transient and intentionally not serialized.
        let mut expected = original.clone();
        expected.norm_path = None;
        assert_eq!(decoded, expected);
    }

    #[test]
    fn replica_round_trips() {
        let original = Replica {
            replica_id: "r1".into(),
            file_id: 42,
            status: ReplicaStatus::Available,
            kind: ReplicaKind::Permanent,
            pool: "pool1".into(),
            server: "srv1".into(),
            filesystem: "/fs1".into(),
            rfn: "sfn://srv1/fs1/path".into(),
            nb_accesses: 3,
            atime: 1,
            ptime: 2,
            ltime: 3,
            extra: BTreeMap::new(),
        };
        let bytes = encode(&original);
        let decoded: Replica = decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn directory_listing_round_trips() {
        let original = DirectoryListing {
            state: ListingState::Valid,
            names: vec!["a".into(), "b".into()],
        };
        let bytes = encode(&original);
        let decoded: DirectoryListing = decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn malformed_directory_listing_decodes_to_missing_default() {
        let garbage = vec![0xff, 0x00, 0x01, 0x02];
        let decoded = decode_directory_listing(&garbage);
        assert_eq!(decoded, DirectoryListing::default());
        assert_eq!(decoded.state, ListingState::Missing);
    }

    #[test]
    fn malformed_payload_decodes_to_none_for_other_entities() {
        let garbage = vec![0xff, 0xff, 0xff];
        let decoded: Option<ExtendedStat> = decode(&garbage);
        assert!(decoded.is_none());
    }

    proptest::proptest! {
        #[test]
        fn stat_round_trip_holds_for_varied_sizes(size in 0u64..u64::MAX, nlink in 0u32..1000) {
            let mut stat = sample_stat();
            stat.size = size;
            stat.nlink = nlink;
            let bytes = encode(&stat);
            let decoded: ExtendedStat = decode(&bytes).expect("decode should succeed");
            proptest::prop_assert_eq!(decoded.size, stat.size);
            proptest::prop_assert_eq!(decoded.nlink, stat.nlink);
        }
    }
}
