// src/keyscheme.rs

//! C5: deterministic mapping from (entity kind, identifier) to opaque,
//! length-bounded cache keys, per spec.md §4.5.
//!
//! No cryptographic hashing: trailing-suffix trimming is the implemented
//! scheme, a legacy concession so two processes sharing one cache stay
//! key-compatible (spec.md §9 "Key trimming" re-architecture note keeps
//! trimming as the immediate-scope choice; REDESIGN FLAGS flag hashing as a
//! future option only). A one-byte scheme version is reserved on every key
//! so a future hashed scheme can be introduced without breaking readers of
//! this one, grounded in the teacher's `RespFrameCodec` protocol-version
//! gating (`examples/spineldb-spineldb/src/core/protocol/resp_frame.rs`).

/// The entity kind prefix, per spec.md §3 "Cache key".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Stat,
    Repl,
    ReplList,
    Comment,
    Dir,
    DirList,
}

impl Kind {
    fn tag(self) -> &'static str {
        match self {
            Kind::Stat => "STAT",
            Kind::Repl => "REPL",
            Kind::ReplList => "RPLI",
            Kind::Comment => "CMNT",
            Kind::Dir => "DIR",
            Kind::DirList => "DRLI",
        }
    }
}

/// The current key-scheme version byte. Bump when the trimming rule or key
/// grammar changes in a way that is not forward-compatible.
const KEY_SCHEME_VERSION: u8 = b'1';

/// The cache service's documented key-length limit (the historical
/// memcached ASCII-protocol bound).
pub const MAX_KEY_LENGTH: usize = 250;

/// An opaque, bounded cache key, produced only by [`build_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builds `<version><kind>:<identifier>`, trimming `identifier` from the
/// front (keeping the trailing suffix) when the combined key would exceed
/// [`MAX_KEY_LENGTH`], per spec.md §4.5: "the suffix is retained (last
/// `L - overhead` bytes) so that most paths stay unique".
fn build_key(kind: Kind, identifier: &str) -> CacheKey {
    let prefix = format!("{}{}:", KEY_SCHEME_VERSION as char, kind.tag());
    let overhead = prefix.len();
    let budget = MAX_KEY_LENGTH.saturating_sub(overhead);

    let ident = if identifier.len() > budget {
        let start = identifier.len() - budget;
        // Trim on a char boundary so we never split a multi-byte codepoint.
        let mut start = start;
        while start < identifier.len() && !identifier.is_char_boundary(start) {
            start += 1;
        }
        &identifier[start..]
    } else {
        identifier
    };

    CacheKey(format!("{prefix}{ident}"))
}

/// STAT(path) — the key for a path's `ExtendedStat`.
pub fn stat_key(normalized_path: &str) -> CacheKey {
    build_key(Kind::Stat, normalized_path)
}

/// REPL(rfn) — the key for a single replica record.
pub fn replica_key(rfn: &str) -> CacheKey {
    build_key(Kind::Repl, rfn)
}

/// RPLI(path) — the key for a file's complete replica list.
pub fn replica_list_key(normalized_path: &str) -> CacheKey {
    build_key(Kind::ReplList, normalized_path)
}

/// CMNT(path) — the key for a path's comment string.
pub fn comment_key(normalized_path: &str) -> CacheKey {
    build_key(Kind::Comment, normalized_path)
}

/// DIR(path) — the single-builder coordination token for a directory.
pub fn dir_token_key(normalized_path: &str) -> CacheKey {
    build_key(Kind::Dir, normalized_path)
}

/// DRLI(path) — the key for a directory's cached listing.
pub fn dir_listing_key(normalized_path: &str) -> CacheKey {
    build_key(Kind::DirList, normalized_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_path_is_not_trimmed() {
        let k = stat_key("/a/b/c");
        assert!(k.as_str().ends_with("STAT:/a/b/c"));
        assert!(k.as_str().len() <= MAX_KEY_LENGTH);
    }

    #[test]
    fn long_path_is_trimmed_to_suffix() {
        let long_path = format!("/{}", "x".repeat(400));
        let k = stat_key(&long_path);
        assert!(k.as_str().len() <= MAX_KEY_LENGTH);
        // The trailing bytes of the identifier are preserved.
        assert!(k.as_str().ends_with(&"x".repeat(20)));
    }

    #[test]
    fn different_kinds_of_same_identifier_differ() {
        let a = stat_key("/a/b");
        let b = dir_token_key("/a/b");
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn key_length_never_exceeds_bound(path in ".{0,600}") {
            let k = stat_key(&path);
            proptest::prop_assert!(k.as_str().len() <= MAX_KEY_LENGTH);
        }
    }
}
