// src/model/acl.rs

//! POSIX mode bits plus the ACL entry kinds of spec.md §4.1
//! ("Permission model"), and the `checkPermissions` equivalent.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// The three requestable access bits, matching POSIX r/w/x.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Mode: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXEC = 0b001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclEntryKind {
    UserObject,
    GroupObject,
    NamedUser,
    NamedGroup,
    Mask,
    Other,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub kind: AclEntryKind,
    /// uid or gid for `NamedUser`/`NamedGroup`; unused otherwise.
    pub id: Option<u32>,
    pub perm: Mode,
}

/// The access-control list carried on an `ExtendedStat`, in addition to the
/// owner/group/other bits embedded in `mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Acl {
    pub entries: Vec<AclEntry>,
}

/// `checkPermissions(ctx, acl, stat, required)`: returns `Ok(())` on allow,
/// `Err(())` on deny. Standard mode+ACL rules: owner/group/other bits, plus
/// named-user/named-group/mask ACL entries, per spec.md §4.1.
pub fn check_permissions(
    uid: u32,
    gids: &[u32],
    stat_uid: u32,
    stat_gid: u32,
    mode: u32,
    acl: &Acl,
    required: Mode,
) -> Result<(), ()> {
    // Privileged principal (uid 0) always passes, matching the original's
    // root bypass.
    if uid == 0 {
        return Ok(());
    }

    if !acl.entries.is_empty() {
        return check_acl(uid, gids, stat_uid, stat_gid, acl, required);
    }

    let owner_bits = Mode::from_bits_truncate(((mode >> 6) & 0o7) as u8);
    let group_bits = Mode::from_bits_truncate(((mode >> 3) & 0o7) as u8);
    let other_bits = Mode::from_bits_truncate((mode & 0o7) as u8);

    if uid == stat_uid {
        return if owner_bits.contains(required) {
            Ok(())
        } else {
            Err(())
        };
    }
    if gids.contains(&stat_gid) {
        return if group_bits.contains(required) {
            Ok(())
        } else {
            Err(())
        };
    }
    if other_bits.contains(required) {
        Ok(())
    } else {
        Err(())
    }
}

fn check_acl(
    uid: u32,
    gids: &[u32],
    stat_uid: u32,
    stat_gid: u32,
    acl: &Acl,
    required: Mode,
) -> Result<(), ()> {
    let mask = acl
        .entries
        .iter()
        .find(|e| e.kind == AclEntryKind::Mask)
        .map(|e| e.perm);

    let effective = |perm: Mode| -> Mode {
        match mask {
            Some(m) => perm & m,
            None => perm,
        }
    };

    if uid == stat_uid {
        if let Some(e) = acl
            .entries
            .iter()
            .find(|e| e.kind == AclEntryKind::UserObject)
        {
            return if e.perm.contains(required) {
                Ok(())
            } else {
                Err(())
            };
        }
    }

    for e in acl
        .entries
        .iter()
        .filter(|e| e.kind == AclEntryKind::NamedUser && e.id == Some(uid))
    {
        return if effective(e.perm).contains(required) {
            Ok(())
        } else {
            Err(())
        };
    }

    let mut matched_group = false;
    let mut group_allows = false;
    for e in acl.entries.iter().filter(|e| {
        (e.kind == AclEntryKind::GroupObject && gids.contains(&stat_gid))
            || (e.kind == AclEntryKind::NamedGroup
                && e.id.map(|g| gids.contains(&g)).unwrap_or(false))
    }) {
        matched_group = true;
        if effective(e.perm).contains(required) {
            group_allows = true;
        }
    }
    if matched_group {
        return if group_allows { Ok(()) } else { Err(()) };
    }

    if let Some(e) = acl.entries.iter().find(|e| e.kind == AclEntryKind::Other) {
        return if e.perm.contains(required) {
            Ok(())
        } else {
            Err(())
        };
    }
    Err(())
}

/// S_ISVTX: restricts unlink/rename within a directory to the entry owner,
/// the parent's owner, or a privileged principal.
pub const S_ISVTX: u32 = 0o1000;

pub fn sticky_bit_allows(
    requester_uid: u32,
    dir_mode: u32,
    dir_owner_uid: u32,
    entry_owner_uid: u32,
) -> bool {
    if requester_uid == 0 {
        return true;
    }
    if dir_mode & S_ISVTX == 0 {
        return true;
    }
    requester_uid == dir_owner_uid || requester_uid == entry_owner_uid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_bits_govern_owner() {
        let acl = Acl::default();
        assert!(check_permissions(10, &[], 10, 10, 0o640, &acl, Mode::READ).is_ok());
        assert!(check_permissions(10, &[], 10, 10, 0o240, &acl, Mode::READ).is_err());
    }

    #[test]
    fn other_bits_govern_unrelated_uid() {
        let acl = Acl::default();
        assert!(check_permissions(99, &[], 10, 10, 0o644, &acl, Mode::READ).is_ok());
        assert!(check_permissions(99, &[], 10, 10, 0o640, &acl, Mode::READ).is_err());
    }

    #[test]
    fn root_bypasses_everything() {
        let acl = Acl::default();
        assert!(check_permissions(0, &[], 10, 10, 0o000, &acl, Mode::WRITE).is_ok());
    }

    #[test]
    fn sticky_bit_blocks_non_owner() {
        assert!(!sticky_bit_allows(99, S_ISVTX | 0o777, 1, 2));
        assert!(sticky_bit_allows(2, S_ISVTX | 0o777, 1, 2));
        assert!(sticky_bit_allows(1, S_ISVTX | 0o777, 1, 2));
    }
}
