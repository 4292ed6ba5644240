// src/model/mod.rs

//! The data model of spec.md §3: `ExtendedStat`, `Replica`, `SymLink`,
//! `DirectoryListing`, `Acl`, and `SecurityContext`.

pub mod acl;
pub mod directory;
pub mod pool;
pub mod replica;
pub mod security;
pub mod stat;

pub use acl::{Acl, AclEntry, AclEntryKind, Mode};
pub use directory::{DirectoryListing, ListingState};
pub use pool::{Availability, Chunk, Location, Pool};
pub use replica::{Replica, ReplicaKind, ReplicaStatus, SymLinkTarget};
pub use security::{Credentials, GroupInfo, SecurityContext, UserInfo};
pub use stat::{Checksum, ExtendedStat, FileStatus};
