// src/model/security.rs

//! `SecurityContext`, consumed read-only from an external identity mapper
//! (spec.md §3, §6). Nothing here performs authentication; it is
//! constructed by callers/tests and handed in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_name: String,
    pub remote_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub uid: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub gid: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub credentials: Credentials,
    pub user: UserInfo,
    pub groups: Vec<GroupInfo>,
}

impl SecurityContext {
    pub fn gids(&self) -> Vec<u32> {
        self.groups.iter().map(|g| g.gid).collect()
    }

    pub fn primary_gid(&self) -> u32 {
        self.groups.first().map(|g| g.gid).unwrap_or(0)
    }

    /// A root-equivalent context, useful for tests and the demonstration
    /// delegate in `main.rs`.
    pub fn root() -> Self {
        Self {
            credentials: Credentials {
                client_name: "root".into(),
                remote_address: "127.0.0.1".into(),
            },
            user: UserInfo {
                uid: 0,
                name: "root".into(),
            },
            groups: vec![GroupInfo {
                gid: 0,
                name: "root".into(),
            }],
        }
    }
}
