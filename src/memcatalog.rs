// src/memcatalog.rs

//! An in-memory `Catalog` delegate, standing in for "the backing inode
//! store" (spec.md §1) in `main.rs`'s demonstration wiring and in the
//! integration tests. Single process, non-persistent, no I/O — the point
//! is to exercise `CachingCatalog`'s behavior, not to be a real namespace
//! store.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::catalog::Catalog;
use crate::errors::{CatalogError, CatalogResult};
use crate::model::acl::Acl;
use crate::model::stat::{Checksum, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use crate::model::{ExtendedStat, FileStatus, Replica};
use crate::pathutil;

const ROOT_INO: u64 = 1;
const MAX_INTERNAL_SYMLINK_HOPS: u32 = 40;

struct Node {
    stat: ExtendedStat,
    link_target: Option<String>,
    comment: String,
    /// Ordered so `read_dirx` enumeration is stable and
    /// insertion-order-preserving.
    children: Vec<(String, u64)>,
}

struct State {
    nodes: BTreeMap<u64, Node>,
    replicas_by_rfn: BTreeMap<String, Replica>,
}

pub struct InMemoryCatalog {
    state: RwLock<State>,
    next_ino: AtomicU64,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            ROOT_INO,
            Node {
                stat: ExtendedStat {
                    ino: ROOT_INO,
                    parent: ROOT_INO,
                    name: String::new(),
                    guid: "root".into(),
                    mode: S_IFDIR | 0o755,
                    nlink: 2,
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
                },
                link_target: None,
                comment: String::new(),
                children: Vec::new(),
            },
        );
        Self {
            state: RwLock::new(State {
                nodes,
                replicas_by_rfn: BTreeMap::new(),
            }),
            next_ino: AtomicU64::new(ROOT_INO + 1),
        }
    }

    fn alloc_ino(&self) -> u64 {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }
}

/// Resolves `path`, following symlinks at every intermediate component and
/// (if `follow_final`) at the last one too. Bounded by a generous internal
/// hop count — this delegate has no notion of the caching layer's
/// configured `symlink_limit`, so it only guards against a genuine cycle.
fn resolve(state: &State, path: &str, follow_final: bool) -> CatalogResult<u64> {
    let mut components: VecDeque<String> = path.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect();
    let mut ino = ROOT_INO;
    let mut hops = 0u32;

    loop {
        let Some(component) = components.pop_front() else {
            return Ok(ino);
        };
        let is_last = components.is_empty();
        let node = state.nodes.get(&ino).ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        let next_ino = node
            .children
            .iter()
            .find(|(name, _)| name == &component)
            .map(|(_, i)| *i)
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        let next_node = state.nodes.get(&next_ino).expect("child ino must exist in nodes map");

        if next_node.stat.is_symlink() && (!is_last || follow_final) {
            hops += 1;
            if hops > MAX_INTERNAL_SYMLINK_HOPS {
                return Err(CatalogError::LinkLoopExceeded { limit: MAX_INTERNAL_SYMLINK_HOPS });
            }
            let target = next_node.link_target.clone().unwrap_or_default();
            let mut next_components: VecDeque<String> = if target.starts_with('/') {
                ino = ROOT_INO;
                target.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect()
            } else {
                target.split('/').filter(|c| !c.is_empty()).map(str::to_string).collect()
            };
            next_components.extend(components.drain(..));
            components = next_components;
            continue;
        }

        ino = next_ino;
        if is_last {
            return Ok(ino);
        }
        if !state.nodes[&ino].stat.is_dir() {
            return Err(CatalogError::NotADirectory(path.to_string()));
        }
    }
}

fn path_of(state: &State, mut ino: u64) -> String {
    let mut segments = Vec::new();
    while ino != ROOT_INO {
        let Some(node) = state.nodes.get(&ino) else { break };
        segments.push(node.stat.name.clone());
        ino = node.stat.parent;
    }
    segments.reverse();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

pub struct DirHandleState {
    entries: Vec<(String, u64)>,
    index: usize,
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    type DirHandle = DirHandleState;

    async fn extended_stat(&self, path: &str, follow_symlink: bool) -> CatalogResult<ExtendedStat> {
        let state = self.state.read();
        let ino = resolve(&state, path, follow_symlink)?;
        Ok(state.nodes[&ino].stat.clone())
    }

    async fn extended_stat_by_rfn(&self, rfn: &str) -> CatalogResult<ExtendedStat> {
        let state = self.state.read();
        let replica = state
            .replicas_by_rfn
            .get(rfn)
            .ok_or_else(|| CatalogError::NotFound(rfn.to_string()))?;
        let node = state
            .nodes
            .get(&replica.file_id)
            .ok_or_else(|| CatalogError::NotFound(rfn.to_string()))?;
        Ok(node.stat.clone())
    }

    async fn path_for_inode(&self, ino: u64) -> CatalogResult<String> {
        let state = self.state.read();
        if !state.nodes.contains_key(&ino) {
            return Err(CatalogError::NotFound(format!("inode {ino}")));
        }
        Ok(path_of(&state, ino))
    }

    async fn read_link(&self, path: &str) -> CatalogResult<String> {
        let state = self.state.read();
        let ino = resolve(&state, path, false)?;
        state.nodes[&ino]
            .link_target
            .clone()
            .ok_or_else(|| CatalogError::InvalidArgument(format!("{path} is not a symbolic link")))
    }

    async fn symlink(&self, target: &str, link_path: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let parent_ino = resolve(&state, &pathutil::parent_of(link_path), true)?;
        let name = pathutil::base_name(link_path).to_string();
        if state.nodes[&parent_ino].children.iter().any(|(n, _)| n == &name) {
            return Err(CatalogError::AlreadyExists(link_path.to_string()));
        }
        let ino = self.alloc_ino();
        state.nodes.insert(
            ino,
            Node {
                stat: ExtendedStat {
                    ino,
                    parent: parent_ino,
                    name: name.clone(),
                    guid: format!("guid-{ino}"),
                    mode: S_IFLNK | 0o777,
                    nlink: 1,
                    uid: 0,
                    gid: 0,
                    size: target.len() as u64,
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
                },
                link_target: Some(target.to_string()),
                comment: String::new(),
                children: Vec::new(),
            },
        );
        state.nodes.get_mut(&parent_ino).unwrap().children.push((name, ino));
        Ok(())
    }

    async fn create(&self, path: &str, mode: u32) -> CatalogResult<()> {
        let mut state = self.state.write();
        let parent_ino = resolve(&state, &pathutil::parent_of(path), true)?;
        let name = pathutil::base_name(path).to_string();
        if state.nodes[&parent_ino].children.iter().any(|(n, _)| n == &name) {
            return Err(CatalogError::AlreadyExists(path.to_string()));
        }
        let ino = self.alloc_ino();
        state.nodes.insert(
            ino,
            Node {
                stat: ExtendedStat {
                    ino,
                    parent: parent_ino,
                    name: name.clone(),
                    guid: format!("guid-{ino}"),
                    mode: (mode & !S_IFMT) | S_IFREG,
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
                },
                link_target: None,
                comment: String::new(),
                children: Vec::new(),
            },
        );
        state.nodes.get_mut(&parent_ino).unwrap().children.push((name, ino));
        Ok(())
    }

    async fn unlink(&self, path: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let parent_ino = resolve(&state, &pathutil::parent_of(path), true)?;
        let name = pathutil::base_name(path).to_string();
        let ino = state.nodes[&parent_ino]
            .children
            .iter()
            .find(|(n, _)| n == &name)
            .map(|(_, i)| *i)
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        if state.nodes[&ino].stat.is_dir() {
            return Err(CatalogError::IsADirectory(path.to_string()));
        }
        state.nodes.remove(&ino);
        state.nodes.get_mut(&parent_ino).unwrap().children.retain(|(n, _)| n != &name);
        Ok(())
    }

    async fn make_dir(&self, path: &str, mode: u32) -> CatalogResult<()> {
        let mut state = self.state.write();
        let parent_ino = resolve(&state, &pathutil::parent_of(path), true)?;
        let name = pathutil::base_name(path).to_string();
        if state.nodes[&parent_ino].children.iter().any(|(n, _)| n == &name) {
            return Err(CatalogError::AlreadyExists(path.to_string()));
        }
        let ino = self.alloc_ino();
        state.nodes.insert(
            ino,
            Node {
                stat: ExtendedStat {
                    ino,
                    parent: parent_ino,
                    name: name.clone(),
                    guid: format!("guid-{ino}"),
                    mode: (mode & !S_IFMT) | S_IFDIR,
                    nlink: 2,
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
                },
                link_target: None,
                comment: String::new(),
                children: Vec::new(),
            },
        );
        state.nodes.get_mut(&parent_ino).unwrap().children.push((name, ino));
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let parent_ino = resolve(&state, &pathutil::parent_of(path), true)?;
        let name = pathutil::base_name(path).to_string();
        let ino = state.nodes[&parent_ino]
            .children
            .iter()
            .find(|(n, _)| n == &name)
            .map(|(_, i)| *i)
            .ok_or_else(|| CatalogError::NotFound(path.to_string()))?;
        if !state.nodes[&ino].stat.is_dir() {
            return Err(CatalogError::NotADirectory(path.to_string()));
        }
        if !state.nodes[&ino].children.is_empty() {
            return Err(CatalogError::DirectoryNotEmpty(path.to_string()));
        }
        state.nodes.remove(&ino);
        state.nodes.get_mut(&parent_ino).unwrap().children.retain(|(n, _)| n != &name);
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let old_parent_ino = resolve(&state, &pathutil::parent_of(old_path), true)?;
        let new_parent_ino = resolve(&state, &pathutil::parent_of(new_path), true)?;
        let old_name = pathutil::base_name(old_path).to_string();
        let new_name = pathutil::base_name(new_path).to_string();
        let ino = state.nodes[&old_parent_ino]
            .children
            .iter()
            .find(|(n, _)| n == &old_name)
            .map(|(_, i)| *i)
            .ok_or_else(|| CatalogError::NotFound(old_path.to_string()))?;

        if let Some((_, existing_ino)) = state.nodes[&new_parent_ino]
            .children
            .iter()
            .find(|(n, _)| n == &new_name)
            .cloned()
        {
            if state.nodes[&existing_ino].stat.is_dir() && !state.nodes[&existing_ino].children.is_empty() {
                return Err(CatalogError::DirectoryNotEmpty(new_path.to_string()));
            }
            state.nodes.remove(&existing_ino);
            state.nodes.get_mut(&new_parent_ino).unwrap().children.retain(|(n, _)| n != &new_name);
        }

        state.nodes.get_mut(&old_parent_ino).unwrap().children.retain(|(n, _)| n != &old_name);
        state.nodes.get_mut(&new_parent_ino).unwrap().children.push((new_name.clone(), ino));
        let node = state.nodes.get_mut(&ino).unwrap();
        node.stat.name = new_name;
        node.stat.parent = new_parent_ino;
        Ok(())
    }

    async fn set_mode(&self, path: &str, mode: u32) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.mode = mode;
        Ok(())
    }

    async fn set_owner(&self, path: &str, uid: u32, gid: u32) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        let stat = &mut state.nodes.get_mut(&ino).unwrap().stat;
        stat.uid = uid;
        stat.gid = gid;
        Ok(())
    }

    async fn set_guid(&self, path: &str, guid: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.guid = guid.to_string();
        Ok(())
    }

    async fn set_acl(&self, path: &str, acl: Acl) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.acl = acl;
        Ok(())
    }

    async fn utime(&self, path: &str, atime: i64, mtime: i64) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        let stat = &mut state.nodes.get_mut(&ino).unwrap().stat;
        stat.atime = atime;
        stat.mtime = mtime;
        Ok(())
    }

    async fn update_xattrs(&self, path: &str, updates: BTreeMap<String, String>) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.xattrs.extend(updates);
        Ok(())
    }

    async fn set_size(&self, path: &str, size: u64) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.size = size;
        Ok(())
    }

    async fn set_checksum(&self, path: &str, algo: &str, value: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().stat.csum = Some(Checksum {
            algo: algo.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn set_comment(&self, path: &str, comment: &str) -> CatalogResult<()> {
        let mut state = self.state.write();
        let ino = resolve(&state, path, false)?;
        state.nodes.get_mut(&ino).unwrap().comment = comment.to_string();
        Ok(())
    }

    async fn get_comment(&self, path: &str) -> CatalogResult<String> {
        let state = self.state.read();
        let ino = resolve(&state, path, false)?;
        Ok(state.nodes[&ino].comment.clone())
    }

    async fn open_dir(&self, path: &str) -> CatalogResult<Self::DirHandle> {
        let state = self.state.read();
        let ino = resolve(&state, path, true)?;
        let node = &state.nodes[&ino];
        if !node.stat.is_dir() {
            return Err(CatalogError::NotADirectory(path.to_string()));
        }
        Ok(DirHandleState {
            entries: node.children.clone(),
            index: 0,
        })
    }

    async fn read_dirx(&self, handle: &mut Self::DirHandle) -> CatalogResult<Option<ExtendedStat>> {
        let Some((_, ino)) = handle.entries.get(handle.index).cloned() else {
            return Ok(None);
        };
        handle.index += 1;
        let state = self.state.read();
        Ok(state.nodes.get(&ino).map(|n| n.stat.clone()))
    }

    async fn close_dir(&self, _handle: Self::DirHandle) -> CatalogResult<()> {
        Ok(())
    }

    async fn get_replica(&self, rfn: &str) -> CatalogResult<Replica> {
        let state = self.state.read();
        state
            .replicas_by_rfn
            .get(rfn)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(rfn.to_string()))
    }

    async fn get_replicas(&self, path: &str) -> CatalogResult<Vec<Replica>> {
        let state = self.state.read();
        let ino = resolve(&state, path, true)?;
        Ok(state.replicas_by_rfn.values().filter(|r| r.file_id == ino).cloned().collect())
    }

    async fn add_replica(&self, replica: &Replica) -> CatalogResult<()> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&replica.file_id) {
            return Err(CatalogError::NotFound(format!("inode {}", replica.file_id)));
        }
        state.replicas_by_rfn.insert(replica.rfn.clone(), replica.clone());
        Ok(())
    }

    async fn update_replica(&self, replica: &Replica) -> CatalogResult<()> {
        let mut state = self.state.write();
        if !state.replicas_by_rfn.contains_key(&replica.rfn) {
            return Err(CatalogError::NotFound(replica.rfn.clone()));
        }
        state.replicas_by_rfn.insert(replica.rfn.clone(), replica.clone());
        Ok(())
    }

    async fn delete_replica(&self, replica: &Replica) -> CatalogResult<()> {
        let mut state = self.state.write();
        state
            .replicas_by_rfn
            .remove(&replica.rfn)
            .ok_or_else(|| CatalogError::NotFound(replica.rfn.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_stat_round_trips() {
        let cat = InMemoryCatalog::new();
        cat.create("/a", 0o644).await.unwrap();
        let stat = cat.extended_stat("/a", false).await.unwrap();
        assert!(stat.is_regular());
        assert_eq!(stat.name, "a");
    }

    #[tokio::test]
    async fn make_dir_then_create_child() {
        let cat = InMemoryCatalog::new();
        cat.make_dir("/d", 0o755).await.unwrap();
        cat.create("/d/f", 0o644).await.unwrap();
        let stat = cat.extended_stat("/d/f", false).await.unwrap();
        assert_eq!(stat.parent, resolve(&cat.state.read(), "/d", false).unwrap());
    }

    #[tokio::test]
    async fn remove_dir_rejects_nonempty() {
        let cat = InMemoryCatalog::new();
        cat.make_dir("/d", 0o755).await.unwrap();
        cat.create("/d/f", 0o644).await.unwrap();
        let err = cat.remove_dir("/d").await.unwrap_err();
        assert!(matches!(err, CatalogError::DirectoryNotEmpty(_)));
    }

    #[tokio::test]
    async fn symlink_is_followed_when_requested() {
        let cat = InMemoryCatalog::new();
        cat.create("/target", 0o644).await.unwrap();
        cat.symlink("/target", "/link").await.unwrap();
        let followed = cat.extended_stat("/link", true).await.unwrap();
        assert!(followed.is_regular());
        let not_followed = cat.extended_stat("/link", false).await.unwrap();
        assert!(not_followed.is_symlink());
    }

    #[tokio::test]
    async fn path_for_inode_round_trips_through_rename() {
        let cat = InMemoryCatalog::new();
        cat.make_dir("/a", 0o755).await.unwrap();
        cat.create("/a/f", 0o644).await.unwrap();
        let ino = cat.extended_stat("/a/f", false).await.unwrap().ino;
        cat.make_dir("/b", 0o755).await.unwrap();
        cat.rename("/a/f", "/b/g").await.unwrap();
        assert_eq!(cat.path_for_inode(ino).await.unwrap(), "/b/g");
    }
}
