//! Tree mutations.
//!
//! Structural operations (move, rename, delete) validate the whole affected
//! subtree before touching anything, so they either succeed completely or
//! leave the tree as it was. Each successful mutation publishes one
//! [`VfsFlow`] and notifies the search indexer.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use hako_types::{AccessControlEntry, NodeId, Permission};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{VfsError, VfsResult};
use crate::flows::VfsFlow;
use crate::mount::MountPoint;
use crate::node::{LockHolder, Node};
use crate::path::Path;
use crate::types::{NodeKind, Properties};

const LOCK_TOKEN_LEN: usize = 32;

/// Names must be a single non-blank segment.
pub(crate) fn check_name(name: &str) -> VfsResult<()> {
    if name.trim().is_empty() {
        return Err(VfsError::invalid_path("item name is not set"));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(VfsError::invalid_path(format!("invalid item name '{name}'")));
    }
    Ok(())
}

fn new_lock_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(LOCK_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// One node of a subtree copy, in pre-order. `parent` indexes an earlier
/// entry; `None` is the copy root.
struct CopyEntry {
    parent: Option<usize>,
    name: String,
    kind: NodeKind,
    content: Vec<u8>,
    properties: Properties,
}

impl MountPoint {
    /// Allocate a node under `parent` and link it in. No checks, no events.
    pub(crate) fn insert_node(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
        content: Vec<u8>,
    ) -> VfsResult<NodeId> {
        let id = self.ids.next_id();
        if self.nodes.contains_key(&id) || self.tombstones.contains_key(&id) {
            return Err(VfsError::server(format!(
                "id generator returned id {id} which is already in use"
            )));
        }
        let mut node = Node::new(id, name.to_string(), kind, Some(parent));
        node.content = content;
        let parent_node = self.node_mut(parent)?;
        parent_node.children.insert(name.to_string(), id);
        parent_node.touch();
        self.nodes.insert(id, node);
        Ok(id)
    }

    fn created(&self, id: NodeId) -> VfsResult<()> {
        let path = self.path_of(id)?;
        let is_folder = self.node(id)?.is_folder();
        tracing::debug!(path = %path, is_folder, "created");
        self.index_add(id);
        self.emit(VfsFlow::Created {
            workspace_id: self.workspace_id,
            path,
            is_folder,
        });
        Ok(())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Create a file named `name` in folder `parent`.
    pub fn create_file(
        &mut self,
        parent: NodeId,
        name: &str,
        content: impl Into<Vec<u8>>,
    ) -> VfsResult<NodeId> {
        check_name(name)?;
        self.require_folder(parent, "create file")?;
        self.require(parent, Permission::Write, true, "create a file in")?;
        if self.has_child(parent, name)? {
            return Err(VfsError::conflict(format!(
                "{} already exists",
                self.path_of(parent)?.new_path(name)?
            )));
        }
        let id = self.insert_node(parent, name, NodeKind::File, content.into())?;
        self.created(id)?;
        Ok(id)
    }

    /// Create a folder in `parent`. `name` may be a relative path like
    /// `a/b/c`, in which case every missing folder along it is created.
    ///
    /// Returns the deepest folder. Fails with `Conflict` if nothing was new.
    pub fn create_folder(&mut self, parent: NodeId, name: &str) -> VfsResult<NodeId> {
        if name.trim().is_empty() {
            return Err(VfsError::invalid_path("item name is not set"));
        }
        let relative = Path::of(name)?;
        if relative.is_empty() {
            return Err(VfsError::invalid_path(format!("invalid folder name '{name}'")));
        }
        for segment in relative.elements() {
            check_name(segment)?;
        }
        self.require_folder(parent, "create folder")?;
        self.require(parent, Permission::Write, true, "create a folder in")?;

        let mut current = parent;
        let mut first_new = None;
        for segment in relative.elements() {
            let next = self.node(current)?.children.get(segment).copied();
            match next {
                Some(existing) if self.node(existing)?.is_folder() => current = existing,
                Some(_) => {
                    return Err(VfsError::conflict(format!(
                        "{} exists and is a file",
                        self.path_of(current)?.new_path(segment)?
                    )));
                }
                None => {
                    current = self.insert_node(current, segment, NodeKind::Folder, Vec::new())?;
                    first_new.get_or_insert(current);
                }
            }
        }

        let Some(top) = first_new else {
            return Err(VfsError::conflict(format!(
                "{} already exists",
                self.path_of(current)?
            )));
        };
        self.index_add(top);
        let path = self.path_of(current)?;
        tracing::debug!(path = %path, "created folder");
        self.emit(VfsFlow::Created {
            workspace_id: self.workspace_id,
            path,
            is_folder: true,
        });
        Ok(current)
    }

    // ========================================================================
    // Content, properties, ACL
    // ========================================================================

    fn require_token(&self, id: NodeId, lock_token: Option<&str>, action: &str) -> VfsResult<()> {
        let node = self.node(id)?;
        if node.is_file() && !node.accepts_token(lock_token) {
            return Err(VfsError::forbidden(format!(
                "unable to {action} {}: item is locked and the lock token is missing or wrong",
                self.path_of(id)?
            )));
        }
        Ok(())
    }

    /// Replace a file's bytes.
    pub fn update_content(
        &mut self,
        id: NodeId,
        content: impl Into<Vec<u8>>,
        lock_token: Option<&str>,
    ) -> VfsResult<()> {
        self.require_file(id, "update content")?;
        self.require(id, Permission::Write, true, "update content of")?;
        self.require_token(id, lock_token, "update content of")?;

        let node = self.node_mut(id)?;
        node.content = content.into();
        node.touch();

        self.index_update(id);
        self.emit(VfsFlow::ContentUpdated {
            workspace_id: self.workspace_id,
            path: self.path_of(id)?,
        });
        Ok(())
    }

    /// Apply property changes: `Some(values)` sets, `None` (or an empty list)
    /// removes.
    pub fn update_properties<I>(
        &mut self,
        id: NodeId,
        updates: I,
        lock_token: Option<&str>,
    ) -> VfsResult<()>
    where
        I: IntoIterator<Item = (String, Option<Vec<String>>)>,
    {
        self.require(id, Permission::Write, true, "update properties of")?;
        self.require_token(id, lock_token, "update properties of")?;

        let node = self.node_mut(id)?;
        for (name, values) in updates {
            match values {
                Some(values) if !values.is_empty() => {
                    node.properties.insert(name, values);
                }
                _ => {
                    node.properties.remove(&name);
                }
            }
        }
        node.touch();
        let is_folder = node.is_folder();

        self.emit(VfsFlow::PropertiesUpdated {
            workspace_id: self.workspace_id,
            path: self.path_of(id)?,
            is_folder,
        });
        Ok(())
    }

    /// Set (or with `None`, remove) one single-valued property.
    pub fn set_property(&mut self, id: NodeId, name: &str, value: Option<&str>) -> VfsResult<()> {
        self.update_properties(
            id,
            [(name.to_string(), value.map(|v| vec![v.to_string()]))],
            None,
        )
    }

    /// Merge `entries` into the node's ACL, or replace it when `override_acl`.
    ///
    /// An entry with no permissions removes its principal.
    pub fn update_acl(
        &mut self,
        id: NodeId,
        entries: Vec<AccessControlEntry>,
        override_acl: bool,
        lock_token: Option<&str>,
    ) -> VfsResult<()> {
        self.require(id, Permission::UpdateAcl, true, "update ACL of")?;
        self.require_token(id, lock_token, "update ACL of")?;

        let node = self.node_mut(id)?;
        if override_acl {
            node.acl.clear();
        }
        for entry in entries {
            if entry.permissions.is_empty() {
                node.acl.remove(&entry.principal);
            } else {
                let perms: BTreeSet<Permission> = entry.permissions.into_iter().collect();
                node.acl.insert(entry.principal, perms);
            }
        }
        node.touch();
        let is_folder = node.is_folder();

        self.emit(VfsFlow::AclUpdated {
            workspace_id: self.workspace_id,
            path: self.path_of(id)?,
            is_folder,
        });
        Ok(())
    }

    // ========================================================================
    // Locks
    // ========================================================================

    /// Lock a file and return the token that unlocks it.
    ///
    /// `timeout_ms == 0` never expires. Expiry is checked when the lock is
    /// next looked at.
    pub fn lock(&mut self, id: NodeId, timeout_ms: u64) -> VfsResult<String> {
        self.require_file(id, "lock")?;
        self.require(id, Permission::Write, true, "lock")?;
        if self.node(id)?.is_locked() {
            return Err(VfsError::conflict(format!(
                "{} is already locked",
                self.path_of(id)?
            )));
        }

        let token = new_lock_token();
        let expiry = (timeout_ms > 0).then(|| SystemTime::now() + Duration::from_millis(timeout_ms));
        self.node_mut(id)?.lock = Some(LockHolder {
            token: token.clone(),
            expiry,
        });
        let path = self.path_of(id)?;
        tracing::debug!(path = %path, timeout_ms, "locked");
        Ok(token)
    }

    /// Release a file lock.
    pub fn unlock(&mut self, id: NodeId, lock_token: &str) -> VfsResult<()> {
        self.require_file(id, "unlock")?;
        let path = self.path_of(id)?;
        let node = self.node_mut(id)?;
        let Some(holder) = node.lock.as_ref() else {
            return Err(VfsError::conflict(format!("{path} is not locked")));
        };
        if holder.is_expired(SystemTime::now()) {
            node.lock = None;
            return Err(VfsError::conflict(format!("lock on {path} has expired")));
        }
        if holder.token != lock_token {
            return Err(VfsError::forbidden(format!(
                "unable to unlock {path}: lock token does not match"
            )));
        }
        node.lock = None;
        tracing::debug!(path = %path, "unlocked");
        Ok(())
    }

    // ========================================================================
    // Copy
    // ========================================================================

    /// Deep-copy `source` into folder `target`, optionally under a new name.
    ///
    /// With `overwrite`, an existing item of the same name is deleted first;
    /// a file is locked for the deletion so nobody can grab it in between.
    /// The copy keeps content and properties but starts with an empty ACL.
    pub fn copy_to(
        &mut self,
        source: NodeId,
        target: NodeId,
        new_name: Option<&str>,
        overwrite: bool,
    ) -> VfsResult<NodeId> {
        let src = self.node(source)?;
        if src.is_root() {
            return Err(VfsError::server("unable to copy the root folder"));
        }
        let name = new_name.unwrap_or(&src.name).to_string();
        check_name(&name)?;
        self.require_folder(target, "copy")?;
        self.require(target, Permission::Write, true, "copy into")?;

        let existing = self.node(target)?.children.get(&name).copied();
        if let Some(existing) = existing {
            if existing == source {
                return Err(VfsError::conflict(format!(
                    "unable to copy {} onto itself",
                    self.path_of(source)?
                )));
            }
            if !overwrite {
                return Err(VfsError::conflict(format!(
                    "{} already exists",
                    self.path_of(existing)?
                )));
            }
            self.refuse_replacing_ancestor(source, existing, "copy")?;
        }

        let snapshot = self.snapshot(source)?;

        if let Some(existing) = existing {
            if self.node(existing)?.is_file() {
                let token = self.lock(existing, 0)?;
                self.delete(existing, Some(&token))?;
            } else {
                self.delete(existing, None)?;
            }
        }

        let mut created: Vec<NodeId> = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            let (parent, entry_name) = match entry.parent {
                None => (target, name.as_str()),
                Some(i) => (created[i], entry.name.as_str()),
            };
            let id = self.insert_node(parent, entry_name, entry.kind, entry.content)?;
            self.node_mut(id)?.properties = entry.properties;
            created.push(id);
        }
        let copy = created[0];
        self.created(copy)?;
        Ok(copy)
    }

    fn snapshot(&self, source: NodeId) -> VfsResult<Vec<CopyEntry>> {
        let mut entries = Vec::new();
        // (node, index of its parent entry)
        let mut stack = vec![(source, None)];
        while let Some((id, parent)) = stack.pop() {
            let node = self.node(id)?;
            let index = entries.len();
            entries.push(CopyEntry {
                parent,
                name: node.name.clone(),
                kind: node.kind,
                content: node.content.clone(),
                properties: node.properties.clone(),
            });
            for &child in node.children.values().rev() {
                stack.push((child, Some(index)));
            }
        }
        Ok(entries)
    }

    // ========================================================================
    // Move and rename
    // ========================================================================

    /// Every node under `id` (inclusive) in post-order, after checking that
    /// each is writable and no file in it is locked.
    fn validated_subtree(&self, id: NodeId, action: &str) -> VfsResult<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                order.push(current);
                continue;
            }
            let node = self.node(current)?;
            if current != id {
                self.require(current, Permission::Write, false, action)?;
                if node.is_file() && node.is_locked() {
                    return Err(VfsError::forbidden(format!(
                        "unable to {action} {}: {} is locked",
                        self.path_of(id)?,
                        self.path_of(current)?
                    )));
                }
            }
            stack.push((current, true));
            for &child in node.children.values().rev() {
                stack.push((child, false));
            }
        }
        Ok(order)
    }

    /// Check that `id` may be restructured: its own lock token for a file,
    /// the whole subtree for a folder.
    fn validate_structural(&self, id: NodeId, lock_token: Option<&str>, action: &str) -> VfsResult<()> {
        if self.node(id)?.is_folder() {
            self.validated_subtree(id, action)?;
            Ok(())
        } else {
            self.require_token(id, lock_token, action)
        }
    }

    /// Overwriting `existing` must not delete `source` along with it.
    fn refuse_replacing_ancestor(
        &self,
        source: NodeId,
        existing: NodeId,
        action: &str,
    ) -> VfsResult<()> {
        let source_path = self.path_of(source)?;
        let existing_path = self.path_of(existing)?;
        if source_path.starts_with(&existing_path) {
            return Err(VfsError::conflict(format!(
                "unable to {action} {source_path} over {existing_path}, which contains it"
            )));
        }
        Ok(())
    }

    /// Move `source` into folder `target`, optionally renaming it.
    pub fn move_to(
        &mut self,
        source: NodeId,
        target: NodeId,
        new_name: Option<&str>,
        overwrite: bool,
        lock_token: Option<&str>,
    ) -> VfsResult<NodeId> {
        let src = self.node(source)?;
        if src.is_root() {
            return Err(VfsError::forbidden("unable to move the root folder"));
        }
        let name = new_name.unwrap_or(&src.name).to_string();
        check_name(&name)?;
        self.require_folder(target, "move")?;

        let old_path = self.path_of(source)?;
        let target_path = self.path_of(target)?;
        if target_path.starts_with(&old_path) {
            return Err(VfsError::forbidden(format!(
                "unable to move {old_path} into itself ({target_path})"
            )));
        }
        self.require(source, Permission::Write, true, "move")?;
        self.require(target, Permission::Write, true, "move into")?;
        self.validate_structural(source, lock_token, "move")?;

        let existing = self.node(target)?.children.get(&name).copied();
        if let Some(existing) = existing {
            if existing == source || !overwrite {
                return Err(VfsError::conflict(format!(
                    "{} already exists",
                    self.path_of(existing)?
                )));
            }
            self.refuse_replacing_ancestor(source, existing, "move")?;
            self.delete(existing, None)?;
        }

        self.relink(source, target, &name)?;
        let path = self.path_of(source)?;
        let is_folder = self.node(source)?.is_folder();
        tracing::debug!(from = %old_path, to = %path, "moved");
        self.index_delete(&old_path, !is_folder);
        self.index_add(source);
        self.emit(VfsFlow::Moved {
            workspace_id: self.workspace_id,
            path,
            old_path,
            is_folder,
        });
        Ok(source)
    }

    /// Rename in place.
    pub fn rename(&mut self, id: NodeId, new_name: &str, lock_token: Option<&str>) -> VfsResult<NodeId> {
        check_name(new_name)?;
        let Some(parent) = self.node(id)?.parent else {
            return Err(VfsError::forbidden("unable to rename the root folder"));
        };
        self.require(id, Permission::Write, true, "rename")?;
        if self.has_child(parent, new_name)? {
            return Err(VfsError::conflict(format!(
                "{} already exists",
                self.path_of(parent)?.new_path(new_name)?
            )));
        }
        self.validate_structural(id, lock_token, "rename")?;

        let old_path = self.path_of(id)?;
        self.relink(id, parent, new_name)?;
        let path = self.path_of(id)?;
        let is_folder = self.node(id)?.is_folder();
        tracing::debug!(from = %old_path, to = %path, "renamed");
        self.index_delete(&old_path, !is_folder);
        self.index_add(id);
        self.emit(VfsFlow::Renamed {
            workspace_id: self.workspace_id,
            path,
            old_path,
            is_folder,
        });
        Ok(id)
    }

    /// Detach `id` from its parent and attach it to `parent` as `name`.
    fn relink(&mut self, id: NodeId, parent: NodeId, name: &str) -> VfsResult<()> {
        let node = self.node(id)?;
        let old_name = node.name.clone();
        let old_parent = node
            .parent
            .ok_or_else(|| VfsError::server("root has no parent to detach from"))?;

        let from = self.node_mut(old_parent)?;
        from.children.remove(&old_name);
        from.touch();

        let to = self.node_mut(parent)?;
        to.children.insert(name.to_string(), id);
        to.touch();

        self.move_clock += 1;
        let clock = self.move_clock;
        let node = self.node_mut(id)?;
        node.name = name.to_string();
        node.parent = Some(parent);
        node.moved_at = clock;
        node.touch();
        Ok(())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete `id` and everything below it.
    ///
    /// Fails without changing anything if any descendant is locked or not
    /// writable.
    pub fn delete(&mut self, id: NodeId, lock_token: Option<&str>) -> VfsResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Err(VfsError::forbidden("unable to delete the root folder"));
        };
        self.require(id, Permission::Write, true, "delete")?;
        self.require_token(id, lock_token, "delete")?;
        let doomed = self.validated_subtree(id, "delete")?;

        let path = self.path_of(id)?;
        let is_folder = self.node(id)?.is_folder();
        let mut paths = Vec::with_capacity(doomed.len());
        for &victim in &doomed {
            paths.push(self.path_of(victim)?);
        }

        let name = self.node(id)?.name.clone();
        let parent_node = self.node_mut(parent)?;
        parent_node.children.remove(&name);
        parent_node.touch();
        for (victim, victim_path) in doomed.into_iter().zip(paths) {
            self.nodes.remove(&victim);
            self.tombstones.insert(victim, victim_path);
        }

        tracing::debug!(path = %path, is_folder, "deleted");
        self.index_delete(&path, !is_folder);
        self.emit(VfsFlow::Deleted {
            workspace_id: self.workspace_id,
            path,
            is_folder,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hako_types::{Principal, SequentialIds};

    use crate::types::NodeState;

    fn mount() -> MountPoint {
        MountPoint::builder()
            .id_generator(Arc::new(SequentialIds::new()))
            .build()
    }

    fn path(s: &str) -> Path {
        Path::of(s).unwrap()
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("ok.txt").is_ok());
        for bad in ["", "   ", "a/b", ".", ".."] {
            assert!(matches!(check_name(bad), Err(VfsError::InvalidPath(_))), "{bad}");
        }
    }

    #[test]
    fn test_create_file_conflict() {
        let mut m = mount();
        let root = m.root();
        m.create_file(root, "f", b"1".to_vec()).unwrap();
        assert!(matches!(
            m.create_file(root, "f", b"2".to_vec()),
            Err(VfsError::Conflict(_))
        ));
    }

    #[test]
    fn test_create_in_file_is_forbidden() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        assert!(matches!(m.create_file(f, "g", Vec::new()), Err(VfsError::Forbidden(_))));
        assert!(matches!(m.create_folder(f, "g"), Err(VfsError::Forbidden(_))));
    }

    #[test]
    fn test_nested_create_folder() {
        let mut m = mount();
        let root = m.root();
        let c = m.create_folder(root, "a/b/c").unwrap();
        assert_eq!(m.path_of(c).unwrap(), path("/a/b/c"));
        assert_eq!(m.len(), 4);

        let d = m.create_folder(root, "a/b/d").unwrap();
        assert_eq!(m.path_of(d).unwrap(), path("/a/b/d"));
        assert!(matches!(m.create_folder(root, "a/b"), Err(VfsError::Conflict(_))));
    }

    #[test]
    fn test_create_folder_through_file_conflicts() {
        let mut m = mount();
        let root = m.root();
        m.create_file(root, "f", Vec::new()).unwrap();
        assert!(matches!(m.create_folder(root, "f/x"), Err(VfsError::Conflict(_))));
    }

    #[test]
    fn test_update_content_needs_token_when_locked() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", b"old".to_vec()).unwrap();
        let token = m.lock(f, 0).unwrap();
        assert_eq!(token.len(), LOCK_TOKEN_LEN);
        assert!(m.is_locked(f).unwrap());

        assert!(matches!(
            m.update_content(f, b"new".to_vec(), None),
            Err(VfsError::Forbidden(_))
        ));
        m.update_content(f, b"new".to_vec(), Some(&token)).unwrap();
        assert_eq!(m.get_content(f).unwrap(), b"new");
    }

    #[test]
    fn test_lock_rules() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();

        assert!(matches!(m.lock(root, 0), Err(VfsError::Forbidden(_))));
        assert!(matches!(m.unlock(f, "x"), Err(VfsError::Conflict(_))));

        let token = m.lock(f, 0).unwrap();
        assert!(matches!(m.lock(f, 0), Err(VfsError::Conflict(_))));
        assert!(matches!(m.unlock(f, "wrong"), Err(VfsError::Forbidden(_))));
        m.unlock(f, &token).unwrap();
        assert!(!m.is_locked(f).unwrap());
    }

    #[test]
    fn test_unlock_after_expiry_conflicts() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        let token = m.lock(f, 1).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!m.is_locked(f).unwrap());
        assert!(matches!(m.unlock(f, &token), Err(VfsError::Conflict(_))));
        // expired lock no longer blocks writers
        m.update_content(f, b"x".to_vec(), None).unwrap();
    }

    #[test]
    fn test_properties() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        m.update_properties(
            f,
            [
                ("tags".to_string(), Some(vec!["a".to_string(), "b".to_string()])),
                ("mime".to_string(), Some(vec!["text/plain".to_string()])),
            ],
            None,
        )
        .unwrap();
        assert_eq!(m.get_property(f, "tags").unwrap(), Some("a"));
        assert_eq!(m.get_property_values(f, "tags").unwrap().unwrap().len(), 2);

        m.set_property(f, "tags", None).unwrap();
        assert_eq!(m.get_property(f, "tags").unwrap(), None);
        assert_eq!(m.get_properties(f).unwrap().len(), 1);
    }

    #[test]
    fn test_update_acl_merge_and_override() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        let amy = Principal::user("amy");
        let bob = Principal::user("bob");

        m.update_acl(
            f,
            vec![
                AccessControlEntry::new(amy.clone(), [Permission::Read]),
                AccessControlEntry::new(bob.clone(), [Permission::Write]),
            ],
            false,
            None,
        )
        .unwrap();
        assert_eq!(m.get_acl(f).unwrap().len(), 2);

        m.update_acl(f, vec![AccessControlEntry::revoke(bob.clone())], false, None)
            .unwrap();
        assert!(!m.permissions(f).unwrap().contains_key(&bob));

        m.update_acl(
            f,
            vec![AccessControlEntry::new(bob.clone(), [Permission::All])],
            true,
            None,
        )
        .unwrap();
        let acl = m.permissions(f).unwrap();
        assert_eq!(acl.len(), 1);
        assert!(acl.contains_key(&bob));
    }

    #[test]
    fn test_rename() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let f = m.create_file(a, "f", Vec::new()).unwrap();
        m.create_file(root, "taken", Vec::new()).unwrap();

        assert_eq!(m.path_of(f).unwrap(), path("/a/f"));
        m.rename(a, "b", None).unwrap();
        assert_eq!(m.path_of(f).unwrap(), path("/b/f"));
        assert!(matches!(m.rename(a, "taken", None), Err(VfsError::Conflict(_))));
        assert!(matches!(m.rename(root, "x", None), Err(VfsError::Forbidden(_))));
    }

    #[test]
    fn test_rename_locked_file_needs_token() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        let token = m.lock(f, 0).unwrap();
        assert!(matches!(m.rename(f, "g", None), Err(VfsError::Forbidden(_))));
        m.rename(f, "g", Some(&token)).unwrap();
        assert_eq!(m.path_of(f).unwrap(), path("/g"));
    }

    #[test]
    fn test_move_cycle_guard() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let b = m.create_folder(a, "b").unwrap();
        assert!(matches!(m.move_to(a, b, None, false, None), Err(VfsError::Forbidden(_))));
        assert!(matches!(m.move_to(a, a, None, false, None), Err(VfsError::Forbidden(_))));
        assert!(matches!(m.move_to(root, a, None, false, None), Err(VfsError::Forbidden(_))));
    }

    #[test]
    fn test_move_with_locked_descendant_fails_untouched() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let dest = m.create_folder(root, "dest").unwrap();
        let f = m.create_file(a, "f", Vec::new()).unwrap();
        let token = m.lock(f, 0).unwrap();

        assert!(matches!(m.move_to(a, dest, None, false, None), Err(VfsError::Forbidden(_))));
        assert_eq!(m.path_of(f).unwrap(), path("/a/f"));

        m.unlock(f, &token).unwrap();
        m.move_to(a, dest, None, false, None).unwrap();
        assert_eq!(m.path_of(f).unwrap(), path("/dest/a/f"));
    }

    #[test]
    fn test_move_overwrite() {
        let mut m = mount();
        let root = m.root();
        let dest = m.create_folder(root, "dest").unwrap();
        let f = m.create_file(root, "f", b"new".to_vec()).unwrap();
        let old = m.create_file(dest, "f", b"old".to_vec()).unwrap();

        assert!(matches!(m.move_to(f, dest, None, false, None), Err(VfsError::Conflict(_))));
        m.move_to(f, dest, None, true, None).unwrap();
        assert_eq!(m.state(old), Some(NodeState::Deleted));
        assert_eq!(m.get_by_path(&path("/dest/f")).unwrap(), f);
        assert!(!m.has_child(root, "f").unwrap());
    }

    #[test]
    fn test_copy_preserves_properties_and_content() {
        let mut m = mount();
        let root = m.root();
        let src = m.create_folder(root, "src").unwrap();
        let f = m.create_file(src, "f", b"abc".to_vec()).unwrap();
        m.set_property(f, "k", Some("v")).unwrap();
        m.create_folder(src, "sub/deeper").unwrap();
        let dest = m.create_folder(root, "dest").unwrap();

        let copy = m.copy_to(src, dest, Some("copy"), false).unwrap();
        assert_ne!(copy, src);
        let cf = m.get_by_path(&path("/dest/copy/f")).unwrap();
        assert_ne!(cf, f);
        assert_eq!(m.get_content(cf).unwrap(), b"abc");
        assert_eq!(m.get_property(cf, "k").unwrap(), Some("v"));
        assert!(m.exists(&path("/dest/copy/sub/deeper")));
        assert!(m.permissions(copy).unwrap().is_empty());
        // source untouched
        assert_eq!(m.get_by_path(&path("/src/f")).unwrap(), f);
    }

    #[test]
    fn test_copy_into_own_subtree() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let b = m.create_folder(a, "b").unwrap();
        m.copy_to(a, b, None, false).unwrap();
        assert!(m.exists(&path("/a/b/a/b")));
        assert!(!m.exists(&path("/a/b/a/b/a")));
    }

    #[test]
    fn test_copy_root_fails() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        assert!(matches!(m.copy_to(root, a, None, false), Err(VfsError::Server(_))));
    }

    #[test]
    fn test_copy_overwrite_locked_target_conflicts() {
        let mut m = mount();
        let root = m.root();
        let dest = m.create_folder(root, "dest").unwrap();
        let f = m.create_file(root, "f", b"new".to_vec()).unwrap();
        let old = m.create_file(dest, "f", b"old".to_vec()).unwrap();
        m.lock(old, 0).unwrap();
        assert!(matches!(m.copy_to(f, dest, None, true), Err(VfsError::Conflict(_))));
        assert_eq!(m.get_content(old).unwrap(), b"old");
    }

    #[test]
    fn test_delete_tombstones_subtree() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let f = m.create_file(a, "f", Vec::new()).unwrap();
        m.delete(a, None).unwrap();

        assert_eq!(m.state(a), Some(NodeState::Deleted));
        assert_eq!(m.state(f), Some(NodeState::Deleted));
        assert!(matches!(m.node(f), Err(VfsError::ItemRemoved(_))));
        assert!(matches!(
            m.update_content(f, Vec::new(), None),
            Err(VfsError::ItemRemoved(_))
        ));
        assert_eq!(m.len(), 1);
        assert!(matches!(m.delete(root, None), Err(VfsError::Forbidden(_))));
    }

    #[test]
    fn test_delete_locked_file_needs_token() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        let token = m.lock(f, 0).unwrap();
        assert!(matches!(m.delete(f, None), Err(VfsError::Forbidden(_))));
        m.delete(f, Some(&token)).unwrap();
        assert_eq!(m.state(f), Some(NodeState::Deleted));
    }

    #[test]
    fn test_mutations_publish_flows() {
        let mut m = mount();
        let mut sub = m.flows().subscribe("vfs.>");
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        m.rename(a, "b", None).unwrap();
        m.delete(a, None).unwrap();

        let subjects: Vec<String> = std::iter::from_fn(|| sub.try_recv())
            .map(|msg| msg.subject)
            .collect();
        assert_eq!(subjects, vec!["vfs.created", "vfs.renamed", "vfs.deleted"]);
    }
}
