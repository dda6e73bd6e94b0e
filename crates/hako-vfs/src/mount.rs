//! The mount point: one in-memory file tree.
//!
//! Nodes live in a flat `id -> node` arena that doubles as the index of
//! every active node. Deleted ids move to a tombstone table so stale handles
//! fail with [`VfsError::ItemRemoved`] instead of [`VfsError::NotFound`].
//!
//! A `MountPoint` is single-writer: mutations take `&mut self`. Share one
//! across threads through [`crate::Workspace`], which adds path locks.
//!
//! Lookups live here; mutations are in `ops.rs`, traversal in `walk.rs` and
//! archive import/export in `archive/`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use hako_types::{
    AccessControlEntry, Acl, IdGenerator, NodeId, Permission, Principal, UuidIds, WorkspaceId,
    acl_entries,
};

use crate::access::{AllowAll, Authorizer};
use crate::config::{ConfigError, DEFAULT_DEVELOPER_GROUP, DEFAULT_FLOW_CAPACITY, VfsConfig};
use crate::error::{VfsError, VfsResult};
use crate::flows::{FlowBus, VfsFlow};
use crate::index::{NoopIndexer, SearchIndexer};
use crate::node::Node;
use crate::path::Path;
use crate::types::{ItemInfo, NodeKind, NodeState, Properties};

/// Predicate selecting paths whose READ/WRITE checks are skipped.
pub type PathPredicate = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// One in-memory file tree.
pub struct MountPoint {
    pub(crate) workspace_id: WorkspaceId,
    pub(crate) root: NodeId,
    pub(crate) nodes: HashMap<NodeId, Node>,
    /// Deleted ids and the path they had when removed.
    pub(crate) tombstones: HashMap<NodeId, Path>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) indexer: Arc<dyn SearchIndexer>,
    pub(crate) flows: FlowBus<VfsFlow>,
    pub(crate) unchecked: Option<PathPredicate>,
    /// Ticks on every move or rename. A cached path taken at clock `t` is
    /// stale once the node or any ancestor has `moved_at > t`.
    pub(crate) move_clock: u64,
}

// ============================================================================
// Construction
// ============================================================================

/// Builder for [`MountPoint`].
pub struct MountPointBuilder {
    workspace_id: Option<WorkspaceId>,
    ids: Arc<dyn IdGenerator>,
    authorizer: Arc<dyn Authorizer>,
    indexer: Arc<dyn SearchIndexer>,
    flows: Option<FlowBus<VfsFlow>>,
    flow_capacity: usize,
    unchecked: Option<PathPredicate>,
    developer_group: String,
}

impl Default for MountPointBuilder {
    fn default() -> Self {
        Self {
            workspace_id: None,
            ids: Arc::new(UuidIds),
            authorizer: Arc::new(AllowAll),
            indexer: Arc::new(NoopIndexer),
            flows: None,
            flow_capacity: DEFAULT_FLOW_CAPACITY,
            unchecked: None,
            developer_group: DEFAULT_DEVELOPER_GROUP.to_string(),
        }
    }
}

impl MountPointBuilder {
    pub fn workspace_id(mut self, id: WorkspaceId) -> Self {
        self.workspace_id = Some(id);
        self
    }

    /// Strategy for minting node ids. Defaults to UUIDv7.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn indexer(mut self, indexer: Arc<dyn SearchIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    /// Publish on an existing bus instead of a private one.
    pub fn flows(mut self, flows: FlowBus<VfsFlow>) -> Self {
        self.flows = Some(flows);
        self
    }

    pub fn flow_capacity(mut self, capacity: usize) -> Self {
        self.flow_capacity = capacity;
        self
    }

    /// Skip READ/WRITE checks for paths matching `predicate`.
    pub fn unchecked(mut self, predicate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.unchecked = Some(Arc::new(predicate));
        self
    }

    /// Skip READ/WRITE checks for exactly these paths.
    pub fn unchecked_paths(self, paths: Vec<Path>) -> Self {
        if paths.is_empty() {
            return self;
        }
        self.unchecked(move |p| paths.contains(p))
    }

    /// Group granted ALL on the root.
    pub fn developer_group(mut self, group: impl Into<String>) -> Self {
        self.developer_group = group.into();
        self
    }

    pub fn build(self) -> MountPoint {
        let root_id = self.ids.next_id();
        let mut root = Node::new(root_id, String::new(), NodeKind::Folder, None);
        root.acl
            .insert(Principal::group(self.developer_group), BTreeSet::from([Permission::All]));
        root.acl
            .insert(Principal::any(), BTreeSet::from([Permission::Read]));

        let workspace_id = self.workspace_id.unwrap_or_default();
        tracing::debug!(workspace = %workspace_id.short(), root = %root_id.short(), "mount point created");

        MountPoint {
            workspace_id,
            root: root_id,
            nodes: HashMap::from([(root_id, root)]),
            tombstones: HashMap::new(),
            ids: self.ids,
            authorizer: self.authorizer,
            indexer: self.indexer,
            flows: self
                .flows
                .unwrap_or_else(|| FlowBus::new(self.flow_capacity)),
            unchecked: self.unchecked,
            move_clock: 0,
        }
    }
}

impl MountPoint {
    /// Empty tree for `workspace_id` with default collaborators.
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self::builder().workspace_id(workspace_id).build()
    }

    pub fn builder() -> MountPointBuilder {
        MountPointBuilder::default()
    }

    pub fn from_config(config: &VfsConfig) -> Result<Self, ConfigError> {
        Ok(Self::builder_from_config(config)?.build())
    }

    /// Builder preloaded from `config`, for adding collaborators.
    pub fn builder_from_config(config: &VfsConfig) -> Result<MountPointBuilder, ConfigError> {
        Ok(Self::builder()
            .workspace_id(config.workspace_id()?)
            .flow_capacity(config.flow_capacity)
            .unchecked_paths(config.unchecked_paths()?)
            .developer_group(config.developer_group.clone()))
    }
}

// ============================================================================
// Accessors and lookups
// ============================================================================

impl MountPoint {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn flows(&self) -> &FlowBus<VfsFlow> {
        &self.flows
    }

    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    /// Number of active nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Whether `id` is active, deleted, or unknown (`None`).
    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        if self.nodes.contains_key(&id) {
            Some(NodeState::Active)
        } else if self.tombstones.contains_key(&id) {
            Some(NodeState::Deleted)
        } else {
            None
        }
    }

    /// The node behind `id`, without permission checks.
    pub fn node(&self, id: NodeId) -> VfsResult<&Node> {
        match self.nodes.get(&id) {
            Some(node) => Ok(node),
            None => Err(self.missing(id)),
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> VfsResult<&mut Node> {
        if !self.nodes.contains_key(&id) {
            return Err(self.missing(id));
        }
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| VfsError::not_found(id.to_string()))
    }

    fn missing(&self, id: NodeId) -> VfsError {
        match self.tombstones.get(&id) {
            Some(path) => VfsError::item_removed(format!("{path} was already removed")),
            None => VfsError::not_found(format!("no item with id {id}")),
        }
    }

    /// Look up a node by id. Requires READ.
    pub fn get_by_id(&self, id: NodeId) -> VfsResult<&Node> {
        let node = self.node(id)?;
        if !self.may(id, Permission::Read, true)? {
            return Err(VfsError::forbidden(format!(
                "not allowed to read {}",
                self.path_of(id)?
            )));
        }
        Ok(node)
    }

    /// Resolve an absolute path from the root.
    pub fn get_by_path(&self, path: &Path) -> VfsResult<NodeId> {
        if path.is_empty() {
            return Ok(self.root);
        }
        self.child_at(self.root, path)?
            .ok_or_else(|| VfsError::not_found(path.to_string()))
    }

    /// Resolve `relative` below `parent`, one segment at a time.
    ///
    /// Every hop needs READ on the node reached, unless its path is
    /// unchecked. Returns `Ok(None)` if some segment does not exist.
    pub fn get_child(&self, parent: NodeId, relative: &str) -> VfsResult<Option<NodeId>> {
        let relative = Path::of(relative)?;
        self.child_at(parent, &relative)
    }

    fn child_at(&self, parent: NodeId, relative: &Path) -> VfsResult<Option<NodeId>> {
        let mut current = parent;
        for name in relative.elements() {
            let node = self.node(current)?;
            let Some(&next) = node.children.get(name) else {
                return Ok(None);
            };
            if !self.may(next, Permission::Read, false)? {
                return Err(VfsError::forbidden(format!(
                    "not allowed to read {}",
                    self.path_of(next)?
                )));
            }
            current = next;
        }
        Ok(Some(current))
    }

    pub fn has_child(&self, parent: NodeId, name: &str) -> VfsResult<bool> {
        Ok(self.node(parent)?.children.contains_key(name))
    }

    /// True if `path` resolves to a node the caller can read.
    pub fn exists(&self, path: &Path) -> bool {
        self.get_by_path(path).is_ok()
    }

    /// Readable children of `folder` that pass `filter`, folders first, then
    /// by name. Files have no children.
    pub fn get_children(
        &self,
        folder: NodeId,
        filter: impl Fn(&Node) -> bool,
    ) -> VfsResult<Vec<NodeId>> {
        let node = self.node(folder)?;
        if node.is_file() {
            return Ok(Vec::new());
        }
        if node.is_root() && !self.may(folder, Permission::Read, false)? {
            return Ok(Vec::new());
        }

        let mut children = Vec::with_capacity(node.children.len());
        for &id in node.children.values() {
            let child = self.node(id)?;
            if self.may(id, Permission::Read, false)? && filter(child) {
                children.push(child);
            }
        }
        children.sort_by(|a, b| {
            b.is_folder()
                .cmp(&a.is_folder())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(children.into_iter().map(|n| n.id).collect())
    }

    /// Absolute path of `id`, cached per node. Moving or renaming a node
    /// invalidates its own cache; descendants notice on their next lookup.
    pub fn path_of(&self, id: NodeId) -> VfsResult<Path> {
        let node = self.node(id)?;
        if let Some(path) = self.cached_path(node) {
            return Ok(path);
        }

        let mut names = Vec::new();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            let Some(parent) = current.parent else {
                break;
            };
            names.push(current.name.clone());
            cursor = self.nodes.get(&parent);
        }
        names.reverse();
        let path = Path::from_parts(names, true);
        *node.path_cache.lock() = Some((self.move_clock, path.clone()));
        Ok(path)
    }

    /// The cached path of `node` if nothing on its parent chain has moved
    /// since it was taken.
    pub(crate) fn cached_path(&self, node: &Node) -> Option<Path> {
        let (taken_at, path) = node.path_cache.lock().clone()?;
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current.moved_at > taken_at {
                return None;
            }
            cursor = current.parent.and_then(|p| self.nodes.get(&p));
        }
        Some(path)
    }

    pub fn parent_of(&self, id: NodeId) -> VfsResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// Metadata snapshot of `id`.
    pub fn stat(&self, id: NodeId) -> VfsResult<ItemInfo> {
        let node = self.node(id)?;
        Ok(ItemInfo {
            id,
            name: node.name.clone(),
            path: self.path_of(id)?,
            kind: node.kind,
            length: node.length(),
            created_at: node.created_at,
            modified_at: node.modified_at,
            locked: node.is_file() && node.is_locked(),
            properties: node.properties.clone(),
        })
    }

    // ── Content ─────────────────────────────────────────────────────────────

    pub fn get_content(&self, id: NodeId) -> VfsResult<&[u8]> {
        let node = self.node(id)?;
        if !node.is_file() {
            return Err(VfsError::forbidden(format!(
                "{} is not a file",
                self.path_of(id)?
            )));
        }
        Ok(&node.content)
    }

    pub fn get_content_as_string(&self, id: NodeId) -> VfsResult<String> {
        Ok(String::from_utf8_lossy(self.get_content(id)?).into_owned())
    }

    /// Content length in bytes; 0 for folders.
    pub fn get_length(&self, id: NodeId) -> VfsResult<u64> {
        Ok(self.node(id)?.length())
    }

    pub fn is_locked(&self, id: NodeId) -> VfsResult<bool> {
        let node = self.node(id)?;
        Ok(node.is_file() && node.is_locked())
    }

    // ── Properties and ACL (read side) ──────────────────────────────────────

    pub fn get_properties(&self, id: NodeId) -> VfsResult<&Properties> {
        Ok(&self.node(id)?.properties)
    }

    /// First value of property `name`.
    pub fn get_property(&self, id: NodeId, name: &str) -> VfsResult<Option<&str>> {
        Ok(self
            .node(id)?
            .properties
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str))
    }

    pub fn get_property_values(&self, id: NodeId, name: &str) -> VfsResult<Option<&[String]>> {
        Ok(self.node(id)?.properties.get(name).map(Vec::as_slice))
    }

    pub fn get_acl(&self, id: NodeId) -> VfsResult<Vec<AccessControlEntry>> {
        Ok(acl_entries(&self.node(id)?.acl))
    }

    /// Raw ACL map of `id`.
    pub fn permissions(&self, id: NodeId) -> VfsResult<&Acl> {
        Ok(&self.node(id)?.acl)
    }
}

// ============================================================================
// Internal helpers shared by the mutation, walk and archive modules
// ============================================================================

impl MountPoint {
    pub(crate) fn is_unchecked(&self, path: &Path) -> bool {
        self.unchecked.as_ref().is_some_and(|f| f(path))
    }

    /// Permission check honoring the unchecked-path predicate.
    pub(crate) fn may(&self, id: NodeId, permission: Permission, check_parent: bool) -> VfsResult<bool> {
        if matches!(permission, Permission::Read | Permission::Write)
            && self.unchecked.is_some()
            && self.is_unchecked(&self.path_of(id)?)
        {
            return Ok(true);
        }
        Ok(self
            .authorizer
            .has_permission(self, id, permission, check_parent))
    }

    pub(crate) fn require(
        &self,
        id: NodeId,
        permission: Permission,
        check_parent: bool,
        action: &str,
    ) -> VfsResult<()> {
        if self.may(id, permission, check_parent)? {
            Ok(())
        } else {
            Err(VfsError::forbidden(format!(
                "not allowed to {action} {}: missing {permission} permission",
                self.path_of(id)?
            )))
        }
    }

    pub(crate) fn require_folder(&self, id: NodeId, action: &str) -> VfsResult<&Node> {
        let node = self.node(id)?;
        if !node.is_folder() {
            return Err(VfsError::forbidden(format!(
                "unable to {action}: {} is not a folder",
                self.path_of(id)?
            )));
        }
        Ok(node)
    }

    pub(crate) fn require_file(&self, id: NodeId, action: &str) -> VfsResult<&Node> {
        let node = self.node(id)?;
        if !node.is_file() {
            return Err(VfsError::forbidden(format!(
                "unable to {action}: {} is not a file",
                self.path_of(id)?
            )));
        }
        Ok(node)
    }

    pub(crate) fn emit(&self, flow: VfsFlow) {
        let delivered = self.flows.publish(flow);
        tracing::trace!(delivered, "published vfs flow");
    }

    pub(crate) fn index_add(&self, id: NodeId) {
        match self.stat(id) {
            Ok(info) => {
                if let Err(e) = self.indexer.add(&info) {
                    tracing::warn!(path = %info.path, error = %e, "search index add failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "search index add skipped"),
        }
    }

    pub(crate) fn index_update(&self, id: NodeId) {
        match self.stat(id) {
            Ok(info) => {
                if let Err(e) = self.indexer.update(&info) {
                    tracing::warn!(path = %info.path, error = %e, "search index update failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "search index update skipped"),
        }
    }

    pub(crate) fn index_delete(&self, path: &Path, is_file: bool) {
        if let Err(e) = self.indexer.delete(path, is_file) {
            tracing::warn!(path = %path, error = %e, "search index delete failed");
        }
    }
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("workspace_id", &self.workspace_id)
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("tombstones", &self.tombstones.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hako_types::{IdGenerator as _, SequentialIds};

    fn mount() -> MountPoint {
        MountPoint::builder()
            .id_generator(Arc::new(SequentialIds::new()))
            .build()
    }

    #[test]
    fn test_root_exists() {
        let m = mount();
        let root = m.node(m.root()).unwrap();
        assert!(root.is_folder());
        assert!(root.is_root());
        assert_eq!(m.path_of(m.root()).unwrap(), Path::root());
        assert_eq!(m.get_by_path(&Path::root()).unwrap(), m.root());
        assert_eq!(m.len(), 1);
        assert!(m.is_empty());
    }

    #[test]
    fn test_deterministic_ids() {
        let mut m = mount();
        let expected = SequentialIds::new();
        assert_eq!(m.root(), expected.next_id());
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        assert_eq!(a, expected.next_id());
    }

    #[test]
    fn test_lookup_by_path_and_child() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let f = m.create_file(a, "f.txt", b"hi".to_vec()).unwrap();

        assert_eq!(m.get_by_path(&Path::of("/a/f.txt").unwrap()).unwrap(), f);
        assert_eq!(m.get_child(root, "a/f.txt").unwrap(), Some(f));
        assert_eq!(m.get_child(root, "a/nope").unwrap(), None);
        assert!(m.has_child(a, "f.txt").unwrap());
        assert!(m.exists(&Path::of("/a").unwrap()));
        assert!(!m.exists(&Path::of("/b").unwrap()));
        assert!(matches!(
            m.get_by_path(&Path::of("/b").unwrap()),
            Err(VfsError::NotFound(_))
        ));
        assert_eq!(m.parent_of(f).unwrap(), Some(a));
    }

    #[test]
    fn test_children_sorted_folders_first() {
        let mut m = mount();
        let root = m.root();
        m.create_file(root, "b.txt", Vec::new()).unwrap();
        m.create_folder(root, "z").unwrap();
        m.create_file(root, "a.txt", Vec::new()).unwrap();
        m.create_folder(root, "c").unwrap();

        let names: Vec<String> = m
            .get_children(root, |_| true)
            .unwrap()
            .into_iter()
            .map(|id| m.node(id).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "z", "a.txt", "b.txt"]);

        let files = m.get_children(root, |n| n.is_file()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_children_of_file_is_empty() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", Vec::new()).unwrap();
        assert!(m.get_children(f, |_| true).unwrap().is_empty());
    }

    #[test]
    fn test_stat_and_content() {
        let mut m = mount();
        let root = m.root();
        let f = m.create_file(root, "f", b"abc".to_vec()).unwrap();
        let info = m.stat(f).unwrap();
        assert_eq!(info.length, 3);
        assert!(info.is_file());
        assert!(!info.locked);
        assert_eq!(info.path.to_string(), "/f");
        assert_eq!(m.get_content_as_string(f).unwrap(), "abc");
        assert_eq!(m.get_length(root).unwrap(), 0);
        assert!(matches!(m.get_content(root), Err(VfsError::Forbidden(_))));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let m = mount();
        assert!(matches!(m.node(NodeId::nil()), Err(VfsError::NotFound(_))));
        assert_eq!(m.state(NodeId::nil()), None);
    }

    #[test]
    fn test_default_root_acl() {
        let m = mount();
        let acl = m.permissions(m.root()).unwrap();
        assert_eq!(
            acl.get(&Principal::group(DEFAULT_DEVELOPER_GROUP)),
            Some(&BTreeSet::from([Permission::All]))
        );
        assert_eq!(
            acl.get(&Principal::any()),
            Some(&BTreeSet::from([Permission::Read]))
        );
    }

    #[test]
    fn test_from_config() {
        let config = VfsConfig::from_toml_str("developer_group = \"devs\"").unwrap();
        let m = MountPoint::from_config(&config).unwrap();
        let acl = m.permissions(m.root()).unwrap();
        assert!(acl.contains_key(&Principal::group("devs")));
    }

    #[test]
    fn test_rename_only_invalidates_moved_subtree() {
        let mut m = mount();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        let f = m.create_file(a, "f", Vec::new()).unwrap();
        let b = m.create_folder(root, "b").unwrap();
        let g = m.create_file(b, "g", Vec::new()).unwrap();
        m.path_of(f).unwrap();
        m.path_of(g).unwrap();

        m.rename(a, "renamed", None).unwrap();

        // the unrelated subtree keeps its cache
        assert_eq!(
            m.cached_path(m.node(g).unwrap()),
            Some(Path::of("/b/g").unwrap())
        );
        // the moved folder and its descendants recompute
        assert_eq!(m.cached_path(m.node(a).unwrap()), None);
        assert_eq!(m.cached_path(m.node(f).unwrap()), None);
        assert_eq!(m.path_of(f).unwrap().to_string(), "/renamed/f");
        assert_eq!(
            m.cached_path(m.node(f).unwrap()),
            Some(Path::of("/renamed/f").unwrap())
        );
    }
}
