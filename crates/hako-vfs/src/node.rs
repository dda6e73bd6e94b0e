//! Tree nodes.
//!
//! Nodes live in the mount point's arena and refer to each other by
//! [`NodeId`]: a folder owns its `name -> id` children map, a child only
//! remembers its parent's id.

use std::collections::BTreeMap;
use std::time::SystemTime;

use hako_types::{Acl, NodeId};
use parking_lot::Mutex;

use crate::path::Path;
use crate::types::{NodeKind, Properties};

/// Lock held on a file.
#[derive(Debug, Clone)]
pub(crate) struct LockHolder {
    pub(crate) token: String,
    /// `None` never expires.
    pub(crate) expiry: Option<SystemTime>,
}

impl LockHolder {
    pub(crate) fn is_expired(&self, now: SystemTime) -> bool {
        self.expiry.is_some_and(|at| now >= at)
    }
}

/// A file or folder.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: BTreeMap<String, NodeId>,
    pub(crate) content: Vec<u8>,
    pub(crate) properties: Properties,
    pub(crate) acl: Acl,
    pub(crate) created_at: SystemTime,
    pub(crate) modified_at: SystemTime,
    pub(crate) lock: Option<LockHolder>,
    /// Move clock reading when this node was last moved or renamed.
    pub(crate) moved_at: u64,
    /// `(move clock, path)` computed on demand.
    pub(crate) path_cache: Mutex<Option<(u64, Path)>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            name,
            kind,
            parent,
            children: BTreeMap::new(),
            content: Vec::new(),
            properties: Properties::new(),
            acl: Acl::new(),
            created_at: now,
            modified_at: now,
            lock: None,
            moved_at: 0,
            path_cache: Mutex::new(None),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids by name. Always empty for files.
    pub fn children(&self) -> &BTreeMap<String, NodeId> {
        &self.children
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn modified_at(&self) -> SystemTime {
        self.modified_at
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    pub fn length(&self) -> u64 {
        self.content.len() as u64
    }

    /// True if a lock is present and not expired.
    pub fn is_locked(&self) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|l| !l.is_expired(SystemTime::now()))
    }

    /// True if this file may be changed with `token`: either it is not
    /// locked, or the token matches the lock.
    pub(crate) fn accepts_token(&self, token: Option<&str>) -> bool {
        match &self.lock {
            Some(holder) if !holder.is_expired(SystemTime::now()) => {
                token == Some(holder.token.as_str())
            }
            _ => true,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.modified_at = SystemTime::now();
    }
}
