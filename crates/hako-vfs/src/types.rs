//! Core tree types shared by the engine, the archivers and callers.

use std::collections::BTreeMap;
use std::time::SystemTime;

use hako_types::NodeId;
use serde::{Deserialize, Serialize};

use crate::path::Path;

/// Whether a node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    File,
    Folder,
}

impl NodeKind {
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder)
    }
}

/// Lifecycle of a node id. `Deleted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Active,
    Deleted,
}

/// Property map: name -> ordered values.
pub type Properties = BTreeMap<String, Vec<String>>;

/// Snapshot of a node's metadata, detached from the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: NodeId,
    pub name: String,
    pub path: Path,
    pub kind: NodeKind,
    /// Content length in bytes; 0 for folders.
    pub length: u64,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
    /// True if the file holds an unexpired lock.
    pub locked: bool,
    pub properties: Properties,
}

impl ItemInfo {
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}
