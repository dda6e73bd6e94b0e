//! Pre-order traversal.
//!
//! [`Walk`] drives an explicit stack instead of recursing, so deep trees
//! cannot overflow the call stack. Siblings come out in name order. A walk
//! borrows the mount point; call [`MountPoint::walk`] again to restart.

use hako_types::NodeId;
use md5::{Digest, Md5};

use crate::error::VfsResult;
use crate::mount::MountPoint;
use crate::node::Node;

/// Pre-order iterator over a subtree, starting with its root.
pub struct Walk<'a> {
    mount: &'a MountPoint,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            // Ids come from live children maps; a miss means the node is gone.
            let Ok(node) = self.mount.node(id) else {
                continue;
            };
            self.stack.extend(node.children.values().rev().copied());
            return Some(node);
        }
        None
    }
}

impl MountPoint {
    /// Walk `start` and everything below it.
    pub fn walk(&self, start: NodeId) -> VfsResult<Walk<'_>> {
        self.node(start)?;
        Ok(Walk {
            mount: self,
            stack: vec![start],
        })
    }

    /// `(md5 hex, path relative to folder)` for every file below `folder`,
    /// in walk order. Empty when `folder` is a file.
    pub fn count_md5_sums(&self, folder: NodeId) -> VfsResult<Vec<(String, String)>> {
        if self.node(folder)?.is_file() {
            return Ok(Vec::new());
        }
        let base = self.path_of(folder)?;
        let mut sums = Vec::new();
        for node in self.walk(folder)?.filter(|n| n.is_file()) {
            let path = self.path_of(node.id)?;
            let relative = path
                .relative_to(&base)
                .map(|p| p.to_string())
                .unwrap_or_else(|| path.to_string());
            let digest = Md5::digest(&node.content);
            sums.push((hex::encode(digest), relative));
        }
        Ok(sums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_pre_order() {
        let mut m = MountPoint::builder().build();
        let root = m.root();
        let a = m.create_folder(root, "a").unwrap();
        m.create_file(a, "x", Vec::new()).unwrap();
        m.create_folder(a, "b/c").unwrap();
        m.create_file(root, "z", Vec::new()).unwrap();

        let names: Vec<&str> = m.walk(root).unwrap().map(|n| n.name()).collect();
        assert_eq!(names, vec!["", "a", "b", "c", "x", "z"]);

        // restartable
        assert_eq!(m.walk(a).unwrap().count(), 4);
        assert_eq!(m.walk(a).unwrap().count(), 4);
    }

    #[test]
    fn test_md5_sums() {
        let mut m = MountPoint::builder().build();
        let root = m.root();
        let p = m.create_folder(root, "p").unwrap();
        let f = m.create_file(p, "f", b"abc".to_vec()).unwrap();
        m.create_file(p, "sub/g", Vec::new()).unwrap_err();
        m.create_folder(p, "sub").unwrap();

        let sums = m.count_md5_sums(p).unwrap();
        assert_eq!(
            sums,
            vec![(
                "900150983cd24fb0d6963f7d28e17f72".to_string(),
                "f".to_string()
            )]
        );
        assert!(m.count_md5_sums(f).unwrap().is_empty());
    }

    #[test]
    fn test_walk_missing_start() {
        let m = MountPoint::builder().build();
        assert!(m.walk(NodeId::nil()).is_err());
    }
}
