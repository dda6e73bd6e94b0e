//! Authorization seam.
//!
//! The engine asks an [`Authorizer`] before reading or changing a node. Who
//! the caller is gets decided by whoever builds the authorizer; the engine
//! never resolves identities itself.

use std::collections::BTreeSet;

use hako_types::{NodeId, Permission, Principal, grants};

use crate::mount::MountPoint;

/// Decides whether the current caller holds a permission on a node.
pub trait Authorizer: Send + Sync {
    /// `check_parent` additionally requires the permission on the node's
    /// parent (when there is one).
    fn has_permission(
        &self,
        mount: &MountPoint,
        node: NodeId,
        permission: Permission,
        check_parent: bool,
    ) -> bool;
}

/// Grants everything. Enforcement is left to a wrapping layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_permission(&self, _: &MountPoint, _: NodeId, _: Permission, _: bool) -> bool {
        true
    }
}

/// Evaluates node ACLs for one caller.
///
/// The effective ACL of a node is its own if non-empty, otherwise the nearest
/// non-empty ACL up the parent chain. An entry applies if its principal is
/// one of the caller's principals or the `any` principal.
#[derive(Debug, Clone)]
pub struct AclAuthorizer {
    principals: BTreeSet<Principal>,
}

impl AclAuthorizer {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals.into_iter().collect(),
        }
    }

    /// A user plus the groups they belong to.
    pub fn for_user<I, S>(name: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut principals: BTreeSet<Principal> =
            groups.into_iter().map(Principal::group).collect();
        principals.insert(Principal::user(name));
        Self { principals }
    }

    pub fn principals(&self) -> &BTreeSet<Principal> {
        &self.principals
    }

    fn granted(&self, mount: &MountPoint, node: NodeId, permission: Permission) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            let Ok(current) = mount.node(id) else {
                return false;
            };
            if !current.acl().is_empty() {
                return current.acl().iter().any(|(principal, perms)| {
                    (principal.is_any() || self.principals.contains(principal))
                        && grants(perms, permission)
                });
            }
            cursor = current.parent();
        }
        false
    }
}

impl Authorizer for AclAuthorizer {
    fn has_permission(
        &self,
        mount: &MountPoint,
        node: NodeId,
        permission: Permission,
        check_parent: bool,
    ) -> bool {
        if !self.granted(mount, node, permission) {
            return false;
        }
        if !check_parent {
            return true;
        }
        match mount.node(node).ok().and_then(|n| n.parent()) {
            Some(parent) => self.granted(mount, parent, permission),
            None => true,
        }
    }
}
