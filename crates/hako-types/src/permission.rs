//! Permissions and access control lists.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::principal::Principal;

/// A permission that can be granted on a node.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    UpdateAcl,
    /// Implies every other permission.
    All,
}

impl Permission {
    /// True if holding `self` is enough to be granted `wanted`.
    pub fn implies(self, wanted: Permission) -> bool {
        self == Permission::All || self == wanted
    }
}

/// Per-node access control list: principal -> granted permissions.
pub type Acl = BTreeMap<Principal, BTreeSet<Permission>>;

/// One ACL row, as exchanged with callers of `update_acl`.
///
/// An empty `permissions` list means "remove this principal".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub principal: Principal,
    pub permissions: Vec<Permission>,
}

impl AccessControlEntry {
    pub fn new(principal: Principal, permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            principal,
            permissions: permissions.into_iter().collect(),
        }
    }

    /// Entry that removes `principal` from the list.
    pub fn revoke(principal: Principal) -> Self {
        Self {
            principal,
            permissions: Vec::new(),
        }
    }
}

/// Flatten an ACL into entries, ordered by principal.
pub fn acl_entries(acl: &Acl) -> Vec<AccessControlEntry> {
    acl.iter()
        .map(|(principal, perms)| AccessControlEntry {
            principal: principal.clone(),
            permissions: perms.iter().copied().collect(),
        })
        .collect()
}

/// True if any permission in `granted` implies `wanted`.
pub fn grants(granted: &BTreeSet<Permission>, wanted: Permission) -> bool {
    granted.iter().any(|p| p.implies(wanted))
}
