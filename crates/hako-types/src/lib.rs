//! Shared identity and access-control types for hako.
//!
//! This is the leaf crate: typed ids, the id-generation seam, principals and
//! permissions. It has **no internal hako dependencies**.
//!
//! |-----------------------|-------------------------------------------------|
//! | Type                  | Purpose                                         |
//! |-----------------------|-------------------------------------------------|
//! | [`NodeId`]            | Which file or folder (stable for its lifetime)  |
//! | [`WorkspaceId`]       | Which workspace a mount point serves            |
//! | [`IdGenerator`]       | Injected strategy for minting `NodeId`s         |
//! | [`Principal`]         | User or group named by an ACL entry             |
//! | [`Permission`]        | read / write / update_acl / all                 |
//! | [`Acl`]               | principal -> permission set, one per node       |
//! |-----------------------|-------------------------------------------------|

pub mod ids;
pub mod permission;
pub mod principal;

pub use ids::{IdError, IdGenerator, NodeId, SequentialIds, UuidIds, WorkspaceId};
pub use permission::{AccessControlEntry, Acl, Permission, acl_entries, grants};
pub use principal::{ANY_PRINCIPAL, Principal, PrincipalKind};
