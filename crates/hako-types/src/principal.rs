//! Principal types.
//!
//! A `Principal` is whoever an ACL entry talks about: a single user or a group
//! of users. Resolving who the *caller* is happens outside this crate; the
//! tree engine only compares principals.

use serde::{Deserialize, Serialize};

/// Whether a principal names one user or a group.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

/// A user or group that can appear in an access control list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    /// Name as known to the identity provider: "amy", "workspace/developer".
    pub name: String,
    pub kind: PrincipalKind,
}

/// Name of the wildcard user that matches every caller.
pub const ANY_PRINCIPAL: &str = "any";

impl Principal {
    /// A single user.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::User,
        }
    }

    /// A group of users.
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PrincipalKind::Group,
        }
    }

    /// The wildcard principal. An ACL entry for it applies to everyone.
    pub fn any() -> Self {
        Self::user(ANY_PRINCIPAL)
    }

    /// True for the wildcard principal.
    pub fn is_any(&self) -> bool {
        self.kind == PrincipalKind::User && self.name == ANY_PRINCIPAL
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

// ============================================================================
// Tests
// ============================================================================
