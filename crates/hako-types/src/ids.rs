//! Typed identifiers for tree nodes and workspaces.
//!
//! Both ID types wrap a UUID. Fresh ids are UUIDv7 (time-ordered), but the
//! tree engine never mints ids itself: it asks an [`IdGenerator`], so tests can
//! plug in [`SequentialIds`] and get the same ids on every run.
//!
//! The `short()` form (first 8 hex chars) is for logs and human-facing output,
//! never a lookup key.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of a file or folder, stable for the node's lifetime.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(uuid::Uuid);

/// Identifier of the workspace a mount point belongs to.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(uuid::Uuid);

/// Error parsing an id from text.
#[derive(Debug, thiserror::Error)]
#[error("invalid id '{input}': {source}")]
pub struct IdError {
    input: String,
    #[source]
    source: uuid::Error,
}

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for display only.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                uuid::Uuid::parse_str(s).map(Self).map_err(|source| IdError {
                    input: s.to_string(),
                    source,
                })
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl std::str::FromStr for $T {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(NodeId, "NodeId");
impl_typed_id!(WorkspaceId, "WorkspaceId");

// ── Id generation ───────────────────────────────────────────────────────────

/// Strategy for minting node ids.
///
/// Injected into the mount point instead of a process-wide generator.
pub trait IdGenerator: Send + Sync {
    /// Produce an id that has never been returned before by this generator.
    fn next_id(&self) -> NodeId;
}

/// Random, time-ordered ids. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> NodeId {
        NodeId::new()
    }
}

/// Deterministic ids `1, 2, 3, ...` encoded as UUIDs. Meant for tests.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> NodeId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        NodeId::from(uuid::Uuid::from_u128(n as u128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_8_chars() {
        assert_eq!(WorkspaceId::new().short().len(), 8);
    }

    #[test]
    fn test_parse_hex_and_uuid_format() {
        let id = NodeId::new();
        assert_eq!(NodeId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(id.to_string().parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn test_parse_invalid() {
        let err = NodeId::parse("not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_nil() {
        assert!(NodeId::nil().is_nil());
        assert!(!NodeId::new().is_nil());
    }

    #[test]
    fn test_sequential_ids_are_deterministic() {
        let a = SequentialIds::new();
        let b = SequentialIds::new();
        let first: Vec<NodeId> = (0..3).map(|_| a.next_id()).collect();
        let second: Vec<NodeId> = (0..3).map(|_| b.next_id()).collect();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
        assert_eq!(uuid::Uuid::from(first[2]).as_u128(), 3);
    }

    #[test]
    fn test_debug_format() {
        let id = NodeId::nil();
        assert_eq!(format!("{:?}", id), "NodeId(00000000)");
    }

    #[test]
    fn test_serde_transparent() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
