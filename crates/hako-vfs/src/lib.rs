//! In-memory hierarchical file tree for hako workspaces.
//!
//! The pieces, leaves first:
//!
//! - [`Path`] - immutable, normalized tree path
//! - [`PathLockFactory`] - reentrant, hierarchy-aware reader/writer locks keyed by path
//! - [`MountPoint`] - the tree engine: ACL-gated CRUD, file lock tokens, copy/move/delete
//! - [`archive`] - zip and tar import/export of folders
//! - [`Workspace`] - a mount point shared between threads behind path locks
//!
//! ## Design Decisions
//!
//! - **Arena, not pointers**: nodes are addressed by [`NodeId`](hako_types::NodeId);
//!   parents own `name -> id` maps, children keep their parent's id.
//! - **Single writer**: tree mutations take `&mut MountPoint`. Concurrency is
//!   layered on top with path locks rather than built into every node.
//! - **All-or-nothing structure changes**: move, rename and delete validate the
//!   whole subtree before changing anything.
//! - **Injected collaborators**: id generation, authorization, search indexing
//!   and the unchecked-path predicate are all supplied by the caller.

pub mod access;
pub mod archive;
pub mod config;
mod error;
pub mod flows;
pub mod index;
pub mod lock;
mod mount;
mod node;
mod ops;
mod path;
mod types;
mod walk;
mod workspace;

pub use access::{AclAuthorizer, AllowAll, Authorizer};
pub use archive::{ArchiveFormat, Archiver, TarArchiver, ZipArchiver, archiver_for};
pub use config::{ConfigError, VfsConfig};
pub use error::{VfsError, VfsResult};
pub use flows::{FlowBus, FlowMessage, Subscription, VfsFlow};
pub use index::{IndexError, NoopIndexer, SearchIndexer};
pub use lock::{PathLock, PathLockFactory, PathLockGuard};
pub use mount::{MountPoint, MountPointBuilder, PathPredicate};
pub use node::Node;
pub use path::Path;
pub use types::{ItemInfo, NodeKind, NodeState, Properties};
pub use walk::Walk;
pub use workspace::Workspace;
