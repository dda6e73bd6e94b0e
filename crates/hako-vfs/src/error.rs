//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Path or id does not resolve to a live node.
    #[error("not found: {0}")]
    NotFound(String),

    /// Permission denied, or a locked item was touched without its token.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Name collision, or an invalid lock state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The node was deleted. Callers holding stale ids end up here.
    #[error("item removed: {0}")]
    ItemRemoved(String),

    /// Path or name failed validation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Waited past the deadline for a path lock.
    #[error("timed out waiting for lock on {path} after {waited_ms}ms")]
    LockTimeout { path: String, waited_ms: u64 },

    /// A thread re-entered the same path lock too many times.
    #[error("lock recursion limit {limit} exceeded on {path}")]
    LockRecursion { path: String, limit: u32 },

    /// Unsupported operation or failure inside the engine.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Forbidden error.
    pub fn forbidden(what: impl Into<String>) -> Self {
        Self::Forbidden(what.into())
    }

    /// Create a Conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Create an ItemRemoved error.
    pub fn item_removed(what: impl Into<String>) -> Self {
        Self::ItemRemoved(what.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(what: impl Into<String>) -> Self {
        Self::InvalidPath(what.into())
    }

    /// Create a Server error.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Only lock timeouts are worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Forbidden(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::Conflict(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::ItemRemoved(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            e @ VfsError::LockTimeout { .. } => io::Error::new(io::ErrorKind::TimedOut, e.to_string()),
            e @ VfsError::LockRecursion { .. } => io::Error::other(e.to_string()),
            VfsError::Server(msg) => io::Error::other(msg),
            VfsError::Io(e) => e,
        }
    }
}

impl From<zip::result::ZipError> for VfsError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(e) => Self::Io(e),
            other => Self::Server(format!("zip: {other}")),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
