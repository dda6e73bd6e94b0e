//! Search index seam.
//!
//! The engine tells an external indexer about changes after they succeed.
//! Indexer failures are logged and dropped; a mutation never fails because
//! the index could not keep up.

use crate::path::Path;
use crate::types::ItemInfo;

/// Error type indexers may return.
pub type IndexError = Box<dyn std::error::Error + Send + Sync>;

/// Receives change notifications for a full-text index.
pub trait SearchIndexer: Send + Sync {
    /// A node (and, for folders, its subtree) appeared.
    fn add(&self, item: &ItemInfo) -> Result<(), IndexError>;

    /// A file's content changed.
    fn update(&self, item: &ItemInfo) -> Result<(), IndexError>;

    /// Everything at or below `path` is gone.
    fn delete(&self, path: &Path, is_file: bool) -> Result<(), IndexError>;
}

/// Indexer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl SearchIndexer for NoopIndexer {
    fn add(&self, _: &ItemInfo) -> Result<(), IndexError> {
        Ok(())
    }

    fn update(&self, _: &ItemInfo) -> Result<(), IndexError> {
        Ok(())
    }

    fn delete(&self, _: &Path, _: bool) -> Result<(), IndexError> {
        Ok(())
    }
}
