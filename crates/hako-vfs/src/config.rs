//! Mount point configuration.
//!
//! ```toml
//! workspace_id = "0190f5c2-7f7e-7a51-a1a2-6f1f1f4bde4c"
//! lock_max_threads = 1024
//! lock_timeout_ms = 60000
//! unchecked_paths = ["/.codenvy/misc.xml"]
//! developer_group = "workspace/developer"
//! ```
//!
//! Every field is optional.

use std::time::Duration;

use hako_types::{IdError, WorkspaceId};
use serde::{Deserialize, Serialize};

use crate::error::VfsError;
use crate::lock::{DEFAULT_MAX_RECURSION, DEFAULT_MAX_THREADS};
use crate::path::Path;

/// Group granted every permission on a fresh root.
pub const DEFAULT_DEVELOPER_GROUP: &str = "workspace/developer";

/// Default wait for a path lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 60_000;

/// Default flow bus capacity.
pub const DEFAULT_FLOW_CAPACITY: usize = 1024;

/// Errors loading a [`VfsConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("bad workspace_id: {0}")]
    WorkspaceId(#[from] IdError),

    #[error("bad unchecked path: {0}")]
    Path(#[from] VfsError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsConfig {
    /// Workspace the mount serves. A fresh id is minted when absent.
    pub workspace_id: Option<String>,
    /// Permit budget per path in the lock table.
    pub lock_max_threads: u32,
    pub lock_timeout_ms: u64,
    pub lock_max_recursion: u32,
    pub flow_capacity: usize,
    /// Absolute paths whose READ/WRITE checks are skipped.
    pub unchecked_paths: Vec<String>,
    pub developer_group: String,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            workspace_id: None,
            lock_max_threads: DEFAULT_MAX_THREADS,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_max_recursion: DEFAULT_MAX_RECURSION,
            flow_capacity: DEFAULT_FLOW_CAPACITY,
            unchecked_paths: Vec::new(),
            developer_group: DEFAULT_DEVELOPER_GROUP.to_string(),
        }
    }
}

impl VfsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "loaded vfs config");
        Ok(config)
    }

    /// Configured workspace id, or a new one.
    pub fn workspace_id(&self) -> Result<WorkspaceId, ConfigError> {
        match &self.workspace_id {
            Some(s) => Ok(WorkspaceId::parse(s)?),
            None => Ok(WorkspaceId::new()),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn unchecked_paths(&self) -> Result<Vec<Path>, ConfigError> {
        Ok(self
            .unchecked_paths
            .iter()
            .map(|p| Path::of(p))
            .collect::<Result<Vec<_>, _>>()?)
    }
}
