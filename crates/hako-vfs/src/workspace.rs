//! A mount point shared between threads.
//!
//! [`Workspace`] pairs one [`MountPoint`] with a [`PathLockFactory`]. Path
//! locks are always taken before the mount mutex, and the mutex is only held
//! for the duration of a single tree operation, so callers holding path
//! locks never wait on each other through the mutex.

use std::io::Read;
use std::time::Duration;

use hako_types::NodeId;
use parking_lot::Mutex;

use crate::archive::ArchiveFormat;
use crate::config::{ConfigError, VfsConfig};
use crate::error::{VfsError, VfsResult};
use crate::flows::{Subscription, VfsFlow};
use crate::lock::{PathLockFactory, PathLockGuard};
use crate::mount::MountPoint;
use crate::path::Path;

pub struct Workspace {
    mount: Mutex<MountPoint>,
    locks: PathLockFactory,
    lock_timeout: Duration,
}

impl Workspace {
    pub fn new(mount: MountPoint, locks: PathLockFactory, lock_timeout: Duration) -> Self {
        Self {
            mount: Mutex::new(mount),
            locks,
            lock_timeout,
        }
    }

    pub fn from_config(config: &VfsConfig) -> Result<Self, ConfigError> {
        let mount = MountPoint::from_config(config)?;
        let locks =
            PathLockFactory::with_max_recursion(config.lock_max_threads, config.lock_max_recursion);
        Ok(Self::new(mount, locks, config.lock_timeout()))
    }

    pub fn locks(&self) -> &PathLockFactory {
        &self.locks
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Run `f` with exclusive access to the tree. Takes no path locks.
    pub fn with_mount<R>(&self, f: impl FnOnce(&mut MountPoint) -> R) -> R {
        f(&mut self.mount.lock())
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription<VfsFlow> {
        self.mount.lock().flows().subscribe(pattern)
    }

    fn hold(&self, path: &Path, exclusive: bool) -> VfsResult<PathLockGuard> {
        self.locks
            .get_lock(path, exclusive)
            .acquire_timeout(self.lock_timeout)
    }

    /// Read a file under a shared lock on its path.
    pub fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let _guard = self.hold(path, false)?;
        let mount = self.mount.lock();
        let id = mount.get_by_path(path)?;
        Ok(mount.get_content(id)?.to_vec())
    }

    /// Create or replace a file under an exclusive lock on its path. The
    /// parent folder must exist.
    pub fn write_file(
        &self,
        path: &Path,
        content: impl Into<Vec<u8>>,
        lock_token: Option<&str>,
    ) -> VfsResult<NodeId> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.name()) else {
            return Err(VfsError::invalid_path(format!("{path} has no file name")));
        };
        let _guard = self.hold(path, true)?;
        let mut mount = self.mount.lock();
        let parent = mount.get_by_path(&parent_path)?;
        match mount.get_child(parent, name)? {
            Some(id) => {
                mount.update_content(id, content, lock_token)?;
                Ok(id)
            }
            None => mount.create_file(parent, name, content),
        }
    }

    /// Export `folder` while holding an exclusive lock on it.
    pub fn export(&self, folder: &Path, format: ArchiveFormat) -> VfsResult<Vec<u8>> {
        let _guard = self.hold(folder, true)?;
        let mount = self.mount.lock();
        let id = mount.get_by_path(folder)?;
        mount.export_archive(id, format)
    }

    /// Import into `folder` while holding an exclusive lock on it.
    pub fn import(
        &self,
        folder: &Path,
        format: ArchiveFormat,
        input: impl Read,
        overwrite: bool,
        strip: usize,
    ) -> VfsResult<()> {
        let _guard = self.hold(folder, true)?;
        let mut mount = self.mount.lock();
        let id = mount.get_by_path(folder)?;
        mount.import_archive(id, format, input, overwrite, strip)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("locks", &self.locks)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}
