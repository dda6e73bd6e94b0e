//! Hierarchical, reentrant path locks.
//!
//! [`PathLockFactory`] hands out advisory reader/writer locks keyed by
//! [`Path`]. Each path has a budget of `max_threads` permits: a shared lock
//! takes one, an exclusive lock takes all of them. A request is granted when,
//! for every path equal to, above or below the requested one, the permits
//! already taken by *other* threads plus the requested permits fit in the
//! budget. Exclusive holds therefore block the whole subtree and every
//! ancestor, while shared holds coexist up to the budget: with
//! `max_threads = N`, N threads may hold one path shared at once, and an
//! exclusive request waits until no other thread holds anything overlapping.
//!
//! Locks are reentrant per thread: a thread that already holds `path` gets
//! another hold on the same record without blocking, up to a recursion limit.
//! The table is indexed by `(path, thread)` and guarded by a single mutex and
//! condition variable; every release wakes all waiters, which re-check.
//!
//! Guards are `!Send`. A hold belongs to the thread that took it.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{VfsError, VfsResult};
use crate::path::Path;

/// Default per-path permit budget.
pub const DEFAULT_MAX_THREADS: u32 = 1024;

/// Default bound on reentrant holds of one path by one thread.
pub const DEFAULT_MAX_RECURSION: u32 = 1024;

#[derive(Debug, Clone, Copy)]
struct Record {
    /// Permits this hold took out of the path's budget.
    permits: u32,
    /// Reentrant holds by the owning thread.
    depth: u32,
}

struct LockTable {
    max_threads: u32,
    max_recursion: u32,
    records: Mutex<HashMap<(Path, ThreadId), Record>>,
    released: Condvar,
}

enum Grant {
    Granted,
    Blocked,
}

impl LockTable {
    /// Try to take `permits` on `path` for `owner`. Caller holds the table lock.
    fn try_grant(
        &self,
        records: &mut HashMap<(Path, ThreadId), Record>,
        path: &Path,
        owner: ThreadId,
        permits: u32,
    ) -> VfsResult<Grant> {
        if let Some(own) = records.get_mut(&(path.clone(), owner)) {
            if own.depth >= self.max_recursion {
                return Err(VfsError::LockRecursion {
                    path: path.to_string(),
                    limit: self.max_recursion,
                });
            }
            own.depth += 1;
            return Ok(Grant::Granted);
        }

        // Permits already taken by other threads, per overlapping path.
        let mut taken: HashMap<&Path, u32> = HashMap::new();
        for ((held, thread), record) in records.iter() {
            if *thread == owner {
                continue;
            }
            if held.starts_with(path) || path.starts_with(held) {
                *taken.entry(held).or_default() += record.permits;
            }
        }
        // `<=` budget: the Nth shared holder still fits.
        if taken.values().any(|t| t + permits > self.max_threads) {
            return Ok(Grant::Blocked);
        }

        records.insert((path.clone(), owner), Record { permits, depth: 1 });
        Ok(Grant::Granted)
    }

    fn release(&self, path: &Path, owner: ThreadId) {
        let mut records = self.records.lock();
        let key = (path.clone(), owner);
        match records.get_mut(&key) {
            Some(record) if record.depth > 1 => record.depth -= 1,
            Some(_) => {
                records.remove(&key);
            }
            None => {
                tracing::error!(path = %path, "released a path lock that is not held");
            }
        }
        drop(records);
        self.released.notify_all();
    }
}

/// Creates [`PathLock`]s that share one lock table.
///
/// Cloning the factory shares the table.
#[derive(Clone)]
pub struct PathLockFactory {
    table: Arc<LockTable>,
}

impl PathLockFactory {
    /// `max_threads` is the permit budget of every path; values below 1 are
    /// raised to 1.
    pub fn new(max_threads: u32) -> Self {
        Self::with_max_recursion(max_threads, DEFAULT_MAX_RECURSION)
    }

    pub fn with_max_recursion(max_threads: u32, max_recursion: u32) -> Self {
        Self {
            table: Arc::new(LockTable {
                max_threads: max_threads.max(1),
                max_recursion: max_recursion.max(1),
                records: Mutex::new(HashMap::new()),
                released: Condvar::new(),
            }),
        }
    }

    /// A lock handle on `path`. Nothing is acquired until
    /// [`PathLock::acquire`].
    pub fn get_lock(&self, path: &Path, exclusive: bool) -> PathLock {
        PathLock {
            table: Arc::clone(&self.table),
            path: path.clone(),
            permits: if exclusive { self.table.max_threads } else { 1 },
        }
    }

    pub fn max_threads(&self) -> u32 {
        self.table.max_threads
    }

    /// Number of `(path, thread)` holds currently in the table.
    pub fn held_count(&self) -> usize {
        self.table.records.lock().len()
    }

    /// Fails if any lock is still held.
    pub fn check_clean(&self) -> VfsResult<()> {
        let records = self.table.records.lock();
        if records.is_empty() {
            return Ok(());
        }
        let mut held: Vec<String> = records
            .iter()
            .map(|((path, thread), r)| format!("{path} by {thread:?} x{}", r.depth))
            .collect();
        held.sort();
        Err(VfsError::server(format!(
            "{} path lock(s) still held: {}",
            held.len(),
            held.join(", ")
        )))
    }
}

impl Default for PathLockFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THREADS)
    }
}

impl std::fmt::Debug for PathLockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLockFactory")
            .field("max_threads", &self.table.max_threads)
            .field("held", &self.held_count())
            .finish()
    }
}

/// A not-yet-acquired lock request on one path.
pub struct PathLock {
    table: Arc<LockTable>,
    path: Path,
    permits: u32,
}

impl PathLock {
    /// Block until the lock is granted.
    ///
    /// Only fails on recursion overflow.
    pub fn acquire(&self) -> VfsResult<PathLockGuard> {
        let owner = thread::current().id();
        let mut records = self.table.records.lock();
        loop {
            match self.table.try_grant(&mut records, &self.path, owner, self.permits)? {
                Grant::Granted => return Ok(self.guard(owner)),
                Grant::Blocked => {
                    tracing::debug!(path = %self.path, permits = self.permits, "waiting for path lock");
                    self.table.released.wait(&mut records);
                }
            }
        }
    }

    /// Block until the lock is granted or `timeout` elapses.
    pub fn acquire_timeout(&self, timeout: Duration) -> VfsResult<PathLockGuard> {
        let owner = thread::current().id();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut records = self.table.records.lock();
        loop {
            match self.table.try_grant(&mut records, &self.path, owner, self.permits)? {
                Grant::Granted => return Ok(self.guard(owner)),
                Grant::Blocked => {
                    if Instant::now() >= deadline {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        tracing::warn!(path = %self.path, waited_ms, "path lock timed out");
                        return Err(VfsError::LockTimeout {
                            path: self.path.to_string(),
                            waited_ms,
                        });
                    }
                    self.table.released.wait_until(&mut records, deadline);
                }
            }
        }
    }

    fn guard(&self, owner: ThreadId) -> PathLockGuard {
        PathLockGuard {
            table: Arc::clone(&self.table),
            path: self.path.clone(),
            owner,
            exclusive: self.is_exclusive(),
            _not_send: PhantomData,
        }
    }

    /// True if this handle asks for the whole permit budget.
    pub fn is_exclusive(&self) -> bool {
        self.permits == self.table.max_threads
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn permits(&self) -> u32 {
        self.permits
    }
}

/// One granted hold. Dropping it releases the hold.
pub struct PathLockGuard {
    table: Arc<LockTable>,
    path: Path,
    owner: ThreadId,
    exclusive: bool,
    _not_send: PhantomData<*const ()>,
}

impl PathLockGuard {
    /// Release explicitly. Same as dropping the guard.
    pub fn release(self) {}

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        self.table.release(&self.path, self.owner);
    }
}

impl std::fmt::Debug for PathLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathLockGuard")
            .field("path", &self.path)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::of(s).unwrap()
    }

    #[test]
    fn test_exclusive_flag() {
        let f = PathLockFactory::new(3);
        assert!(f.get_lock(&p("/a"), true).is_exclusive());
        assert!(!f.get_lock(&p("/a"), false).is_exclusive());
        assert_eq!(f.get_lock(&p("/a"), true).permits(), 3);
    }

    #[test]
    fn test_reentrant_same_thread() {
        let f = PathLockFactory::new(3);
        let lock = f.get_lock(&p("/a/b/c"), true);
        let g1 = lock.acquire().unwrap();
        let g2 = lock.acquire_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(f.held_count(), 1);
        drop(g2);
        assert_eq!(f.held_count(), 1);
        g1.release();
        assert_eq!(f.held_count(), 0);
        f.check_clean().unwrap();
    }

    #[test]
    fn test_same_thread_nested_paths_do_not_block() {
        let f = PathLockFactory::new(3);
        let _outer = f.get_lock(&p("/a"), true).acquire().unwrap();
        let _inner = f
            .get_lock(&p("/a/b"), true)
            .acquire_timeout(Duration::from_millis(10))
            .unwrap();
        assert_eq!(f.held_count(), 2);
    }

    #[test]
    fn test_recursion_limit() {
        let f = PathLockFactory::with_max_recursion(3, 2);
        let lock = f.get_lock(&p("/a"), false);
        let _g1 = lock.acquire().unwrap();
        let _g2 = lock.acquire().unwrap();
        let err = lock.acquire().unwrap_err();
        assert!(matches!(err, VfsError::LockRecursion { limit: 2, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_check_clean_reports_held() {
        let f = PathLockFactory::new(3);
        let g = f.get_lock(&p("/x"), false).acquire().unwrap();
        let err = f.check_clean().unwrap_err();
        assert!(err.to_string().contains("/x"));
        drop(g);
        f.check_clean().unwrap();
    }

    #[test]
    fn test_max_threads_floor() {
        assert_eq!(PathLockFactory::new(0).max_threads(), 1);
    }
}
