//! Process-level store locking.
//!
//! Flat CSV stores have no row-level locking: an append interleaved with
//! a delete's whole-file rewrite can corrupt or lose rows. Every mutation
//! therefore holds an exclusive advisory lock on a `.lock` sidecar for
//! its whole duration; point reads take a shared lock.
//!
//! Uses the `fs2` crate for cross-platform file locking (MSRV 1.75
//! compatible). Note: std::fs::File::lock() requires Rust 1.89+, so we
//! use fs2 instead.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Store is locked by another process: {0}")]
    Locked(PathBuf),

    #[error("Failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    #[error("Failed to acquire lock: {0}")]
    AcquireFailed(#[source] io::Error),
}

impl From<LockError> for io::Error {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Locked(path) => io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("store locked by another process: {}", path.display()),
            ),
            LockError::CreateFailed(e) | LockError::AcquireFailed(e) => e,
        }
    }
}

/// A guard that holds an advisory lock on a store file.
///
/// The lock is automatically released when the guard is dropped.
pub struct StoreLockGuard {
    _file: File,
    lock_path: PathBuf,
    sidecar_path: Option<PathBuf>,
}

impl StoreLockGuard {
    /// Get the path to the lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

#[derive(Serialize)]
struct LockSidecar {
    pid: u32,
    exe: Option<String>,
    timestamp: String,
    mode: &'static str,
}

fn sidecar_path_for(lock_path: &Path) -> PathBuf {
    let ext = lock_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("lock");
    lock_path.with_extension(format!("{ext}.json"))
}

fn write_lock_sidecar(lock_path: &Path, mode: &'static str) -> Option<PathBuf> {
    let sidecar = LockSidecar {
        pid: std::process::id(),
        exe: std::env::current_exe().ok().map(|p| p.display().to_string()),
        timestamp: Utc::now().to_rfc3339(),
        mode,
    };
    let sidecar_path = sidecar_path_for(lock_path);
    match serde_json::to_vec_pretty(&sidecar)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|payload| fs::write(&sidecar_path, payload))
    {
        Ok(()) => Some(sidecar_path),
        Err(e) => {
            warn!(
                "Failed to write lock sidecar {}: {}",
                sidecar_path.display(),
                e
            );
            None
        }
    }
}

impl Drop for StoreLockGuard {
    fn drop(&mut self) {
        debug!("Releasing store lock: {}", self.lock_path.display());
        if let Some(path) = &self.sidecar_path {
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to remove lock sidecar {}: {}", path.display(), e);
            }
        }
        // File is automatically unlocked when closed (fs2 uses flock/LockFileEx)
    }
}

impl std::fmt::Debug for StoreLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLockGuard")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

/// Get the lock file path for a store path.
///
/// Examples:
/// - `/data/pending.csv` → `/data/pending.csv.lock`
/// - `/data/pending` → `/data/pending.lock` (no double-dot)
///
/// The lock lives beside the store rather than being the store itself,
/// so the atomic rename in delete does not disturb the held lock.
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut lock_path = store_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            // Has extension: append .lock to existing extension
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            // No extension: just add .lock
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

fn open_lock_file(lock_path: &Path) -> Result<File, LockError> {
    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(LockError::CreateFailed)?;
        }
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(LockError::CreateFailed)
}

/// Acquire an exclusive lock on a store file, waiting if necessary.
pub fn lock_exclusive(store_path: &Path) -> Result<StoreLockGuard, LockError> {
    let lock_path = lock_path_for(store_path);

    debug!("Waiting to acquire exclusive lock: {}", lock_path.display());

    let file = open_lock_file(&lock_path)?;

    // fs2::lock_exclusive() blocks until the lock is available
    file.lock_exclusive().map_err(LockError::AcquireFailed)?;

    debug!("Acquired exclusive store lock: {}", lock_path.display());
    let sidecar_path = write_lock_sidecar(&lock_path, "exclusive");
    Ok(StoreLockGuard {
        _file: file,
        lock_path,
        sidecar_path,
    })
}

/// Try to acquire an exclusive lock on a store file.
///
/// Non-blocking: if another process holds the lock this returns
/// `Err(LockError::Locked)` immediately.
pub fn try_lock_exclusive(store_path: &Path) -> Result<StoreLockGuard, LockError> {
    let lock_path = lock_path_for(store_path);

    debug!("Attempting to acquire exclusive lock: {}", lock_path.display());

    let file = open_lock_file(&lock_path)?;

    // Use fully qualified syntax to call fs2's method (not
    // std::fs::File::try_lock_exclusive which exists in Rust 1.89+ and
    // returns TryLockError instead of io::Error)
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            debug!("Acquired exclusive store lock: {}", lock_path.display());
            let sidecar_path = write_lock_sidecar(&lock_path, "exclusive");
            Ok(StoreLockGuard {
                _file: file,
                lock_path,
                sidecar_path,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            debug!("Store is locked by another process");
            Err(LockError::Locked(store_path.to_path_buf()))
        }
        Err(e) => Err(LockError::AcquireFailed(e)),
    }
}

/// Acquire a shared (read) lock on a store file, waiting if necessary.
///
/// Multiple readers may hold shared locks simultaneously; a writer's
/// exclusive lock excludes them all.
pub fn lock_shared(store_path: &Path) -> Result<StoreLockGuard, LockError> {
    let lock_path = lock_path_for(store_path);

    let file = open_lock_file(&lock_path)?;

    // Use fully qualified syntax to call fs2's method (not
    // std::fs::File::lock_shared which exists in Rust 1.89+)
    FileExt::lock_shared(&file).map_err(LockError::AcquireFailed)?;

    debug!("Acquired shared store lock: {}", lock_path.display());
    Ok(StoreLockGuard {
        _file: file,
        lock_path,
        sidecar_path: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        // With extension
        let store_path = Path::new("/data/pending.csv");
        let lock = lock_path_for(store_path);
        assert_eq!(lock, PathBuf::from("/data/pending.csv.lock"));

        // Without extension (no double-dot)
        let store_no_ext = Path::new("/data/pending");
        let lock_no_ext = lock_path_for(store_no_ext);
        assert_eq!(lock_no_ext, PathBuf::from("/data/pending.lock"));

        // Multiple dots in name
        let store_dots = Path::new("/data/my.queue.csv");
        let lock_dots = lock_path_for(store_dots);
        assert_eq!(lock_dots, PathBuf::from("/data/my.queue.csv.lock"));
    }

    #[test]
    fn test_try_lock_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("pending.csv");

        // First lock should succeed
        let guard = try_lock_exclusive(&store_path).unwrap();
        assert!(guard.lock_path().exists());

        // Drop the guard
        drop(guard);

        // Should be able to lock again
        let _guard2 = try_lock_exclusive(&store_path).unwrap();
    }

    #[test]
    fn test_lock_contention() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("pending.csv");

        // First lock
        let _guard = try_lock_exclusive(&store_path).unwrap();

        // Second lock should fail
        let result = try_lock_exclusive(&store_path);
        assert!(matches!(result, Err(LockError::Locked(_))));
    }

    #[test]
    fn test_shared_locks_coexist() {
        let temp_dir = TempDir::new().unwrap();
        let store_path = temp_dir.path().join("pending.csv");

        let _guard1 = lock_shared(&store_path).unwrap();
        let _guard2 = lock_shared(&store_path).unwrap();
        // Both guards held simultaneously - OK for shared locks
    }
}
