//! core::ops::lock
//!
//! Exclusive, process-wide lock over a single store.
//!
//! # Storage
//!
//! - `<store_root>/.lock` - lock file with an OS-level exclusive lock
//!
//! # Invariants
//!
//! - Held for the entire duration of one `process_intent` call
//! - Released automatically on drop (RAII)
//! - Acquisition is non-blocking: a locked store fails fast instead of
//!   queuing

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("store is locked by another tasktree process")]
    AlreadyLocked,

    #[error("failed to create lock file: {0}")]
    CreateFailed(String),

    #[error("failed to acquire lock: {0}")]
    AcquireFailed(String),

    #[error("failed to release lock: {0}")]
    ReleaseFailed(String),

    #[error("lock i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An exclusive lock on a store, released when this guard is dropped.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: Option<File>,
}

impl StoreLock {
    /// Acquire the lock at `<store_root>/.lock`, creating the store
    /// directory and lock file if they do not exist yet.
    pub fn acquire(store_root: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(store_root)
            .map_err(|e| LockError::CreateFailed(format!("cannot create {}: {}", store_root.display(), e)))?;

        let path = store_root.join(".lock");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::CreateFailed(format!("cannot open {}: {}", path.display(), e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { path, file: Some(file) }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(LockError::AlreadyLocked),
            Err(e) => Err(LockError::AcquireFailed(e.to_string())),
        }
    }

    /// Try to acquire the lock, returning `None` instead of an error if
    /// another process already holds it.
    pub fn try_acquire(store_root: &Path) -> Result<Option<Self>, LockError> {
        match Self::acquire(store_root) {
            Ok(lock) => Ok(Some(lock)),
            Err(LockError::AlreadyLocked) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(&mut self) -> Result<(), LockError> {
        if let Some(file) = self.file.take() {
            file.unlock().map_err(|e| LockError::ReleaseFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
