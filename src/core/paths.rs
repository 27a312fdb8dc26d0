//! core::paths
//!
//! Centralized path routing for store storage locations.
//!
//! **Hard rule:** no other module computes a path under the store root by
//! hand — every on-disk location the engine touches is named here once.
//!
//! # Storage layout
//!
//! All store data lives under `<store_root>/`:
//! - `<domain>/PLAN-*.md`, `<domain>/TASK-*.md` - live node files
//! - `.trash/` - soft-deleted files, retained for `auto-clean`
//! - `.snapshots/<timestamp>/` - point-in-time snapshots
//! - `.last` - pointer to the most recently touched root, for bare `resume`
//! - `.history.json` - undo/redo ring
//! - `.lock` - process-wide exclusive lock
//! - `.tasktree/config.toml` - store-local configuration

use std::path::{Path, PathBuf};

/// Centralized path routing for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub store_root: PathBuf,
}

impl StorePaths {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            store_root: store_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.store_root
    }

    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        if domain.is_empty() {
            self.store_root.clone()
        } else {
            self.store_root.join(domain)
        }
    }

    pub fn node_path(&self, domain: &str, filename: &str) -> PathBuf {
        self.domain_dir(domain).join(filename)
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.store_root.join(".trash")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.store_root.join(".snapshots")
    }

    pub fn snapshot_dir(&self, timestamp: &str) -> PathBuf {
        self.snapshots_dir().join(timestamp)
    }

    pub fn last_pointer_path(&self) -> PathBuf {
        self.store_root.join(".last")
    }

    pub fn history_path(&self) -> PathBuf {
        self.store_root.join(".history.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store_root.join(".lock")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.store_root.join(".tasktree")
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Ensure the structural directories a store needs before any
    /// operation runs (the root itself, `.trash/`, `.snapshots/`).
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.store_root)?;
        std::fs::create_dir_all(self.trash_dir())?;
        std::fs::create_dir_all(self.snapshots_dir())?;
        Ok(())
    }
}
