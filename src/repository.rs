//! repository
//!
//! Filesystem-backed CRUD over root [`Task`]/[`Plan`] files, with
//! optimistic-concurrency (revision-gated) writes standing in for the
//! teacher's Git-ref compare-and-swap. Every id-to-path lookup, move, and
//! delete is routed through [`StorePaths`] so no other module computes a
//! store-relative path by hand.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::codec::{self, CodecError};
use crate::core::model::Task;
use crate::core::paths::StorePaths;
use crate::core::types::{RootId, TaskId, TypeError};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("i/o error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("{0} not found")]
    NotFound(String),

    #[error("revision conflict: expected {expected}, found {actual}")]
    RevisionConflict { expected: u64, actual: u64 },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("invalid id: {0}")]
    InvalidId(#[from] TypeError),

    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

fn io_err(path: &Path, source: std::io::Error) -> RepoError {
    RepoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Directory and file names the repository never treats as a domain
/// segment or a node file when walking the store.
const RESERVED_ENTRIES: &[&str] = &[".trash", ".snapshots", ".tasktree", ".lock", ".history.json", ".last"];

pub struct Repository {
    paths: StorePaths,
}

impl Repository {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        Self {
            paths: StorePaths::new(store_root),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn filename_for(id: &RootId) -> String {
        format!("{}.md", id.as_str())
    }

    /// Locate the live file for `id` by walking domain subdirectories of
    /// the store root, skipping reserved directories.
    pub fn find_path(&self, id: &RootId) -> Option<PathBuf> {
        let filename = Self::filename_for(id);
        Self::walk(&self.paths.store_root, &filename)
    }

    fn walk(dir: &Path, filename: &str) -> Option<PathBuf> {
        let entries = fs::read_dir(dir).ok()?;
        let mut subdirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if RESERVED_ENTRIES.contains(&name.as_ref()) {
                continue;
            }
            if path.is_dir() {
                subdirs.push(path);
            } else if name == filename {
                return Some(path);
            }
        }
        for subdir in subdirs {
            if let Some(found) = Self::walk(&subdir, filename) {
                return Some(found);
            }
        }
        None
    }

    /// Create a new task file. Fails if a file with this id already
    /// exists anywhere in the store.
    pub fn create_task(&self, domain: &str, task: &Task) -> Result<(), RepoError> {
        let id = RootId::Task(task.id.clone());
        if self.find_path(&id).is_some() {
            return Err(RepoError::AlreadyExists(task.id.to_string()));
        }
        let dir = self.paths.domain_dir(domain);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = dir.join(Self::filename_for(&id));
        let content = codec::render_task(task);
        fs::write(&path, content).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    pub fn read_task(&self, id: &TaskId) -> Result<Task, RepoError> {
        let root = RootId::Task(id.clone());
        let path = self
            .find_path(&root)
            .ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        let content = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(codec::parse_task(&content)?.task)
    }

    /// Read raw file content, used by the history ring to snapshot a
    /// node's exact on-disk bytes before a mutation.
    pub fn read_raw(&self, id: &RootId) -> Option<String> {
        let path = self.find_path(id)?;
        fs::read_to_string(path).ok()
    }

    /// Write raw file content back (used to apply an undo/redo snapshot).
    pub fn write_raw(&self, domain: &str, id: &RootId, content: &str) -> Result<(), RepoError> {
        let dir = self.paths.domain_dir(domain);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let path = dir.join(Self::filename_for(id));
        fs::write(&path, content).map_err(|e| io_err(&path, e))
    }

    /// Delete the file backing `id` entirely (used by undo to remove a
    /// file that did not exist before the operation being undone).
    pub fn remove_raw(&self, id: &RootId) -> Result<(), RepoError> {
        if let Some(path) = self.find_path(id) {
            fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        }
        Ok(())
    }

    /// Write a task with optimistic-concurrency checking: the write is
    /// rejected unless the file's current revision equals
    /// `expected_revision`.
    pub fn write_task_cas(&self, domain: &str, task: &Task, expected_revision: u64) -> Result<(), RepoError> {
        let id = RootId::Task(task.id.clone());
        if let Some(path) = self.find_path(&id) {
            let current = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let current_task = codec::parse_task(&current)?.task;
            if current_task.revision != expected_revision {
                return Err(RepoError::RevisionConflict {
                    expected: expected_revision,
                    actual: current_task.revision,
                });
            }
        } else if expected_revision != 0 {
            return Err(RepoError::NotFound(task.id.to_string()));
        }
        self.write_raw(domain, &id, &codec::render_task(task))
    }

    /// Soft-delete: move the file into `.trash/` with a timestamp prefix
    /// so `auto-clean` can reap it later and `undo` can still find it if
    /// needed during its retention window.
    pub fn soft_delete(&self, id: &RootId) -> Result<PathBuf, RepoError> {
        let path = self.find_path(id).ok_or_else(|| RepoError::NotFound(id.to_string()))?;
        let trash_dir = self.paths.trash_dir();
        fs::create_dir_all(&trash_dir).map_err(|e| io_err(&trash_dir, e))?;
        let stamp = crate::core::types::UtcTimestamp::now().to_rfc3339().replace([':', '.'], "-");
        let filename = format!("{}__{}", stamp, Self::filename_for(id));
        let dest = trash_dir.join(filename);
        fs::rename(&path, &dest).map_err(|e| io_err(&path, e))?;
        Ok(dest)
    }

    /// List every live node file under `domain` (non-recursive into
    /// further subdomains unless `recursive` is set).
    pub fn list_domain(&self, domain: &str, recursive: bool) -> Result<Vec<PathBuf>, RepoError> {
        let dir = self.paths.domain_dir(domain);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        Self::collect(&dir, recursive, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn collect(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<(), RepoError> {
        for entry in fs::read_dir(dir).map_err(|e| io_err(dir, e))?.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if RESERVED_ENTRIES.contains(&name.as_ref()) {
                continue;
            }
            if path.is_dir() {
                if recursive {
                    Self::collect(&path, recursive, out)?;
                }
            } else if name.ends_with(".md") {
                out.push(path);
            }
        }
        Ok(())
    }

    /// Move every live file matching `pattern` (relative to the store
    /// root) into `destination_domain`.
    pub fn move_glob(&self, pattern: &str, destination_domain: &str) -> Result<Vec<PathBuf>, RepoError> {
        let full_pattern = self.paths.store_root.join(pattern);
        let dest_dir = self.paths.domain_dir(destination_domain);
        fs::create_dir_all(&dest_dir).map_err(|e| io_err(&dest_dir, e))?;
        let mut moved = Vec::new();
        for entry in glob::glob(&full_pattern.to_string_lossy())? {
            if let Ok(path) = entry {
                if let Some(filename) = path.file_name() {
                    let dest = dest_dir.join(filename);
                    fs::rename(&path, &dest).map_err(|e| io_err(&path, e))?;
                    moved.push(dest);
                }
            }
        }
        Ok(moved)
    }

    /// Soft-delete every live file matching `pattern` (relative to the
    /// store root).
    pub fn delete_glob(&self, pattern: &str) -> Result<Vec<PathBuf>, RepoError> {
        let full_pattern = self.paths.store_root.join(pattern);
        let trash_dir = self.paths.trash_dir();
        fs::create_dir_all(&trash_dir).map_err(|e| io_err(&trash_dir, e))?;
        let mut deleted = Vec::new();
        for entry in glob::glob(&full_pattern.to_string_lossy())? {
            if let Ok(path) = entry {
                if let Some(filename) = path.file_name() {
                    let stamp = crate::core::types::UtcTimestamp::now().to_rfc3339().replace([':', '.'], "-");
                    let dest = trash_dir.join(format!("{}__{}", stamp, filename.to_string_lossy()));
                    fs::rename(&path, &dest).map_err(|e| io_err(&path, e))?;
                    deleted.push(dest);
                }
            }
        }
        Ok(deleted)
    }

    /// Remove `.trash/` entries older than `retention_days`.
    pub fn auto_clean(&self, retention_days: u32) -> Result<Vec<PathBuf>, RepoError> {
        let trash_dir = self.paths.trash_dir();
        if !trash_dir.exists() {
            return Ok(Vec::new());
        }
        let cutoff = std::time::Duration::from_secs(u64::from(retention_days) * 24 * 3600);
        let now = std::time::SystemTime::now();
        let mut removed = Vec::new();
        for entry in fs::read_dir(&trash_dir).map_err(|e| io_err(&trash_dir, e))?.flatten() {
            let path = entry.path();
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    if now.duration_since(modified).unwrap_or_default() > cutoff {
                        let _ = fs::remove_file(&path);
                        removed.push(path);
                    }
                }
            }
        }
        Ok(removed)
    }

    /// The next unused numeric sequence for `prefix`-NNN ids, scanning
    /// live files, `.trash/`, and `.snapshots/` so a reused id can never
    /// collide with a soft-deleted or snapshotted one.
    pub fn next_sequence(&self, prefix: &str) -> u64 {
        let mut max_seen = 0u64;
        let mut stack = vec![self.paths.store_root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    if let Some(seq) = extract_sequence(name, prefix) {
                        max_seen = max_seen.max(seq);
                    }
                }
            }
        }
        max_seen + 1
    }

    /// A stable content digest for `id`, used to detect whether a file
    /// changed out from under a loaded in-memory copy.
    pub fn signature(&self, id: &RootId) -> Option<String> {
        let content = self.read_raw(id)?;
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        Some(hex::encode(hasher.finalize()))
    }
}

/// Extract the trailing numeric sequence from a filename stem like
/// `TASK-007` or `TASK-007__2026-01-01T00-00-00Z` (the trash-prefixed
/// form), given `prefix = "TASK"`.
fn extract_sequence(stem: &str, prefix: &str) -> Option<u64> {
    let candidate = stem.rsplit("__").next().unwrap_or(stem);
    let rest = candidate.strip_prefix(prefix)?.strip_prefix('-')?;
    rest.parse::<u64>().ok()
}
