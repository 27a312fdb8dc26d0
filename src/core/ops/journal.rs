//! core::ops::journal
//!
//! The `.history.json` undo/redo ring: a bounded sequence of before/after
//! whole-file snapshots, one per mutating `process_intent` call, with a
//! cursor separating "applied" entries from entries available for redo.
//!
//! # Storage
//!
//! - `<store_root>/.history.json` - the ring, written atomically
//!   (tempfile + rename + fsync) after every mutation
//!
//! # Invariants
//!
//! - Pushing a new entry drops any entries past the cursor (redo history
//!   is lost once a new mutation is made, same as a standard undo stack)
//! - The ring is bounded; the oldest entry is evicted once capacity is
//!   exceeded
//! - `undo`/`redo` never touch the filesystem themselves — they return the
//!   snapshot the caller must write back (or delete)

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{RootId, UtcTimestamp};

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("history i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

/// The full on-disk content of one root file at a point in time, or the
/// absence of the file (for undoing a `create` / redoing a `delete`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub root: RootId,
    pub domain: String,
    /// `None` means the file did not exist at this point.
    pub content: Option<String>,
}

impl NodeSnapshot {
    pub fn absent(root: RootId, domain: impl Into<String>) -> Self {
        Self {
            root,
            domain: domain.into(),
            content: None,
        }
    }

    pub fn present(root: RootId, domain: impl Into<String>, content: String) -> Self {
        Self {
            root,
            domain: domain.into(),
            content: Some(content),
        }
    }
}

/// One reversible mutation: what the affected file looked like before and
/// after the operation that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub intent: String,
    pub timestamp: UtcTimestamp,
    pub before: NodeSnapshot,
    pub after: NodeSnapshot,
}

/// The undo/redo ring for a single store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    entries: Vec<HistoryEntry>,
    /// Number of entries currently "applied"; `entries[..cursor]` is the
    /// undo stack, `entries[cursor..]` is available for redo.
    cursor: usize,
    #[serde(default = "default_capacity")]
    capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for History {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity,
        }
    }

    /// Record a new mutation, discarding any redo entries past the
    /// current cursor.
    pub fn push(&mut self, intent: impl Into<String>, before: NodeSnapshot, after: NodeSnapshot) {
        self.entries.truncate(self.cursor);
        self.entries.push(HistoryEntry {
            intent: intent.into(),
            timestamp: UtcTimestamp::now(),
            before,
            after,
        });
        self.cursor = self.entries.len();
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(0..overflow);
            self.cursor -= overflow;
        }
    }

    /// Step the cursor back one entry and return the snapshot that should
    /// be written back to disk to undo it.
    pub fn undo(&mut self) -> Result<&NodeSnapshot, JournalError> {
        if self.cursor == 0 {
            return Err(JournalError::NothingToUndo);
        }
        self.cursor -= 1;
        Ok(&self.entries[self.cursor].before)
    }

    /// Step the cursor forward one entry and return the snapshot that
    /// should be written back to disk to redo it.
    pub fn redo(&mut self) -> Result<&NodeSnapshot, JournalError> {
        if self.cursor >= self.entries.len() {
            return Err(JournalError::NothingToRedo);
        }
        let snapshot = &self.entries[self.cursor].after;
        self.cursor += 1;
        Ok(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the undo stack, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<&HistoryEntry> {
        self.entries[..self.cursor].iter().rev().take(limit).collect()
    }

    /// Read `<store_root>/.history.json`, returning an empty ring if it
    /// does not exist yet.
    pub fn load(store_root: &Path) -> Result<Self, JournalError> {
        let path = store_root.join(".history.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Write the ring atomically: write to a temp file in the same
    /// directory, fsync it, then rename over the target.
    pub fn save(&self, store_root: &Path) -> Result<(), JournalError> {
        fs::create_dir_all(store_root)?;
        let path = store_root.join(".history.json");
        let tmp_path = store_root.join(".history.json.tmp");
        let data = serde_json::to_string_pretty(self)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(data.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskId;
    use tempfile::TempDir;

    fn root() -> RootId {
        RootId::Task(TaskId::new("TASK-001").unwrap())
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let mut history = History::default();
        history.push(
            "edit",
            NodeSnapshot::present(root(), "", "before".into()),
            NodeSnapshot::present(root(), "", "after".into()),
        );
        assert_eq!(history.undo().unwrap().content.as_deref(), Some("before"));
        assert_eq!(history.redo().unwrap().content.as_deref(), Some("after"));
    }

    #[test]
    fn undo_on_empty_history_errors() {
        let mut history = History::default();
        assert!(matches!(history.undo(), Err(JournalError::NothingToUndo)));
    }

    #[test]
    fn new_push_discards_redo_tail() {
        let mut history = History::default();
        history.push("a", NodeSnapshot::absent(root(), ""), NodeSnapshot::present(root(), "", "a".into()));
        history.undo().unwrap();
        assert!(history.can_redo());
        history.push("b", NodeSnapshot::absent(root(), ""), NodeSnapshot::present(root(), "", "b".into()));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut history = History::new(2);
        for i in 0..5 {
            history.push(
                format!("op-{i}"),
                NodeSnapshot::absent(root(), ""),
                NodeSnapshot::present(root(), "", i.to_string()),
            );
        }
        assert_eq!(history.len(), 2);
        assert!(history.can_undo());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let mut history = History::default();
        history.push("edit", NodeSnapshot::absent(root(), ""), NodeSnapshot::present(root(), "", "x".into()));
        history.save(temp.path()).unwrap();
        let loaded = History::load(temp.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.can_undo());
    }

    #[test]
    fn load_missing_file_returns_empty_history() {
        let temp = TempDir::new().unwrap();
        let history = History::load(temp.path()).unwrap();
        assert!(history.is_empty());
    }
}
