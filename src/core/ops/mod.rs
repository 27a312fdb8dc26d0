//! core::ops
//!
//! Undo/redo history and the store-wide lock.
//!
//! # Modules
//!
//! - [`journal`] - the `.history.json` undo/redo ring
//! - [`lock`] - exclusive store lock
//!
//! # Architecture
//!
//! Every mutating intent:
//! 1. Acquires the store lock
//! 2. Snapshots the affected file's before-content
//! 3. Applies the mutation and snapshots the after-content
//! 4. Pushes a [`journal::HistoryEntry`] onto the ring and saves it

pub mod journal;
pub mod lock;

pub use journal::{History, HistoryEntry, JournalError, NodeSnapshot};
pub use lock::{LockError, StoreLock};
