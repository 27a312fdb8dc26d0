//! tasktree - a file-backed, revision-versioned hierarchical task tracking
//! engine.
//!
//! tasktree stores Plans and Tasks as Markdown files with a YAML metadata
//! preamble, nested arbitrarily deep through Steps that can themselves
//! decompose into further Plans and Tasks. A single intent-processor entry
//! point mediates every mutation with optimistic concurrency (a monotonic
//! `revision` per root file) and cycle-safe dependency validation.
//!
//! # Architecture
//!
//! - [`core`] - domain types, the on-disk codec, the dependency graph,
//!   undo/redo history, the store-wide lock, and configuration
//! - [`repository`] - filesystem CRUD over root files, with
//!   revision-gated optimistic-concurrency writes
//! - [`sync`] - the optional external-tracker mirroring hook
//! - [`manager`] - orchestrates load/save/delete through the repository,
//!   sync hook, and undo/redo history
//! - [`intent`] - the single `process_intent` entry point every adapter
//!   (CLI, MCP, TUI) calls through
//!
//! # Correctness invariants
//!
//! 1. Every mutation flows through [`intent::process_intent`]
//! 2. A write against a stale `revision` is rejected, never silently merged
//! 3. The dependency graph is verified cycle-free before any edge commits
//! 4. Undo/redo operates on whole-file snapshots, never partial edits

pub mod core;
pub mod intent;
pub mod manager;
pub mod repository;
pub mod sync;
