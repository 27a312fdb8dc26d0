//! sync
//!
//! A pluggable hook for mirroring task state into an external tracker
//! (a GitHub Project, Jira board, or similar). The hook is intentionally
//! synchronous: the core never suspends on network I/O, so a caller that
//! wants async behavior wraps the blocking call in its own executor. This
//! is a deliberate divergence from the teacher's `Forge` trait, which is
//! `async_trait`-based because it models an inherently async REST client.
//!
//! Both [`SyncService`] methods return `bool`, meaning "the task was
//! mutated by this hook and should be re-saved." The manager treats the
//! hook as opaque and best-effort: any error is logged and swallowed, and
//! the local file remains the source of truth.

use std::fmt;

use crate::core::model::Task;

/// A lifecycle hook invoked by the manager around task save/load.
///
/// Implementors must be `Send + Sync` so a single instance can be shared
/// across threads; [`SyncService::box_clone`] exists because `Clone` is
/// not object-safe, for the rare case a caller wants one instance per
/// worker thread.
pub trait SyncService: Send + Sync {
    /// Whether this hook should run at all. A disabled hook is
    /// functionally identical to no hook being configured.
    fn enabled(&self) -> bool;

    /// Called after a successful local save. May populate
    /// `task.project_item_id` / `task.project_issue_number`. Returns
    /// `true` if the task was mutated and the caller should re-save.
    fn sync_task(&self, task: &mut Task) -> Result<bool, SyncError>;

    /// Called on load when `task.project_item_id` is already set. May
    /// mutate status, progress notes, domain, or other externally-owned
    /// fields. Returns `true` if the task was mutated.
    fn pull_task_fields(&self, task: &mut Task) -> Result<bool, SyncError>;

    fn box_clone(&self) -> Box<dyn SyncService>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("sync hook unavailable: {0}")]
    Unavailable(String),

    #[error("sync hook request failed: {0}")]
    RequestFailed(String),
}

/// The hook used when no sync provider is configured. `enabled()` is
/// always false, so the manager never calls the other two methods.
#[derive(Debug, Clone, Default)]
pub struct NoopSyncService;

impl SyncService for NoopSyncService {
    fn enabled(&self) -> bool {
        false
    }

    fn sync_task(&self, _task: &mut Task) -> Result<bool, SyncError> {
        Ok(false)
    }

    fn pull_task_fields(&self, _task: &mut Task) -> Result<bool, SyncError> {
        Ok(false)
    }

    fn box_clone(&self) -> Box<dyn SyncService> {
        Box::new(self.clone())
    }
}

/// An in-memory hook used in tests and as a reference implementation for
/// the `mock` provider named in [`crate::core::config::schema::VALID_SYNC_PROVIDERS`].
/// Assigns a deterministic fake item id on first sync and never mutates
/// fields on pull.
#[derive(Debug, Clone)]
pub struct MockSyncService {
    enabled: bool,
    next_issue_number: u64,
}

impl MockSyncService {
    pub fn new() -> Self {
        Self {
            enabled: true,
            next_issue_number: 1,
        }
    }
}

impl Default for MockSyncService {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncService for MockSyncService {
    fn enabled(&self) -> bool {
        self.enabled
    }

    fn sync_task(&self, task: &mut Task) -> Result<bool, SyncError> {
        if task.project_item_id.is_some() {
            return Ok(false);
        }
        task.project_item_id = Some(format!("MOCK_{}", task.id));
        task.project_issue_number = Some(self.next_issue_number);
        Ok(true)
    }

    fn pull_task_fields(&self, _task: &mut Task) -> Result<bool, SyncError> {
        Ok(false)
    }

    fn box_clone(&self) -> Box<dyn SyncService> {
        Box::new(self.clone())
    }
}

/// Construct the configured [`SyncService`] for `provider`, falling back
/// to [`NoopSyncService`] for `"none"` or any value this build does not
/// recognize as a live integration (currently only `"mock"` is wired to
/// real behavior; `"webhook"` is accepted by config validation but not
/// yet implemented here).
pub fn provider_for(provider: &str) -> Box<dyn SyncService> {
    match provider {
        "mock" => Box::new(MockSyncService::new()),
        _ => Box::new(NoopSyncService),
    }
}

impl fmt::Debug for dyn SyncService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncService(enabled={})", self.enabled())
    }
}
