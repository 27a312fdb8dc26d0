//! manager
//!
//! The orchestrator sitting above [`crate::repository`]: loads and saves
//! root nodes, bumps their revision, invokes the configured
//! [`crate::sync::SyncService`] hook, appends undo/redo history, maintains
//! the `.last` focus pointer, and runs the `.trash/` retention sweep. No
//! other module in this crate touches the filesystem directly for these
//! concerns — callers (the intent processor, the CLI) go through here.
//!
//! Grounded in the teacher's `engine::run_lifecycle` orchestration shape:
//! one coordinator threading a fixed sequence of steps (here: lock ->
//! load -> mutate -> sync -> save -> journal -> unlock) through a single
//! entry point per operation, with errors collected into one enum.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::config::Config;
use crate::core::graph::DependencyGraph;
use crate::core::model::{Plan, Task};
use crate::core::ops::journal::{History, JournalError, NodeSnapshot};
use crate::core::ops::lock::{LockError, StoreLock};
use crate::core::paths::StorePaths;
use crate::core::status::Status;
use crate::core::types::{Domain, RootId, TaskId};
use crate::repository::{RepoError, Repository};
use crate::sync::{provider_for, SyncService};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("config error: {0}")]
    Config(#[from] crate::core::config::ConfigError),

    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// The orchestrator for one open store.
pub struct Manager {
    repo: Repository,
    paths: StorePaths,
    config: Config,
    sync: Box<dyn SyncService>,
}

impl Manager {
    pub fn open(store_root: impl Into<PathBuf>) -> Result<Self, ManagerError> {
        let store_root = store_root.into();
        let paths = StorePaths::new(&store_root);
        paths.ensure_dirs().map_err(|source| ManagerError::Io {
            path: store_root.clone(),
            source,
        })?;
        let config = Config::load(Some(&store_root))?;
        let sync = provider_for(&config.sync_provider());
        Ok(Self {
            repo: Repository::new(&store_root),
            paths,
            config,
            sync,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    fn lock(&self) -> Result<StoreLock, ManagerError> {
        Ok(StoreLock::acquire(&self.paths.store_root)?)
    }

    /// Create a new task, run the sync hook once, write it, push history,
    /// and update `.last`.
    pub fn create_task(&self, domain: &str, mut task: Task) -> Result<Task, ManagerError> {
        let _lock = self.lock()?;
        let root = RootId::Task(task.id.clone());
        let before = NodeSnapshot::absent(root.clone(), domain.to_string());

        if self.sync.enabled() {
            let _ = self.sync.sync_task(&mut task);
        }
        self.repo.create_task(domain, &task)?;

        let after = NodeSnapshot::present(root.clone(), domain.to_string(), crate::core::codec::render_task(&task));
        self.push_history("create", before, after)?;
        self.set_last(&root)?;
        Ok(task)
    }

    /// Load a task, running the pull-side sync hook and re-saving if it
    /// mutated anything.
    pub fn load_task(&self, id: &TaskId) -> Result<Task, ManagerError> {
        let mut task = self.repo.read_task(id)?;
        if self.sync.enabled() && task.project_item_id.is_some() {
            let mutated = self.sync.pull_task_fields(&mut task).unwrap_or(false);
            if mutated {
                let domain = task.domain.as_str().to_string();
                let _ = self.repo.write_task_cas(&domain, &task, task.revision);
            }
        }
        Ok(task)
    }

    /// Apply a mutation to a task under the revision gate, bump its
    /// revision, run the sync hook, save, and push history.
    pub fn update_task<F>(&self, id: &TaskId, expected_revision: u64, mutate: F) -> Result<Task, ManagerError>
    where
        F: FnOnce(&mut Task),
    {
        let _lock = self.lock()?;
        let root = RootId::Task(id.clone());
        let before_content = self.repo.read_raw(&root);
        let mut task = self.repo.read_task(id)?;

        if task.revision != expected_revision {
            return Err(ManagerError::Repo(RepoError::RevisionConflict {
                expected: expected_revision,
                actual: task.revision,
            }));
        }

        mutate(&mut task);
        task.touch();

        if self.sync.enabled() {
            let _ = self.sync.sync_task(&mut task);
        }

        let domain = task.domain.as_str().to_string();
        self.repo.write_task_cas(&domain, &task, expected_revision)?;

        let before = NodeSnapshot {
            root: root.clone(),
            domain: domain.clone(),
            content: before_content,
        };
        let after = NodeSnapshot::present(root.clone(), domain, crate::core::codec::render_task(&task));
        self.push_history("update", before, after)?;
        self.set_last(&root)?;
        Ok(task)
    }

    /// Soft-delete a task, recording the pre-delete content so `undo` can
    /// restore it.
    pub fn delete_task(&self, id: &TaskId) -> Result<(), ManagerError> {
        let _lock = self.lock()?;
        let root = RootId::Task(id.clone());
        let task = self.repo.read_task(id)?;
        let domain = task.domain.as_str().to_string();
        let before = NodeSnapshot::present(root.clone(), domain.clone(), crate::core::codec::render_task(&task));
        self.repo.soft_delete(&root)?;
        let after = NodeSnapshot::absent(root, domain);
        self.push_history("delete", before, after)?;
        Ok(())
    }

    /// Number of entries currently on the undo/redo stack. Batches use
    /// this to snapshot the stack depth before running and unwind back
    /// to it (one `undo()` per entry pushed since) if a later op fails.
    pub fn history_len(&self) -> Result<usize, ManagerError> {
        let _lock = self.lock()?;
        Ok(History::load(&self.paths.store_root)?.len())
    }

    /// Undo the most recent history entry, restoring whichever file
    /// content (or absence) it recorded as "before".
    pub fn undo(&self) -> Result<(), ManagerError> {
        let _lock = self.lock()?;
        let mut history = History::load(&self.paths.store_root)?;
        let snapshot = history.undo()?.clone();
        self.apply_snapshot(&snapshot)?;
        history.save(&self.paths.store_root)?;
        Ok(())
    }

    pub fn redo(&self) -> Result<(), ManagerError> {
        let _lock = self.lock()?;
        let mut history = History::load(&self.paths.store_root)?;
        let snapshot = history.redo()?.clone();
        self.apply_snapshot(&snapshot)?;
        history.save(&self.paths.store_root)?;
        Ok(())
    }

    fn apply_snapshot(&self, snapshot: &NodeSnapshot) -> Result<(), ManagerError> {
        match &snapshot.content {
            Some(content) => self.repo.write_raw(&snapshot.domain, &snapshot.root, content)?,
            None => self.repo.remove_raw(&snapshot.root)?,
        }
        Ok(())
    }

    fn push_history(&self, intent: &str, before: NodeSnapshot, after: NodeSnapshot) -> Result<(), ManagerError> {
        let mut history = History::load(&self.paths.store_root)
            .unwrap_or_else(|_| History::new(self.config.history_capacity()));
        history.push(intent.to_string(), before, after);
        history.save(&self.paths.store_root)?;
        Ok(())
    }

    /// Record `root` as the most recently touched node, for bare `resume`.
    fn set_last(&self, root: &RootId) -> Result<(), ManagerError> {
        let path = self.paths.last_pointer_path();
        std::fs::write(&path, root.as_str()).map_err(|source| ManagerError::Io { path, source })
    }

    /// Read the `.last` focus pointer, if any root has been touched yet.
    pub fn last(&self) -> Option<RootId> {
        let content = std::fs::read_to_string(self.paths.last_pointer_path()).ok()?;
        RootId::parse(content.trim()).ok()
    }

    /// Sweep `.trash/` for entries past the configured retention window.
    pub fn auto_clean(&self) -> Result<Vec<PathBuf>, ManagerError> {
        Ok(self.repo.auto_clean(self.config.retention_days())?)
    }

    /// Sweep live DONE roots whose `updated_at` is older than `retention`
    /// into `.trash/`, unless another still-live root lists it as a
    /// dependency - a dependency-shielded root is kept regardless of age,
    /// mirroring the teacher's stack-aware prune (a branch with an open
    /// child stack is never reaped even past its own retention window).
    pub fn sweep_stale_done(&self, retention: std::time::Duration) -> Result<Vec<TaskId>, ManagerError> {
        let _lock = self.lock()?;
        let paths = self.repo.list_domain("", true)?;
        let tasks: Vec<Task> = paths
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok())
            .filter_map(|content| crate::core::codec::parse_task(&content).ok())
            .map(|parsed| parsed.task)
            .collect();

        let mut graph = DependencyGraph::new();
        for task in &tasks {
            for dep in &task.depends_on {
                graph.add_edge(task.id.clone(), dep.clone());
            }
        }

        let now = crate::core::types::UtcTimestamp::now().as_datetime();
        let mut swept = Vec::new();
        for task in &tasks {
            if Status::from_str_lossy(&task.node.status) != Status::Done {
                continue;
            }
            let age = now.signed_duration_since(task.updated_at.as_datetime());
            if age.to_std().unwrap_or_default() < retention {
                continue;
            }
            if !graph.dependents_of(&task.id).is_empty() {
                continue;
            }

            let root = RootId::Task(task.id.clone());
            let domain = task.domain.as_str().to_string();
            let before = NodeSnapshot::present(root.clone(), domain.clone(), crate::core::codec::render_task(task));
            self.repo.soft_delete(&root)?;
            let after = NodeSnapshot::absent(root, domain);
            self.push_history("sweep_stale_done", before, after)?;
            swept.push(task.id.clone());
        }
        Ok(swept)
    }

    pub fn next_plan_id(&self) -> crate::core::types::PlanId {
        crate::core::types::PlanId::from_sequence(self.repo.next_sequence("PLAN"))
    }

    pub fn next_task_id(&self) -> TaskId {
        TaskId::from_sequence(self.repo.next_sequence("TASK"))
    }

    pub fn default_domain(&self) -> Domain {
        Domain::new(self.config.default_domain()).unwrap_or_default()
    }

    pub fn store_root(&self) -> &Path {
        &self.paths.store_root
    }
}

/// Placeholder for the not-yet-built Plan CRUD surface: plans share the
/// same repository and history mechanics as tasks once `core::codec`
/// grows full `parse_plan`/`render_plan` support (see DESIGN.md).
pub fn plan_placeholder(_plan: &Plan) {}
