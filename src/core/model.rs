//! core::model
//!
//! The recursive node tree: a [`Step`] may carry a nested [`PlanNode`] when
//! it has been decomposed into sub-work, a [`PlanNode`] groups an ordered
//! list of high-level steps alongside a detailed [`TaskNode`] breakdown,
//! and a [`TaskNode`] owns the [`Step`]s that make it concrete. [`Plan`]
//! and [`Task`] are the two root kinds a store file can hold.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::evidence::{Attachment, VerificationCheck};
use crate::core::events::NodeEvent;
use crate::core::status::Status;
use crate::core::types::{Domain, NodeId, PlanId, Priority, StepId, TaskId, UtcTimestamp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("a step must have at least one non-empty success criterion")]
    MissingCriteria,
}

/// A single unit of concrete, checkable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub title: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub criteria_confirmed: bool,
    #[serde(default)]
    pub tests_confirmed: bool,
    /// Always false: criteria confirmation is never auto-granted.
    #[serde(default)]
    pub criteria_auto_confirmed: bool,
    /// True only when the step was created with no tests listed.
    #[serde(default)]
    pub tests_auto_confirmed: bool,
    #[serde(default)]
    pub criteria_notes: String,
    #[serde(default)]
    pub tests_notes: String,
    pub created_at: UtcTimestamp,
    #[serde(default)]
    pub started_at: Option<UtcTimestamp>,
    #[serde(default)]
    pub completed_at: Option<UtcTimestamp>,
    #[serde(default)]
    pub progress_notes: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub block_reason: String,
    /// A nested decomposition of this step into its own sub-plan.
    #[serde(default)]
    pub plan: Option<Box<PlanNode>>,
    #[serde(default)]
    pub verification_checks: Vec<VerificationCheck>,
    #[serde(default)]
    pub verification_outcome: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Step {
    /// Construct a new step. `success_criteria` must contain at least one
    /// non-blank entry; `tests` and `blockers` are normalized (trimmed,
    /// blanks dropped) and may be empty.
    pub fn new(
        title: impl Into<String>,
        success_criteria: Vec<String>,
        tests: Vec<String>,
        blockers: Vec<String>,
    ) -> Result<Self, ModelError> {
        let success_criteria = normalize_list(success_criteria);
        if success_criteria.is_empty() {
            return Err(ModelError::MissingCriteria);
        }
        let tests = normalize_list(tests);
        let blockers = normalize_list(blockers);
        let tests_auto_confirmed = tests.is_empty();
        Ok(Self {
            id: StepId::generate(),
            title: title.into(),
            success_criteria,
            tests,
            blockers,
            completed: false,
            criteria_confirmed: false,
            tests_confirmed: false,
            criteria_auto_confirmed: false,
            tests_auto_confirmed,
            criteria_notes: String::new(),
            tests_notes: String::new(),
            created_at: UtcTimestamp::now(),
            started_at: None,
            completed_at: None,
            progress_notes: Vec::new(),
            blocked: false,
            block_reason: String::new(),
            plan: None,
            verification_checks: Vec::new(),
            verification_outcome: String::new(),
            attachments: Vec::new(),
        })
    }

    /// Not blocked, criteria confirmed, tests confirmed (or auto-confirmed
    /// because none were listed), and if a nested plan exists, every one
    /// of its tasks is done.
    pub fn ready_for_completion(&self) -> bool {
        if self.blocked || !self.criteria_confirmed {
            return false;
        }
        if !(self.tests_confirmed || self.tests_auto_confirmed) {
            return false;
        }
        match &self.plan {
            Some(plan) => plan.tasks.iter().all(TaskNode::is_done),
            None => true,
        }
    }

    pub fn status_value(&self) -> &'static str {
        if self.completed {
            Status::Done.code()
        } else if self.ready_for_completion() {
            Status::Active.code()
        } else {
            Status::Todo.code()
        }
    }

    /// A finer-grained lifecycle label used by progress summaries.
    pub fn computed_status(&self) -> &'static str {
        if self.completed {
            "completed"
        } else if self.blocked {
            "blocked"
        } else if !self.progress_notes.is_empty()
            || self.criteria_confirmed
            || self.tests_confirmed
            || self.started_at.is_some()
        {
            "in_progress"
        } else {
            "pending"
        }
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
        self.completed_at = Some(UtcTimestamp::now());
    }
}

fn normalize_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Walk a step and its nested plan tree in pre-order, collecting every step.
fn flatten_step_tree<'a>(step: &'a Step, out: &mut Vec<&'a Step>) {
    out.push(step);
    if let Some(plan) = &step.plan {
        for task in &plan.tasks {
            for child in &task.steps {
                flatten_step_tree(child, out);
            }
        }
    }
}

fn count_step_tree(steps: &[Step]) -> (usize, usize) {
    let mut all = Vec::new();
    for step in steps {
        flatten_step_tree(step, &mut all);
    }
    let total = all.len();
    let done = all.iter().filter(|s| s.completed).count();
    (total, done)
}

/// A detailed, checkable breakdown of one piece of work, owning an
/// ordered list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: NodeId,
    pub title: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub criteria_confirmed: bool,
    #[serde(default)]
    pub tests_confirmed: bool,
    #[serde(default)]
    pub criteria_auto_confirmed: bool,
    #[serde(default)]
    pub tests_auto_confirmed: bool,
    #[serde(default)]
    pub criteria_notes: String,
    #[serde(default)]
    pub tests_notes: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// When true, `status` is authoritative and is not recomputed from
    /// step progress.
    #[serde(default)]
    pub status_manual: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

fn default_status() -> String {
    Status::Todo.code().to_string()
}

impl TaskNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: NodeId::generate(),
            title: title.into(),
            status: default_status(),
            priority: Priority::default(),
            description: String::new(),
            context: String::new(),
            success_criteria: Vec::new(),
            tests: Vec::new(),
            criteria_confirmed: false,
            tests_confirmed: false,
            criteria_auto_confirmed: false,
            tests_auto_confirmed: false,
            criteria_notes: String::new(),
            tests_notes: String::new(),
            dependencies: Vec::new(),
            next_steps: Vec::new(),
            problems: Vec::new(),
            risks: Vec::new(),
            blocked: false,
            blockers: Vec::new(),
            steps: Vec::new(),
            status_manual: false,
            attachments: Vec::new(),
        }
    }

    /// Percentage (0-100) of steps in this node's tree that are complete.
    /// A task with no steps at all reports 0.
    pub fn calculate_progress(&self) -> u8 {
        let (total, done) = count_step_tree(&self.steps);
        if total == 0 {
            0
        } else {
            ((done * 100) / total) as u8
        }
    }

    pub fn is_done(&self) -> bool {
        if self.blocked {
            return false;
        }
        if self.status_manual {
            Status::from_str_lossy(&self.status) == Status::Done
        } else {
            self.calculate_progress() == 100 && !self.steps.is_empty()
        }
    }
}

/// A decomposition plan nested inside a step, or the body of a root
/// [`Plan`]: an ordered outline of high-level steps plus the detailed
/// tasks that realize them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub title: String,
    #[serde(default)]
    pub doc: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub criteria_confirmed: bool,
    #[serde(default)]
    pub tests_confirmed: bool,
    #[serde(default)]
    pub criteria_auto_confirmed: bool,
    #[serde(default)]
    pub tests_auto_confirmed: bool,
    /// Ordered outline of the high-level steps this plan intends to take.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Index into `steps` of the step currently being worked.
    #[serde(default)]
    pub current: usize,
    #[serde(default)]
    pub tasks: Vec<TaskNode>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl PlanNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            doc: String::new(),
            success_criteria: Vec::new(),
            tests: Vec::new(),
            blockers: Vec::new(),
            criteria_confirmed: false,
            tests_confirmed: false,
            criteria_auto_confirmed: false,
            tests_auto_confirmed: false,
            steps: Vec::new(),
            current: 0,
            tasks: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn is_advanced_fully(&self) -> bool {
        !self.steps.is_empty() && self.current >= self.steps.len()
    }

    /// All tasks in this plan are done, independent of the outline index.
    pub fn all_tasks_done(&self) -> bool {
        self.tasks.iter().all(TaskNode::is_done)
    }
}

/// A root, file-owning plan. Revision increments on every mutation and is
/// used as the optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    #[serde(default)]
    pub domain: Domain,
    pub revision: u64,
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
    #[serde(flatten)]
    pub node: PlanNode,
}

impl Plan {
    pub fn new(id: PlanId, domain: Domain, title: impl Into<String>) -> Self {
        let now = UtcTimestamp::now();
        Self {
            id,
            domain,
            revision: 1,
            created_at: now,
            updated_at: now,
            node: PlanNode::new(title),
        }
    }

    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = UtcTimestamp::now();
    }
}

/// A root, file-owning task. Dependency edges (`depends_on`) are between
/// root tasks only; embedded [`TaskNode`]s reached by decomposition do not
/// participate in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(default)]
    pub domain: Domain,
    pub revision: u64,
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Opaque external tracker item id, populated by a [`crate::sync::SyncService`]
    /// hook after the first successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_issue_number: Option<u64>,
    /// The append-only log of everything done to this root since creation.
    #[serde(default)]
    pub events: Vec<NodeEvent>,
    #[serde(flatten)]
    pub node: TaskNode,
}

impl Task {
    pub fn new(id: TaskId, domain: Domain, title: impl Into<String>) -> Self {
        let now = UtcTimestamp::now();
        Self {
            id,
            domain,
            revision: 1,
            created_at: now,
            updated_at: now,
            depends_on: Vec::new(),
            project_item_id: None,
            project_issue_number: None,
            events: Vec::new(),
            node: TaskNode::new(title),
        }
    }

    pub fn record(&mut self, event: NodeEvent) {
        self.events.push(event);
    }

    pub fn touch(&mut self) {
        self.revision += 1;
        self.updated_at = UtcTimestamp::now();
    }
}
