//! intent
//!
//! The single entry point every adapter (CLI, MCP, TUI) calls through:
//! [`process_intent`] takes a manager and a JSON request tagged by an
//! `intent` field, and returns a JSON-serializable envelope. This mirrors
//! the teacher's `engine::run_lifecycle` shape (one coordinator threading
//! a fixed sequence of stages) collapsed into a dynamic dispatch over a
//! tagged union, per the redesign decision recorded in DESIGN.md:
//! `process_intent` is a match over the intent name, each arm deriving
//! its own strongly-typed parameters from the request object.
//!
//! Scope note (recorded in full in DESIGN.md): the processor operates
//! against [`crate::core::model::Task`] roots. Plan roots share the same
//! manager/repository plumbing but wait on `core::codec` growing a full
//! `parse_plan`/`render_plan` counterpart before `create(kind=plan)` and
//! friends can round-trip through a file; `create(kind=plan)` here
//! returns `NOT_IMPLEMENTED` rather than silently mis-serializing.
//! Likewise, step path resolution addresses the task's top-level `steps`
//! list by `StepId` or numeric index — the data model already supports
//! steps decomposing into nested plans (`Step.plan`), but walking into
//! that nesting from a request path is future work, not exercised here.

mod error;
mod response;

pub use error::ErrorCode;
pub use response::{ErrorRecovery, ResponseContext, Suggestion, TargetResolution};

use serde_json::{json, Value};

use crate::core::events::{Actor, NodeEvent};
use crate::core::graph::DependencyGraph;
use crate::core::model::{Step, Task};
use crate::core::status::Status;
use crate::core::types::{Checkpoint, Priority, TaskId};
use crate::manager::{Manager, ManagerError};
use crate::repository::RepoError;
use response::IntentResponse;

const MAX_ARRAY_LENGTH: usize = 100;
const MAX_STRING_LEN: usize = 16 * 1024;

/// Intents that never mutate the store and are exempt from the
/// strict-targeting gate.
const READ_ONLY_INTENTS: &[&str] = &["context", "resume", "radar", "handoff", "mirror", "storage", "history"];

/// Entry point: dispatch `request` (must carry an `"intent"` string
/// field) against `manager` and return the response envelope as JSON.
#[tracing::instrument(skip(manager, request), fields(intent = tracing::field::Empty))]
pub fn process_intent(manager: &Manager, request: Value) -> Value {
    let intent = request.get("intent").and_then(Value::as_str).unwrap_or("").to_string();
    tracing::Span::current().record("intent", &intent.as_str());
    tracing::debug!("processing intent");

    let outcome = dispatch(manager, &intent, &request);
    let response = match outcome {
        Ok(response) => response,
        Err((code, message)) => {
            tracing::warn!(error_code = %code, %message, "intent failed");
            IntentResponse::failure(intent.clone(), code, message)
        }
    };
    serde_json::to_value(response).unwrap_or_else(|e| json!({"success": false, "error_message": e.to_string()}))
}

type IntentResult = Result<IntentResponse, (ErrorCode, String)>;

fn dispatch(manager: &Manager, intent: &str, request: &Value) -> IntentResult {
    if !READ_ONLY_INTENTS.contains(&intent) {
        guard_strict_targeting(manager, intent, request)?;
    }

    match intent {
        "context" => intent_context(manager, request),
        "create" => intent_create(manager, request),
        "decompose" => intent_decompose(manager, request),
        "task_add" => intent_task_add(manager, request),
        "define" => intent_define(manager, request),
        "task_define" => intent_define(manager, request),
        "verify" => intent_verify(manager, request),
        "progress" => intent_progress(manager, request),
        "done" => intent_done(manager, request, true),
        "complete" => intent_done(manager, request, false),
        "delete" => intent_delete(manager, request),
        "note" => intent_note(manager, request),
        "block" => intent_block(manager, request),
        "patch" => intent_patch(manager, request),
        "edit" => intent_edit(manager, request),
        "batch" => intent_batch(manager, request),
        "undo" => intent_undo(manager, "undo"),
        "redo" => intent_undo(manager, "redo"),
        "history" => intent_history(manager, request),
        "storage" => intent_storage(manager),
        "resume" => intent_resume(manager, request),
        "radar" => intent_radar(manager, request),
        "handoff" => intent_handoff(manager, request),
        "close_task" => intent_close_task(manager, request),
        "mirror" => intent_mirror(manager, request),
        other => Err((ErrorCode::UnknownIntent, format!("unrecognized intent '{other}'"))),
    }
}

// ---------------------------------------------------------------------
// Target resolution & guards
// ---------------------------------------------------------------------

fn resolve_target(manager: &Manager, request: &Value) -> Result<(TaskId, TargetResolution), (ErrorCode, String)> {
    if let Some(task) = request.get("task").and_then(Value::as_str) {
        let id = parse_task_id(task)?;
        return Ok((id, TargetResolution::explicit(task)));
    }
    match manager.last() {
        Some(crate::core::types::RootId::Task(id)) => {
            let resolved = id.to_string();
            Ok((id, TargetResolution::focus(resolved)))
        }
        _ => Err((ErrorCode::TargetNotFound, "no task given and no focus pointer is set".to_string())),
    }
}

fn parse_task_id(value: &str) -> Result<TaskId, (ErrorCode, String)> {
    TaskId::new(value).map_err(|e| (ErrorCode::InvalidRequest, e.to_string()))
}

/// Strict-targeting gate: requires `expected_target_id` whenever the
/// caller opts in explicitly, or auto-strict engages because more than
/// one task in the store is ACTIVE.
fn guard_strict_targeting(manager: &Manager, intent: &str, request: &Value) -> Result<(), (ErrorCode, String)> {
    let explicit_strict = request
        .get("strict_targeting")
        .or_else(|| request.get("strict_writes"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let active_count = count_active_tasks(manager);
    let auto_strict = active_count > 1;

    if !explicit_strict && !auto_strict {
        return Ok(());
    }

    let expected = request
        .get("expected_target_id")
        .or_else(|| request.get("expected_target"))
        .and_then(Value::as_str);

    let Some(expected) = expected else {
        return Err((
            ErrorCode::StrictTargetingRequiresExpectedTargetId,
            format!("intent '{intent}' requires expected_target_id ({active_count} active roots)"),
        ));
    };

    if let Some(task) = request.get("task").and_then(Value::as_str) {
        if task != expected {
            return Err((
                ErrorCode::ExpectedTargetMismatch,
                format!("expected_target_id '{expected}' does not match resolved target '{task}'"),
            ));
        }
    }
    Ok(())
}

fn count_active_tasks(manager: &Manager) -> usize {
    manager
        .repository()
        .list_domain("", true)
        .unwrap_or_default()
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .filter_map(|content| crate::core::codec::parse_task(&content).ok())
        .filter(|parsed| Status::from_str_lossy(&parsed.task.node.status) == Status::Active)
        .count()
}

/// The revision gate: when `expected_revision` is present, compare it
/// against the task's current on-disk revision before any mutation.
fn guard_revision(request: &Value, current: u64) -> Result<(), (ErrorCode, String)> {
    if let Some(expected) = request.get("expected_revision").and_then(Value::as_u64) {
        if expected != current {
            return Err((
                ErrorCode::RevisionMismatch,
                format!("expected revision {expected}, found {current}"),
            ));
        }
    }
    Ok(())
}

fn load(manager: &Manager, id: &TaskId) -> Result<Task, (ErrorCode, String)> {
    manager.load_task(id).map_err(map_manager_error)
}

fn map_manager_error(err: ManagerError) -> (ErrorCode, String) {
    match err {
        ManagerError::Repo(RepoError::NotFound(id)) => (ErrorCode::NotFound, format!("{id} not found")),
        ManagerError::Repo(RepoError::RevisionConflict { expected, actual }) => (
            ErrorCode::RevisionMismatch,
            format!("expected revision {expected}, found {actual}"),
        ),
        ManagerError::Lock(_) => (ErrorCode::StoreLocked, "store is locked by another process".to_string()),
        other => (ErrorCode::Internal, other.to_string()),
    }
}

fn truncate_str(value: &str) -> String {
    if value.len() > MAX_STRING_LEN {
        value[..MAX_STRING_LEN].to_string()
    } else {
        value.to_string()
    }
}

fn truncate_list(values: Vec<String>) -> Vec<String> {
    values.into_iter().take(MAX_ARRAY_LENGTH).map(|s| truncate_str(&s)).collect()
}

// ---------------------------------------------------------------------
// context / storage / resume / mirror
// ---------------------------------------------------------------------

fn intent_context(manager: &Manager, request: &Value) -> IntentResult {
    if let Some(task) = request.get("task").and_then(Value::as_str) {
        let id = parse_task_id(task)?;
        let t = load(manager, &id)?;
        return Ok(IntentResponse::success(
            "context",
            json!({
                "id": t.id.to_string(),
                "domain": t.domain.to_string(),
                "revision": t.revision,
                "status": t.node.status,
                "progress": t.node.calculate_progress(),
            }),
            TargetResolution::explicit(task),
        ));
    }

    let focus = manager.last();
    Ok(IntentResponse::success(
        "context",
        json!({ "focus": focus.map(|r| r.to_string()) }),
        TargetResolution::none(),
    ))
}

fn intent_storage(manager: &Manager) -> IntentResult {
    let paths = manager.repository().list_domain("", true).map_err(|e| (ErrorCode::Internal, e.to_string()))?;
    let mut by_status: std::collections::BTreeMap<String, u64> = std::collections::BTreeMap::new();
    for path in &paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(parsed) = crate::core::codec::parse_task(&content) {
                *by_status.entry(parsed.task.node.status).or_insert(0) += 1;
            }
        }
    }
    let trash_count = std::fs::read_dir(manager.repository().paths().trash_dir())
        .map(|rd| rd.count())
        .unwrap_or(0);
    Ok(IntentResponse::success(
        "storage",
        json!({
            "root_count": paths.len(),
            "by_status": by_status,
            "trash_count": trash_count,
        }),
        TargetResolution::none(),
    ))
}

fn intent_resume(manager: &Manager, request: &Value) -> IntentResult {
    let (id, resolution) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    Ok(IntentResponse::success(
        "resume",
        json!({ "id": task.id.to_string(), "revision": task.revision, "status": task.node.status }),
        resolution,
    ))
}

fn intent_mirror(manager: &Manager, request: &Value) -> IntentResult {
    let (id, resolution) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    Ok(IntentResponse::success("mirror", serde_json::to_value(&task).unwrap_or(Value::Null), resolution))
}

fn intent_history(manager: &Manager, _request: &Value) -> IntentResult {
    let history = crate::core::ops::journal::History::load(manager.store_root())
        .map_err(|e| (ErrorCode::Internal, e.to_string()))?;
    let recent = history.recent(20);
    let events: Vec<Value> = recent
        .iter()
        .map(|entry| json!({"intent": entry.intent, "timestamp": entry.timestamp.to_rfc3339(), "root": entry.after.root.to_string()}))
        .collect();
    Ok(IntentResponse::success("history", json!({ "entries": events }), TargetResolution::none()))
}

// ---------------------------------------------------------------------
// create
// ---------------------------------------------------------------------

fn intent_create(manager: &Manager, request: &Value) -> IntentResult {
    let kind = request.get("kind").and_then(Value::as_str).unwrap_or("task");
    if kind != "task" {
        return Err((ErrorCode::NotImplemented, "plan-root creation is not yet implemented".to_string()));
    }
    let title = request
        .get("title")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "create requires 'title'".to_string()))?;
    // Mirrors the teacher's `create --message` fallback: an explicit
    // domain wins, otherwise one is derived from the title the same way
    // a branch name is derived from a commit message when none is given.
    let domain = request.get("domain").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| {
        let slug = crate::core::naming::slugify(title);
        if slug.is_empty() {
            manager.default_domain().to_string()
        } else {
            slug
        }
    });

    let id = manager.next_task_id();
    let domain_value = crate::core::types::Domain::new(domain.clone()).map_err(|e| (ErrorCode::InvalidRequest, e.to_string()))?;
    let mut task = Task::new(id, domain_value, truncate_str(title));

    if let Some(priority) = request.get("priority").and_then(Value::as_str) {
        task.node.priority = priority.parse::<Priority>().unwrap_or_default();
    }

    let created = manager.create_task(&domain, task).map_err(map_manager_error)?;
    Ok(IntentResponse::success(
        "create",
        json!({ "id": created.id.to_string(), "domain": created.domain.to_string() }),
        TargetResolution::explicit(created.id.to_string()),
    )
    .with_revision(created.revision))
}

// ---------------------------------------------------------------------
// decompose / task_add / define
// ---------------------------------------------------------------------

fn find_step_index(task: &Task, step_ref: &str) -> Option<usize> {
    if let Ok(idx) = step_ref.parse::<usize>() {
        if idx < task.node.steps.len() {
            return Some(idx);
        }
    }
    task.node.steps.iter().position(|s| s.id.as_str() == step_ref)
}

fn intent_decompose(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let steps = request
        .get("steps")
        .and_then(Value::as_array)
        .ok_or((ErrorCode::InvalidRequest, "decompose requires 'steps'".to_string()))?;
    if steps.len() > MAX_ARRAY_LENGTH {
        return Err((ErrorCode::TooManyOperationsAfterExpansion, "too many steps".to_string()));
    }

    let mut added = Vec::new();
    let updated = manager
        .update_task(&id, task.revision, |t| {
            for raw in steps {
                let Some(title) = raw.as_str() else { continue };
                if let Ok(step) = Step::new(truncate_str(title), vec![title.to_string()], vec![], vec![]) {
                    added.push(step.id.as_str().to_string());
                    t.node.steps.push(step);
                }
            }
            // Decomposing into steps is the first real unit of work on a
            // task, so a freshly-created TODO task becomes ACTIVE here;
            // it only reaches DONE later via `close_task`'s own gate.
            if !t.node.steps.is_empty() && Status::from_str_lossy(&t.node.status) == Status::Todo {
                t.node.status = Status::Active.code().to_string();
            }
            append_event(t, NodeEvent::comment(Actor::Ai, "", "decomposed into steps"));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("decompose", json!({ "step_ids": added }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

fn intent_task_add(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let step_ref = request
        .get("step_path")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "task_add requires 'step_path'".to_string()))?;
    let title = request
        .get("title")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "task_add requires 'title'".to_string()))?;

    let Some(idx) = find_step_index(&task, step_ref) else {
        return Err((ErrorCode::NotFound, format!("step '{step_ref}' not found")));
    };

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let step = &mut t.node.steps[idx];
            let plan = step.plan.get_or_insert_with(|| Box::new(crate::core::model::PlanNode::new(step.title.clone())));
            plan.tasks.push(crate::core::model::TaskNode::new(truncate_str(title)));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("task_add", json!({}), TargetResolution::explicit(id.to_string())).with_revision(updated.revision))
}

fn intent_define(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let step_ref = request
        .get("step_id")
        .or_else(|| request.get("path"))
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "define requires 'step_id' or 'path'".to_string()))?;
    let Some(idx) = find_step_index(&task, step_ref) else {
        return Err((ErrorCode::NotFound, format!("step '{step_ref}' not found")));
    };

    let title = request.get("title").and_then(Value::as_str).map(String::from);
    let criteria = request.get("criteria").and_then(Value::as_array).map(json_strings);
    let tests = request.get("tests").and_then(Value::as_array).map(json_strings);
    let blockers = request.get("blockers").and_then(Value::as_array).map(json_strings);

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let step = &mut t.node.steps[idx];
            if let Some(title) = title {
                step.title = truncate_str(&title);
            }
            if let Some(criteria) = criteria {
                step.success_criteria = truncate_list(criteria);
            }
            if let Some(tests) = tests {
                step.tests = truncate_list(tests);
            }
            if let Some(blockers) = blockers {
                step.blockers = truncate_list(blockers);
            }
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("define", json!({}), TargetResolution::explicit(id.to_string())).with_revision(updated.revision))
}

fn json_strings(values: &Vec<Value>) -> Vec<String> {
    values.iter().filter_map(Value::as_str).map(String::from).collect()
}

// ---------------------------------------------------------------------
// verify / progress / done / complete
// ---------------------------------------------------------------------

fn intent_verify(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let path = request
        .get("path")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "verify requires 'path'".to_string()))?;
    let Some(idx) = find_step_index(&task, path) else {
        return Err((ErrorCode::NotFound, format!("step '{path}' not found")));
    };

    let checkpoints = request.get("checkpoints").and_then(Value::as_object);
    let mut any_confirmed = false;
    let mut confirmed_names = Vec::new();

    if let Some(checkpoints) = checkpoints {
        for checkpoint in Checkpoint::ALL {
            let key = checkpoint.to_string();
            if let Some(entry) = checkpoints.get(&key) {
                if entry.get("confirmed").and_then(Value::as_bool).unwrap_or(false) {
                    any_confirmed = true;
                    confirmed_names.push(key);
                }
            }
        }
    }

    if !any_confirmed {
        return Err((ErrorCode::VerifyNoop, "no checkpoint was confirmed".to_string()));
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let step = &mut t.node.steps[idx];
            if confirmed_names.iter().any(|c| c == "criteria") {
                step.criteria_confirmed = true;
            }
            if confirmed_names.iter().any(|c| c == "tests") {
                step.tests_confirmed = true;
            }
            append_event(t, NodeEvent::checkpoint(Actor::Ai, format!("step:{path}"), &confirmed_names.join(",")));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("verify", json!({ "confirmed": confirmed_names }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

fn intent_progress(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let path = request
        .get("path")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "progress requires 'path'".to_string()))?;
    let completed = request.get("completed").and_then(Value::as_bool).unwrap_or(true);
    let force = request.get("force").and_then(Value::as_bool).unwrap_or(false);
    let override_reason = request.get("override_reason").and_then(Value::as_str);

    let Some(idx) = find_step_index(&task, path) else {
        return Err((ErrorCode::NotFound, format!("step '{path}' not found")));
    };

    if force && override_reason.map(str::trim).unwrap_or("").is_empty() {
        return Err((ErrorCode::MissingOverrideReason, "force requires a non-empty override_reason".to_string()));
    }

    if completed && !force && !task.node.steps[idx].ready_for_completion() {
        return Err((ErrorCode::NotReadyForCompletion, "step is not ready for completion".to_string()));
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let step = &mut t.node.steps[idx];
            if completed {
                step.mark_completed();
            } else {
                step.completed = false;
                step.completed_at = None;
            }
            if force {
                append_event(t, NodeEvent::override_event(Actor::Ai, format!("step:{path}"), override_reason.unwrap_or("")));
            }
            let title = t.node.steps[idx].title.clone();
            append_event(t, NodeEvent::step_done(Actor::Ai, format!("step:{path}"), &title));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("progress", json!({ "completed": completed }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

fn intent_done(manager: &Manager, request: &Value, auto_confirm: bool) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let path = request
        .get("path")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "done requires 'path'".to_string()))?;
    let force = request.get("force").and_then(Value::as_bool).unwrap_or(false);

    let Some(idx) = find_step_index(&task, path) else {
        return Err((ErrorCode::NotFound, format!("step '{path}' not found")));
    };

    if !auto_confirm && !force && !task.node.steps[idx].ready_for_completion() {
        return Err((ErrorCode::NotReadyForCompletion, "step is not ready for completion".to_string()));
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let step = &mut t.node.steps[idx];
            if auto_confirm {
                step.criteria_confirmed = true;
                step.tests_confirmed = true;
            }
            step.mark_completed();
            let title = t.node.steps[idx].title.clone();
            append_event(t, NodeEvent::step_done(Actor::Ai, format!("step:{path}"), &title));
            // A task with no root success-criteria has nothing for `done`
            // to certify against - it stays ACTIVE at 100% step progress
            // until `close_task` manufactures a criterion (or one is added
            // by hand), mirroring `intent_patch`'s reopen check below.
            if t.node.calculate_progress() == 100 && !t.node.steps.is_empty() && !t.node.success_criteria.is_empty() {
                t.node.status = Status::Done.code().to_string();
            }
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("done", json!({ "status": updated.node.status }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

// ---------------------------------------------------------------------
// delete / note / block
// ---------------------------------------------------------------------

fn intent_delete(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    if let Some(path) = request.get("path").and_then(Value::as_str) {
        let task = load(manager, &id)?;
        guard_revision(request, task.revision)?;
        let Some(idx) = find_step_index(&task, path) else {
            return Err((ErrorCode::NotFound, format!("step '{path}' not found")));
        };
        let updated = manager
            .update_task(&id, task.revision, |t| {
                t.node.steps.remove(idx);
            })
            .map_err(map_manager_error)?;
        return Ok(IntentResponse::success("delete", json!({ "removed": path }), TargetResolution::explicit(id.to_string()))
            .with_revision(updated.revision));
    }

    manager.delete_task(&id).map_err(map_manager_error)?;
    Ok(IntentResponse::success("delete", json!({ "id": id.to_string() }), TargetResolution::explicit(id.to_string())))
}

fn intent_note(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let note = request.get("note").and_then(Value::as_str).unwrap_or("").trim().to_string();
    if note.is_empty() {
        return Err((ErrorCode::MissingNote, "note must not be empty".to_string()));
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            append_event(t, NodeEvent::comment(Actor::Ai, "", &truncate_str(&note)));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("note", json!({}), TargetResolution::explicit(id.to_string())).with_revision(updated.revision))
}

fn intent_block(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let blocked = request.get("blocked").and_then(Value::as_bool).unwrap_or(true);
    let reason = request.get("reason").and_then(Value::as_str).unwrap_or("").to_string();
    let path = request.get("path").and_then(Value::as_str).map(String::from);

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let target = path.clone().unwrap_or_default();
            match (&path, blocked) {
                (Some(p), _) => {
                    if let Some(idx) = find_step_index(t, p) {
                        t.node.steps[idx].blocked = blocked;
                        t.node.steps[idx].block_reason = reason.clone();
                    }
                }
                (None, _) => {
                    t.node.blocked = blocked;
                    if !blocked {
                        t.node.blockers.clear();
                    } else if !reason.is_empty() {
                        t.node.blockers.push(reason.clone());
                    }
                }
            }
            let event = if blocked {
                NodeEvent::blocked(Actor::Ai, target, &reason)
            } else {
                NodeEvent::unblocked(Actor::Ai, target)
            };
            append_event(t, event);
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("block", json!({ "blocked": blocked }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

// ---------------------------------------------------------------------
// patch / edit / batch
// ---------------------------------------------------------------------

/// Build the store-wide dependency graph from every task currently on
/// disk, skipping `exclude` (the task about to have its own edges
/// replaced, so its stale edges never shadow the edges being checked).
fn build_dependency_graph_excluding(manager: &Manager, exclude: &TaskId) -> Result<DependencyGraph, (ErrorCode, String)> {
    let mut graph = DependencyGraph::new();
    let paths = manager
        .repository()
        .list_domain("", true)
        .map_err(|e| (ErrorCode::Internal, e.to_string()))?;
    for path in paths {
        let Ok(content) = std::fs::read_to_string(&path) else { continue };
        let Ok(parsed) = crate::core::codec::parse_task(&content) else { continue };
        if &parsed.task.id == exclude {
            continue;
        }
        for dep in &parsed.task.depends_on {
            graph.add_edge(parsed.task.id.clone(), dep.clone());
        }
    }
    Ok(graph)
}

/// Reject a `depends_on` edit that would introduce a cycle, checking one
/// new dependency at a time so a single op that adds several edges at
/// once (e.g. `set` with three ids) still catches a cycle introduced
/// between two of those new edges, not just against pre-existing ones.
/// On failure, returns one concrete cycle as a list of ids, per the
/// depth-first-from-each-new-target algorithm.
fn guard_dependency_cycle(manager: &Manager, self_id: &TaskId, new_deps: &[TaskId]) -> Result<(), (ErrorCode, String, Vec<TaskId>)> {
    let mut graph = build_dependency_graph_excluding(manager, self_id).map_err(|(c, m)| (c, m, Vec::new()))?;
    for dep in new_deps {
        graph.add_edge(self_id.clone(), dep.clone());
        if let Some(cycle) = graph.find_cycle() {
            return Err((
                ErrorCode::CircularDependency,
                format!("depending on '{dep}' would create a cycle"),
                cycle,
            ));
        }
    }
    Ok(())
}

/// Compute the `depends_on` ids that would result from applying `ops` to
/// `current`, in order, without mutating anything. Used to pre-validate
/// a patch's dependency edits before any op is actually applied.
fn project_depends_on(current: &[TaskId], ops: &[Value]) -> Vec<TaskId> {
    let mut ids = current.to_vec();
    for op in ops {
        if op.get("field").and_then(Value::as_str) != Some("depends_on") {
            continue;
        }
        let kind = op.get("op").and_then(Value::as_str).unwrap_or("");
        let value_ids: Vec<TaskId> = op
            .get("value")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).filter_map(|s| TaskId::new(s).ok()).collect())
            .unwrap_or_default();
        match kind {
            "set" => ids = value_ids,
            "append" => ids.extend(value_ids),
            "remove" => ids.retain(|d| !value_ids.contains(d)),
            _ => {}
        }
    }
    ids
}

/// Pre-validate every `depends_on` op in `ops` against the rest of the
/// store before any of `ops` is applied, so a cycle is rejected with a
/// structured `result.cycle` rather than surfacing mid-mutation.
fn guard_patch_dependency_cycle(manager: &Manager, self_id: &TaskId, current: &[TaskId], ops: &[Value]) -> Result<(), (ErrorCode, String, Vec<TaskId>)> {
    let projected = project_depends_on(current, ops);
    let added: Vec<TaskId> = projected.into_iter().filter(|id| !current.contains(id)).collect();
    guard_dependency_cycle(manager, self_id, &added)
}

/// Apply one `{op, field, value}` structural edit, returning the field
/// name touched so the caller can build a diff. Callers must run
/// [`guard_patch_dependency_cycle`] over the whole op list before calling
/// this for any `depends_on` op, since this function only mutates.
fn apply_patch_op(task: &mut Task, op: &Value) -> Result<String, (ErrorCode, String)> {
    let kind = op.get("op").and_then(Value::as_str).unwrap_or("");
    let field = op
        .get("field")
        .and_then(Value::as_str)
        .ok_or((ErrorCode::InvalidRequest, "patch op requires 'field'".to_string()))?;
    let value = op.get("value");

    macro_rules! list_field {
        ($target:expr) => {{
            match kind {
                "append" => {
                    if let Some(v) = value.and_then(Value::as_str) {
                        $target.push(truncate_str(v));
                    }
                }
                "remove" => {
                    if let Some(v) = value.and_then(Value::as_str) {
                        $target.retain(|existing| existing != v);
                    }
                }
                "set" => {
                    $target.clear();
                    if let Some(arr) = value.and_then(Value::as_array) {
                        $target.extend(truncate_list(json_strings(arr)));
                    }
                }
                other => return Err((ErrorCode::InvalidRequest, format!("unknown patch op '{other}'"))),
            }
        }};
    }

    match field {
        "success_criteria" => list_field!(task.node.success_criteria),
        "tests" => list_field!(task.node.tests),
        "next_steps" => list_field!(task.node.next_steps),
        "problems" => list_field!(task.node.problems),
        "risks" => list_field!(task.node.risks),
        "depends_on" => {
            let ids: Vec<TaskId> = value
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).filter_map(|s| TaskId::new(s).ok()).collect())
                .unwrap_or_default();
            match kind {
                "set" => task.depends_on = ids,
                "append" => task.depends_on.extend(ids),
                "remove" => task.depends_on.retain(|d| !ids.contains(d)),
                other => return Err((ErrorCode::InvalidRequest, format!("unknown patch op '{other}'"))),
            }
        }
        "description" => {
            if let Some(v) = value.and_then(Value::as_str) {
                task.node.description = truncate_str(v);
            }
        }
        "context" => {
            if let Some(v) = value.and_then(Value::as_str) {
                task.node.context = truncate_str(v);
            }
        }
        "priority" => {
            if let Some(v) = value.and_then(Value::as_str) {
                task.node.priority = v.parse().unwrap_or_default();
            }
        }
        other => return Err((ErrorCode::InvalidRequest, format!("unknown patch field '{other}'"))),
    }
    Ok(field.to_string())
}

fn intent_patch(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    guard_revision(request, task.revision)?;

    let ops = request
        .get("ops")
        .and_then(Value::as_array)
        .ok_or((ErrorCode::InvalidRequest, "patch requires 'ops'".to_string()))?;
    let dry_run = request.get("dry_run").and_then(Value::as_bool).unwrap_or(false);

    let was_done = Status::from_str_lossy(&task.node.status) == Status::Done;

    // A `depends_on` op is checked for cycles against the rest of the
    // store before anything else runs, whether this is a dry run or a
    // real write - the store must stay unchanged on rejection either way.
    if let Err((code, message, cycle)) = guard_patch_dependency_cycle(manager, &id, &task.depends_on, ops) {
        return Ok(IntentResponse::failure("patch", code, message)
            .with_result(json!({ "cycle": cycle.iter().map(TaskId::to_string).collect::<Vec<_>>() })));
    }

    if dry_run {
        let mut preview = task.clone();
        let mut fields = Vec::new();
        for op in ops {
            fields.push(apply_patch_op(&mut preview, op)?);
        }
        let now_done = Status::from_str_lossy(&preview.node.status) == Status::Done;
        return Ok(IntentResponse::success(
            "patch",
            json!({
                "diff": {
                    "fields": fields,
                    "state": { "lifecycle_status": { "from": task.node.status, "to": if was_done && !now_done { Status::Active.code() } else { &preview.node.status } } }
                }
            }),
            TargetResolution::explicit(id.to_string()),
        ));
    }

    // Validate every op against a clone first: `update_task`'s mutate
    // closure is infallible, so any rejection has to surface before the
    // lock is taken, not during it.
    let mut preflight = task.clone();
    let mut touched_fields = Vec::new();
    for op in ops {
        touched_fields.push(apply_patch_op(&mut preflight, op)?);
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            for op in ops {
                let _ = apply_patch_op(t, op);
            }
            if was_done && t.node.success_criteria.is_empty() {
                t.node.status = Status::Active.code().to_string();
            }
        })
        .map_err(map_manager_error)?;

    let reopened = was_done && Status::from_str_lossy(&updated.node.status) != Status::Done;
    let mut suggestions = Vec::new();
    if reopened {
        suggestions.push(Suggestion::new("close_task", "re-close when ready", json!({ "task": id.to_string() })));
    }

    Ok(IntentResponse::success("patch", json!({ "diff": { "fields": touched_fields } }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision)
        .with_suggestions(suggestions))
}

fn intent_edit(manager: &Manager, request: &Value) -> IntentResult {
    let depends_on = request.get("depends_on").cloned().unwrap_or(Value::Array(vec![]));
    let patch_request = json!({
        "intent": "patch",
        "task": request.get("task"),
        "expected_revision": request.get("expected_revision"),
        "ops": [{ "op": "set", "field": "depends_on", "value": depends_on }],
    });
    intent_patch(manager, &patch_request)
}

fn intent_batch(manager: &Manager, request: &Value) -> IntentResult {
    let operations = request
        .get("operations")
        .and_then(Value::as_array)
        .ok_or((ErrorCode::InvalidRequest, "batch requires 'operations'".to_string()))?;
    let atomic = request.get("atomic").and_then(Value::as_bool).unwrap_or(true);

    let expanded = expand_batch(operations)?;
    if expanded.len() > MAX_ARRAY_LENGTH {
        return Err((ErrorCode::TooManyOperationsAfterExpansion, "too many operations after expansion".to_string()));
    }

    // Record the undo-stack depth before this batch runs any op, so an
    // atomic batch that fails partway through can unwind every mutation
    // already applied (one `undo()` per history entry pushed since),
    // rather than merely aborting the ops still left to run.
    let starting_depth = if atomic { manager.history_len().map_err(|e| (ErrorCode::Internal, e.to_string()))? } else { 0 };

    let mut results = Vec::new();
    let mut touched_ids: Vec<TaskId> = Vec::new();
    for op in &expanded {
        let intent = op.get("intent").and_then(Value::as_str).unwrap_or("");
        match dispatch(manager, intent, op) {
            Ok(response) => {
                if let Some(task) = op.get("task").and_then(Value::as_str) {
                    if let Ok(task_id) = parse_task_id(task) {
                        touched_ids.push(task_id);
                    }
                }
                results.push(serde_json::to_value(response).unwrap_or(Value::Null));
            }
            Err((code, message)) => {
                if atomic {
                    let applied = manager.history_len().map_err(|e| (ErrorCode::Internal, e.to_string()))?.saturating_sub(starting_depth);
                    for _ in 0..applied {
                        let _ = manager.undo();
                    }
                    return Err((code, format!("batch aborted and rolled back: {message}")));
                }
                results.push(json!({ "success": false, "error_code": code.to_string(), "error_message": message }));
            }
        }
    }

    Ok(IntentResponse::success("batch", json!({ "results": results }), TargetResolution::none()))
}

fn expand_batch(operations: &[Value]) -> Result<Vec<Value>, (ErrorCode, String)> {
    let mut expanded = Vec::new();
    for op in operations {
        if let Some(paths) = op.get("paths").and_then(Value::as_array) {
            for path in paths {
                let mut clone = op.clone();
                if let Some(obj) = clone.as_object_mut() {
                    obj.remove("paths");
                    obj.insert("path".to_string(), path.clone());
                }
                expanded.push(clone);
            }
        } else {
            expanded.push(op.clone());
        }
        if expanded.len() > MAX_ARRAY_LENGTH {
            return Err((ErrorCode::TooManyOperationsAfterExpansion, "too many operations after expansion".to_string()));
        }
    }
    Ok(expanded)
}

// ---------------------------------------------------------------------
// undo / redo
// ---------------------------------------------------------------------

fn intent_undo(manager: &Manager, which: &str) -> IntentResult {
    let result = if which == "undo" { manager.undo() } else { manager.redo() };
    result.map_err(map_manager_error)?;
    Ok(IntentResponse::success(which, json!({}), TargetResolution::none()))
}

// ---------------------------------------------------------------------
// radar / handoff / close_task
// ---------------------------------------------------------------------

struct Runway {
    open: bool,
    recipe: Option<Value>,
}

fn compute_runway(task: &Task) -> Runway {
    if task.node.success_criteria.is_empty() {
        return Runway {
            open: false,
            recipe: Some(json!({
                "intent": "patch",
                "task": task.id.to_string(),
                "kind": "task_detail",
                "ops": [{ "op": "append", "field": "success_criteria", "value": "ok" }],
            })),
        };
    }
    if !task.node.steps.iter().all(|s| s.completed) {
        return Runway { open: false, recipe: None };
    }
    Runway { open: true, recipe: None }
}

fn intent_close_task(manager: &Manager, request: &Value) -> IntentResult {
    let (id, _) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    let runway = compute_runway(&task);
    let apply = request.get("apply").and_then(Value::as_bool).unwrap_or(false);

    if !apply {
        return Ok(IntentResponse::success(
            "close_task",
            json!({ "runway": { "open": runway.open, "recipe": runway.recipe } }),
            TargetResolution::explicit(id.to_string()),
        ));
    }

    if !runway.open {
        return Err((ErrorCode::RunwayClosed, "task is not ready to close".to_string()));
    }

    let updated = manager
        .update_task(&id, task.revision, |t| {
            let from = t.node.status.clone();
            t.node.status = Status::Done.code().to_string();
            t.node.status_manual = true;
            append_event(t, NodeEvent::status_changed(Actor::Ai, "", &from, Status::Done.code()));
        })
        .map_err(map_manager_error)?;

    Ok(IntentResponse::success("close_task", json!({ "runway": { "open": true } }), TargetResolution::explicit(id.to_string()))
        .with_revision(updated.revision))
}

fn intent_radar(manager: &Manager, request: &Value) -> IntentResult {
    let (id, resolution) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    let (now, why, next_idx) = pick_now(&task);
    let blockers = collect_blockers(&task);

    Ok(IntentResponse::success(
        "radar",
        json!({
            "focus": task.id.to_string(),
            "now": now,
            "why": why,
            "next": next_idx.map(|i| task.node.steps[i].title.clone()),
            "blockers": blockers,
            "budget": { "max_chars": 4000, "used_chars": task.node.description.len(), "truncated": false },
        }),
        resolution,
    ))
}

fn intent_handoff(manager: &Manager, request: &Value) -> IntentResult {
    let (id, resolution) = resolve_target(manager, request)?;
    let task = load(manager, &id)?;
    let (now, why, _) = pick_now(&task);
    let done: Vec<&str> = task.node.steps.iter().filter(|s| s.completed).map(|s| s.title.as_str()).collect();
    let remaining: Vec<&str> = task.node.steps.iter().filter(|s| !s.completed).map(|s| s.title.as_str()).collect();

    Ok(IntentResponse::success(
        "handoff",
        json!({
            "now": now,
            "why": why,
            "done": done,
            "remaining": remaining,
            "risks": task.node.risks,
            "blockers": collect_blockers(&task),
            "budget": { "max_chars": 8000, "used_chars": task.node.description.len(), "truncated": false },
        }),
        resolution,
    ))
}

fn pick_now(task: &Task) -> (&'static str, &'static str, Option<usize>) {
    if task.node.blocked {
        return ("blocked", "the task itself is blocked", None);
    }
    for (i, step) in task.node.steps.iter().enumerate() {
        if step.blocked {
            return ("blocked", "a step is blocked", Some(i));
        }
    }
    for (i, step) in task.node.steps.iter().enumerate() {
        if step.ready_for_completion() {
            return ("ready", "a step has its checkpoints confirmed", Some(i));
        }
    }
    for (i, step) in task.node.steps.iter().enumerate() {
        if !step.completed {
            return ("active", "the next incomplete step", Some(i));
        }
    }
    ("done", "every step is complete", None)
}

fn collect_blockers(task: &Task) -> Vec<String> {
    let mut blockers: Vec<String> = task.depends_on.iter().map(|d| d.to_string()).collect();
    blockers.extend(task.node.blockers.clone());
    for step in &task.node.steps {
        if step.blocked {
            blockers.push(step.block_reason.clone());
        }
    }
    blockers
}

fn append_event(task: &mut Task, event: NodeEvent) {
    tracing::trace!(event_type = %event.event_type, "appending event");
    task.record(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, Manager) {
        let temp = TempDir::new().unwrap();
        let manager = Manager::open(temp.path()).unwrap();
        (temp, manager)
    }

    #[test]
    fn create_then_context_round_trips() {
        let (_temp, manager) = manager();
        let response = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "Ship it"}));
        assert_eq!(response["success"], true);
        let id = response["result"]["id"].as_str().unwrap().to_string();

        let context = process_intent(&manager, json!({"intent": "context", "task": id}));
        assert_eq!(context["success"], true);
    }

    #[test]
    fn unknown_intent_returns_stable_code() {
        let (_temp, manager) = manager();
        let response = process_intent(&manager, json!({"intent": "bogus"}));
        assert_eq!(response["success"], false);
        assert_eq!(response["error_code"], "UNKNOWN_INTENT");
    }

    #[test]
    fn note_requires_non_empty_text() {
        let (_temp, manager) = manager();
        let create = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "t"}));
        let id = create["result"]["id"].as_str().unwrap().to_string();
        let response = process_intent(&manager, json!({"intent": "note", "task": id, "note": ""}));
        assert_eq!(response["error_code"], "MISSING_NOTE");
    }

    #[test]
    fn decompose_then_progress_and_done() {
        let (_temp, manager) = manager();
        let create = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "t"}));
        let id = create["result"]["id"].as_str().unwrap().to_string();

        let decomposed = process_intent(&manager, json!({"intent": "decompose", "task": id, "steps": ["write code"]}));
        assert_eq!(decomposed["success"], true);

        let verify = process_intent(&manager, json!({
            "intent": "verify", "task": id, "path": "0",
            "checkpoints": { "criteria": { "confirmed": true }, "tests": { "confirmed": true } }
        }));
        assert_eq!(verify["success"], true);

        let done = process_intent(&manager, json!({"intent": "done", "task": id, "path": "0"}));
        assert_eq!(done["success"], true);
    }

    #[test]
    fn revision_mismatch_is_rejected() {
        let (_temp, manager) = manager();
        let create = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "t"}));
        let id = create["result"]["id"].as_str().unwrap().to_string();
        let response = process_intent(&manager, json!({"intent": "note", "task": id, "note": "x", "expected_revision": 99}));
        assert_eq!(response["error_code"], "REVISION_MISMATCH");
    }

    #[test]
    fn edit_rejects_depends_on_cycle() {
        let (_temp, manager) = manager();
        let a = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "a"}))["result"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        let b = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "b"}))["result"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let first = process_intent(&manager, json!({"intent": "edit", "task": a, "depends_on": [b.clone()]}));
        assert_eq!(first["success"], true);

        let second = process_intent(&manager, json!({"intent": "edit", "task": b, "depends_on": [a]}));
        assert_eq!(second["success"], false);
        assert_eq!(second["error_code"], "CIRCULAR_DEPENDENCY");
        assert!(second["result"]["cycle"].as_array().unwrap().len() >= 2);
    }

    #[test]
    fn close_task_without_criteria_reports_closed_runway() {
        let (_temp, manager) = manager();
        let create = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "t"}));
        let id = create["result"]["id"].as_str().unwrap().to_string();
        let response = process_intent(&manager, json!({"intent": "close_task", "task": id, "apply": false}));
        assert_eq!(response["result"]["runway"]["open"], false);
    }
}
