//! core::verify
//!
//! Fast, read-only verification of a task's dependency graph.
//!
//! # Invariants
//!
//! - Never mutates the store
//! - Deterministic: the same graph always produces the same result

use thiserror::Error;

use super::graph::DependencyGraph;
use super::types::TaskId;

/// Errors from verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("circular dependency: {}", join_cycle(.0))]
    CircularDependency(Vec<TaskId>),

    #[error("task '{0}' lists a dependency on itself")]
    SelfDependency(TaskId),

    #[error("task '{0}' depends on unknown task '{1}'")]
    DanglingDependency(TaskId, TaskId),
}

fn join_cycle(cycle: &[TaskId]) -> String {
    cycle.iter().map(TaskId::to_string).collect::<Vec<_>>().join(" -> ")
}

/// Result of fast verification.
#[derive(Debug)]
pub struct VerifyResult {
    pub ok: bool,
    pub errors: Vec<VerifyError>,
}

impl VerifyResult {
    pub fn success() -> Self {
        Self { ok: true, errors: vec![] }
    }

    pub fn failure(errors: Vec<VerifyError>) -> Self {
        Self { ok: false, errors }
    }
}

/// Check the dependency graph for cycles and dangling edges against the
/// set of task ids known to actually exist in the store.
pub fn fast_verify(graph: &DependencyGraph, known_tasks: &[TaskId]) -> VerifyResult {
    let mut errors = Vec::new();

    if let Some(cycle) = graph.find_cycle() {
        errors.push(VerifyError::CircularDependency(cycle));
    }

    for task in graph.tasks() {
        for dep in graph.dependencies_of(&task) {
            if dep == &task {
                errors.push(VerifyError::SelfDependency(task.clone()));
            } else if !known_tasks.contains(dep) {
                errors.push(VerifyError::DanglingDependency(task.clone(), dep.clone()));
            }
        }
    }

    if errors.is_empty() {
        VerifyResult::success()
    } else {
        VerifyResult::failure(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(s: &str) -> TaskId {
        TaskId::new(s).unwrap()
    }

    #[test]
    fn empty_graph_verifies_clean() {
        let graph = DependencyGraph::new();
        assert!(fast_verify(&graph, &[]).ok);
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(tid("TASK-001"), tid("TASK-002"));
        graph.add_edge(tid("TASK-002"), tid("TASK-001"));
        let known = vec![tid("TASK-001"), tid("TASK-002")];
        let result = fast_verify(&graph, &known);
        assert!(!result.ok);
        assert!(matches!(result.errors[0], VerifyError::CircularDependency(_)));
    }

    #[test]
    fn dangling_dependency_is_reported() {
        let mut graph = DependencyGraph::new();
        graph.add_edge(tid("TASK-001"), tid("TASK-999"));
        let known = vec![tid("TASK-001")];
        let result = fast_verify(&graph, &known);
        assert!(!result.ok);
        assert!(matches!(result.errors[0], VerifyError::DanglingDependency(_, _)));
    }
}
