//! core::graph
//!
//! The task dependency graph: a directed, possibly multi-edge graph over
//! [`TaskId`]s built from each task's `depends_on` list. Unlike a branch
//! stack, a task may depend on more than one other task, so cycle
//! detection must walk every outgoing edge, not just a single parent
//! pointer.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::types::TaskId;

/// Adjacency list of `task -> tasks it depends on`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self { edges: HashMap::new() }
    }

    /// Record that `task` depends on `dependency`. Both ends are added as
    /// nodes even if one has no outgoing edges of its own.
    pub fn add_edge(&mut self, task: TaskId, dependency: TaskId) {
        self.edges.entry(dependency.clone()).or_default();
        self.edges.entry(task).or_default().push(dependency);
    }

    pub fn dependencies_of(&self, task: &TaskId) -> &[TaskId] {
        self.edges.get(task).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tasks(&self) -> Vec<TaskId> {
        let mut tasks: Vec<TaskId> = self.edges.keys().cloned().collect();
        tasks.sort();
        tasks
    }

    /// Find a cycle reachable from `task` if one exists, depth-first, with
    /// outgoing edges visited in lexicographic id order so the reported
    /// cycle path is deterministic regardless of insertion order.
    fn find_cycle_from(&self, task: &TaskId, visited: &mut HashSet<TaskId>, path: &mut Vec<TaskId>) -> Option<Vec<TaskId>> {
        if let Some(pos) = path.iter().position(|t| t == task) {
            let mut cycle: Vec<TaskId> = path[pos..].to_vec();
            cycle.push(task.clone());
            return Some(cycle);
        }
        if visited.contains(task) {
            return None;
        }
        path.push(task.clone());

        let mut deps = self.dependencies_of(task).to_vec();
        deps.sort();
        for dep in &deps {
            if let Some(cycle) = self.find_cycle_from(dep, visited, path) {
                return Some(cycle);
            }
        }

        path.pop();
        visited.insert(task.clone());
        None
    }

    /// Search the whole graph for a cycle, visiting root tasks in
    /// lexicographic id order so the result is reproducible across runs.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        for task in self.tasks() {
            if let Some(cycle) = self.find_cycle_from(&task, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    /// Would adding `task -> dependency` introduce a cycle? Checked before
    /// the edge is committed so a caller can reject it instead of
    /// discovering the cycle after the fact.
    pub fn would_cycle(&self, task: &TaskId, dependency: &TaskId) -> bool {
        if task == dependency {
            return true;
        }
        let mut probe = self.clone();
        probe.add_edge(task.clone(), dependency.clone());
        probe.find_cycle().is_some()
    }

    /// All tasks reachable by following `depends_on` edges transitively
    /// from `task` (i.e. everything that must be done before `task` can
    /// be considered unblocked).
    pub fn transitive_dependencies(&self, task: &TaskId) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<TaskId> = self.dependencies_of(task).to_vec().into();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                for dep in self.dependencies_of(&next) {
                    queue.push_back(dep.clone());
                }
            }
        }
        seen
    }

    /// Tasks that list `task` as a dependency, direct edges only.
    pub fn dependents_of(&self, task: &TaskId) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = self
            .edges
            .iter()
            .filter(|(_, deps)| deps.contains(task))
            .map(|(t, _)| t.clone())
            .collect();
        out.sort();
        out
    }
}
