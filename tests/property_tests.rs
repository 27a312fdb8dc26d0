//! Property-based tests for the dependency graph and the on-disk codec.
//!
//! Uses proptest to verify invariants hold across randomly generated
//! graphs and task documents, the way the teacher's `tests/property_tests.rs`
//! exercises `StackGraph` and `BranchMetadataV1` with custom `Strategy`
//! generators instead of hand-picked fixtures.

use proptest::prelude::*;
use tasktree::core::codec::{parse_task, render_task};
use tasktree::core::graph::DependencyGraph;
use tasktree::core::model::Task;
use tasktree::core::types::{Domain, TaskId};

/// A handful of small task ids, reused to keep generated graphs dense
/// enough to produce cycles fairly often.
fn task_id() -> impl Strategy<Value = TaskId> {
    (1u64..=6).prop_map(TaskId::from_sequence)
}

/// A graph built from a small random edge list over `task_id()`.
fn dependency_graph() -> impl Strategy<Value = (DependencyGraph, Vec<(TaskId, TaskId)>)> {
    prop::collection::vec((task_id(), task_id()), 0..12).prop_map(|edges| {
        let mut graph = DependencyGraph::new();
        for (from, to) in &edges {
            if from != to {
                graph.add_edge(from.clone(), to.clone());
            }
        }
        (graph, edges)
    })
}

/// Is `cycle` a valid closed walk in `graph` (consecutive ids connected by
/// a real edge, starting and ending on the same id)?
fn is_valid_cycle(graph: &DependencyGraph, cycle: &[TaskId]) -> bool {
    if cycle.len() < 2 || cycle.first() != cycle.last() {
        return false;
    }
    cycle.windows(2).all(|pair| graph.dependencies_of(&pair[0]).contains(&pair[1]))
}

/// Brute-force cycle check over the explicit edge list, independent of
/// `DependencyGraph`'s own traversal, to cross-check `find_cycle`'s verdict.
fn has_cycle_bruteforce(edges: &[(TaskId, TaskId)]) -> bool {
    use std::collections::{HashMap, HashSet};
    let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for (from, to) in edges {
        if from != to {
            adjacency.entry(from.clone()).or_default().push(to.clone());
        }
    }
    fn visit(node: &TaskId, adjacency: &std::collections::HashMap<TaskId, Vec<TaskId>>, visiting: &mut HashSet<TaskId>, done: &mut HashSet<TaskId>) -> bool {
        if done.contains(node) {
            return false;
        }
        if !visiting.insert(node.clone()) {
            return true;
        }
        if let Some(neighbors) = adjacency.get(node) {
            for next in neighbors {
                if visit(next, adjacency, visiting, done) {
                    return true;
                }
            }
        }
        visiting.remove(node);
        done.insert(node.clone());
        false
    }
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    adjacency.keys().cloned().any(|n| visit(&n, &adjacency, &mut visiting, &mut done))
}

proptest! {
    /// `find_cycle` agrees with an independent brute-force DFS over the
    /// same edge list, for arbitrary small random graphs.
    #[test]
    fn find_cycle_matches_bruteforce((graph, edges) in dependency_graph()) {
        let reported = graph.find_cycle();
        prop_assert_eq!(reported.is_some(), has_cycle_bruteforce(&edges));
    }

    /// Whenever `find_cycle` reports a cycle, the returned path is a real
    /// closed walk through edges that exist in the graph.
    #[test]
    fn reported_cycle_is_a_valid_path((graph, _edges) in dependency_graph()) {
        if let Some(cycle) = graph.find_cycle() {
            prop_assert!(is_valid_cycle(&graph, &cycle));
        }
    }

    /// `would_cycle` predicts exactly what a follow-up `add_edge` +
    /// `find_cycle` would discover, for any candidate edge.
    #[test]
    fn would_cycle_matches_add_then_find((graph, _edges) in dependency_graph(), from in task_id(), to in task_id()) {
        let predicted = graph.would_cycle(&from, &to);
        let mut probe = graph.clone();
        probe.add_edge(from, to);
        prop_assert_eq!(predicted, probe.find_cycle().is_some());
    }
}

/// Printable ASCII, single-line text safe for every codec field: no
/// newlines (would break the `- [ ] title` / tagged-line grammar), no
/// leading `#`/`-` (would be mistaken for a heading or list marker), no
/// `:` (would be mistaken for a tagged-field separator).
fn codec_safe_text() -> impl Strategy<Value = String> {
    // No leading/trailing whitespace: every text-bearing section is
    // `.trim()`-ed on parse, so a round-trip on space-padded text would
    // spuriously fail even though the codec itself lost nothing real.
    "[a-zA-Z0-9][a-zA-Z0-9 ]{0,38}[a-zA-Z0-9]".prop_filter("must not be blank", |s| !s.trim().is_empty())
}

fn codec_safe_list() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(codec_safe_text(), 0..4)
}

fn arbitrary_task() -> impl Strategy<Value = Task> {
    (1u64..=999, codec_safe_text(), codec_safe_text(), codec_safe_list(), codec_safe_list()).prop_map(
        |(seq, title, description, criteria, risks)| {
            let mut task = Task::new(TaskId::from_sequence(seq), Domain::new("backend").unwrap(), title);
            task.node.description = description;
            task.node.success_criteria = criteria;
            task.node.risks = risks;
            task
        },
    )
}

proptest! {
    /// `parse(render(task))` reproduces every field the codec round-trips
    /// through the Markdown body and YAML preamble.
    #[test]
    fn render_then_parse_roundtrips(task in arbitrary_task()) {
        let rendered = render_task(&task);
        let parsed = parse_task(&rendered).expect("codec-safe task must parse back");
        prop_assert_eq!(parsed.task.id, task.id);
        prop_assert_eq!(parsed.task.domain, task.domain);
        prop_assert_eq!(parsed.task.revision, task.revision);
        prop_assert_eq!(parsed.task.node.title, task.node.title);
        prop_assert_eq!(parsed.task.node.description, task.node.description);
        prop_assert_eq!(parsed.task.node.success_criteria, task.node.success_criteria);
        prop_assert_eq!(parsed.task.node.risks, task.node.risks);
    }
}
