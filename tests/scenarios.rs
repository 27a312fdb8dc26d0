//! End-to-end intent-processor scenarios, driven through
//! `tasktree::intent::process_intent` the way a real caller would:
//! one JSON request in, one JSON envelope out, against a real on-disk
//! store. Mirrors spec section 8's testable properties, adapted to the
//! subset actually implemented (flat-string decompose steps, numeric or
//! `StepId` step paths rather than `"s:0"` syntax, task-only creation).

use tasktree::intent::process_intent;
use tasktree::manager::Manager;
use tempfile::TempDir;

fn store() -> (TempDir, Manager) {
    let temp = TempDir::new().unwrap();
    let manager = Manager::open(temp.path()).unwrap();
    (temp, manager)
}

fn create(manager: &Manager, title: &str) -> String {
    let response = process_intent(manager, serde_json::json!({"intent": "create", "kind": "task", "title": title}));
    assert_eq!(response["success"], true, "create failed: {response}");
    response["result"]["id"].as_str().unwrap().to_string()
}

/// Scenario 1: create -> decompose -> verify -> done. The step completes
/// and task progress reaches 100%, but status stays ACTIVE because the
/// task's own root success-criteria list was never populated.
#[test]
fn create_decompose_done_stays_active_without_root_criteria() {
    let (_temp, manager) = store();
    let id = create(&manager, "Ship the release");

    let decomposed = process_intent(&manager, serde_json::json!({"intent": "decompose", "task": id, "steps": ["write the changelog"]}));
    assert_eq!(decomposed["success"], true);

    let verified = process_intent(
        &manager,
        serde_json::json!({
            "intent": "verify", "task": id, "path": "0",
            "checkpoints": { "criteria": { "confirmed": true }, "tests": { "confirmed": true } }
        }),
    );
    assert_eq!(verified["success"], true);

    let done = process_intent(&manager, serde_json::json!({"intent": "done", "task": id, "path": "0"}));
    assert_eq!(done["success"], true);
    assert_eq!(done["result"]["status"], "ACTIVE");

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["progress"], 100);
}

/// A `verify` call with no checkpoint confirmed is a no-op: the store is
/// untouched and `VERIFY_NOOP` is reported.
#[test]
fn verify_without_any_confirmed_checkpoint_is_a_noop() {
    let (_temp, manager) = store();
    let id = create(&manager, "Ship the release");
    process_intent(&manager, serde_json::json!({"intent": "decompose", "task": id, "steps": ["write the changelog"]}));

    let response = process_intent(
        &manager,
        serde_json::json!({"intent": "verify", "task": id, "path": "0", "checkpoints": { "criteria": { "confirmed": false } }}),
    );
    assert_eq!(response["success"], false);
    assert_eq!(response["error_code"], "VERIFY_NOOP");

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["revision"], 2, "decompose bumped the revision once; the no-op verify must not bump it again");
}

/// Scenario 2: a task with no root success-criteria reports
/// `RUNWAY_CLOSED` with a recipe on `close_task(apply=true)`; applying
/// that recipe verbatim through `patch`, then re-closing, succeeds.
#[test]
fn runway_closed_recipe_round_trips_into_a_close() {
    let (_temp, manager) = store();
    let id = create(&manager, "Cut the release branch");

    let closed = process_intent(&manager, serde_json::json!({"intent": "close_task", "task": id, "apply": true}));
    assert_eq!(closed["success"], false);
    assert_eq!(closed["error_code"], "RUNWAY_CLOSED");

    let preview = process_intent(&manager, serde_json::json!({"intent": "close_task", "task": id}));
    assert_eq!(preview["success"], true);
    assert_eq!(preview["result"]["runway"]["open"], false);
    let recipe = preview["result"]["runway"]["recipe"].clone();
    assert_eq!(recipe["intent"], "patch");
    assert!(recipe["ops"][0]["value"].is_string(), "recipe's op value must be a plain string, got {recipe}");

    let patch_response = process_intent(
        &manager,
        serde_json::json!({"intent": "patch", "task": id, "ops": recipe["ops"].clone()}),
    );
    assert_eq!(patch_response["success"], true);

    let reclosed = process_intent(&manager, serde_json::json!({"intent": "close_task", "task": id, "apply": true}));
    assert_eq!(reclosed["success"], true);
    assert_eq!(reclosed["result"]["runway"]["open"], true);

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["status"], "DONE");
}

/// Removing the last root success-criterion from a DONE task reopens it,
/// both in a `dry_run` preview and on the real apply.
#[test]
fn removing_last_root_criterion_from_done_task_reopens_it() {
    let (_temp, manager) = store();
    let id = create(&manager, "Cut the release branch");
    process_intent(&manager, serde_json::json!({"intent": "patch", "task": id, "ops": [{"op": "append", "field": "success_criteria", "value": "ok"}]}));
    let closed = process_intent(&manager, serde_json::json!({"intent": "close_task", "task": id, "apply": true}));
    assert_eq!(closed["success"], true);

    let dry_run = process_intent(
        &manager,
        serde_json::json!({"intent": "patch", "task": id, "dry_run": true, "ops": [{"op": "remove", "field": "success_criteria", "value": "ok"}]}),
    );
    assert_eq!(dry_run["success"], true);
    assert_eq!(dry_run["result"]["diff"]["state"]["lifecycle_status"]["from"], "DONE");
    assert_eq!(dry_run["result"]["diff"]["state"]["lifecycle_status"]["to"], "ACTIVE");

    let context_before = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context_before["result"]["status"], "DONE", "a dry_run patch must not mutate the store");

    let applied = process_intent(
        &manager,
        serde_json::json!({"intent": "patch", "task": id, "ops": [{"op": "remove", "field": "success_criteria", "value": "ok"}]}),
    );
    assert_eq!(applied["success"], true);

    let context_after = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context_after["result"]["status"], "ACTIVE");
}

/// Scenario 3: optimistic concurrency. A stale `expected_revision`
/// is rejected with `REVISION_MISMATCH` and the store is left unchanged;
/// the current revision number succeeds.
#[test]
fn stale_expected_revision_is_rejected_current_revision_succeeds() {
    let (_temp, manager) = store();
    let id = create(&manager, "Cut the release branch");

    let stale = process_intent(&manager, serde_json::json!({"intent": "note", "task": id, "note": "late", "expected_revision": 99}));
    assert_eq!(stale["success"], false);
    assert_eq!(stale["error_code"], "REVISION_MISMATCH");

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["revision"], 1, "a rejected mismatch must not touch the stored revision");

    let fresh = process_intent(&manager, serde_json::json!({"intent": "note", "task": id, "note": "on time", "expected_revision": 1}));
    assert_eq!(fresh["success"], true);
    assert_eq!(fresh["revision"], 2);
}

/// Scenario 4: cycle prevention. `edit` rejects a `depends_on` edge that
/// would close a cycle, reporting the cycle path, and leaves the store
/// unchanged.
#[test]
fn cyclic_dependency_is_rejected_with_the_cycle_path() {
    let (_temp, manager) = store();
    let a = create(&manager, "a");
    let b = create(&manager, "b");
    let c = create(&manager, "c");

    assert_eq!(process_intent(&manager, serde_json::json!({"intent": "edit", "task": b, "depends_on": [a.clone()]}))["success"], true);
    assert_eq!(process_intent(&manager, serde_json::json!({"intent": "edit", "task": c, "depends_on": [b.clone()]}))["success"], true);

    let rejected = process_intent(&manager, serde_json::json!({"intent": "edit", "task": a, "depends_on": [c.clone()]}));
    assert_eq!(rejected["success"], false);
    assert_eq!(rejected["error_code"], "CIRCULAR_DEPENDENCY");
    let cycle = rejected["result"]["cycle"].as_array().unwrap();
    assert!(cycle.len() >= 2, "cycle path must name at least the closing edge: {cycle:?}");

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": a}));
    assert_eq!(context["result"]["revision"], 1, "a rejected cycle edit must not bump the revision");
}

/// Reopen a task via `close_task` + remove-last-criterion, the only path
/// that currently flips a task's status to ACTIVE, to exercise the
/// auto-strict-targeting guard below with real ACTIVE roots rather than
/// freshly-created (and therefore still TODO) ones.
fn make_active(manager: &Manager, id: &str) {
    let closed = process_intent(
        manager,
        serde_json::json!({"intent": "patch", "task": id, "ops": [{"op": "append", "field": "success_criteria", "value": "ok"}]}),
    );
    assert_eq!(closed["success"], true);
    let close = process_intent(manager, serde_json::json!({"intent": "close_task", "task": id, "apply": true}));
    assert_eq!(close["success"], true);
    let reopened = process_intent(
        manager,
        serde_json::json!({"intent": "patch", "task": id, "ops": [{"op": "remove", "field": "success_criteria", "value": "ok"}]}),
    );
    assert_eq!(reopened["success"], true);
}

/// Auto-strict targeting: once more than one root is ACTIVE, a mutating
/// intent must name `expected_target_id`, and a mismatched one is
/// rejected without ambiguity about which root was meant.
#[test]
fn auto_strict_targeting_kicks_in_with_multiple_active_roots() {
    let (_temp, manager) = store();
    let a = create(&manager, "a");
    let b = create(&manager, "b");
    make_active(&manager, &a);
    make_active(&manager, &b);

    let missing = process_intent(&manager, serde_json::json!({"intent": "note", "task": a, "note": "x"}));
    assert_eq!(missing["success"], false);
    assert_eq!(missing["error_code"], "STRICT_TARGETING_REQUIRES_EXPECTED_TARGET_ID");

    let mismatched = process_intent(&manager, serde_json::json!({"intent": "note", "task": a, "note": "x", "expected_target_id": b}));
    assert_eq!(mismatched["success"], false);
    assert_eq!(mismatched["error_code"], "EXPECTED_TARGET_MISMATCH");

    let matched = process_intent(&manager, serde_json::json!({"intent": "note", "task": a, "note": "x", "expected_target_id": a}));
    assert_eq!(matched["success"], true);
}

/// `batch({paths: [...]})` expands to one operation per path, applied in
/// order, semantically equivalent to issuing them one at a time.
#[test]
fn batch_with_paths_expands_to_sequential_operations() {
    let (_temp, manager) = store();
    let id = create(&manager, "Ship the release");
    process_intent(&manager, serde_json::json!({"intent": "decompose", "task": id, "steps": ["a", "b"]}));

    let batch = process_intent(
        &manager,
        serde_json::json!({
            "intent": "batch",
            "operations": [{
                "intent": "verify", "task": id,
                "checkpoints": { "criteria": { "confirmed": true }, "tests": { "confirmed": true } },
                "paths": ["0", "1"]
            }]
        }),
    );
    assert_eq!(batch["success"], true, "batch failed: {batch}");
    let results = batch["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2, "one expanded op per path");

    let done_a = process_intent(&manager, serde_json::json!({"intent": "done", "task": id, "path": "0"}));
    let done_b = process_intent(&manager, serde_json::json!({"intent": "done", "task": id, "path": "1"}));
    assert_eq!(done_a["success"], true);
    assert_eq!(done_b["success"], true);
}

/// An atomic batch that fails partway through rolls back every mutation
/// it already applied, leaving the store exactly as it was before the
/// batch ran.
#[test]
fn atomic_batch_rolls_back_everything_on_a_later_failure() {
    let (_temp, manager) = store();
    let id = create(&manager, "Ship the release");

    let batch = process_intent(
        &manager,
        serde_json::json!({
            "intent": "batch",
            "atomic": true,
            "operations": [
                {"intent": "note", "task": id, "note": "first"},
                {"intent": "note", "task": id, "note": "second"},
                {"intent": "note", "task": id, "note": ""}
            ]
        }),
    );
    assert_eq!(batch["success"], false);

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["revision"], 1, "both successful notes must be rolled back alongside the failing one");
}

/// Progress is a plain ratio of completed steps regardless of which
/// steps finished or the order they finished in; a randomized subset
/// done out of a randomized total should always land on the same
/// percentage an equivalent fixed-order run would produce.
#[test]
fn progress_matches_done_ratio_for_a_random_subset_of_steps() {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use rand::SeedableRng;

    let mut rng = StdRng::seed_from_u64(20260801);
    let total = rng.random_range(3..=8);

    let (_temp, manager) = store();
    let id = create(&manager, "Randomized rollout");
    let steps: Vec<String> = (0..total).map(|i| format!("step {i}")).collect();
    process_intent(&manager, serde_json::json!({"intent": "decompose", "task": id, "steps": steps}));

    let mut indices: Vec<usize> = (0..total).collect();
    indices.shuffle(&mut rng);
    let done_count = rng.random_range(0..=total);

    for &idx in indices.iter().take(done_count) {
        let path = idx.to_string();
        process_intent(
            &manager,
            serde_json::json!({
                "intent": "verify", "task": id, "path": path,
                "checkpoints": { "criteria": { "confirmed": true }, "tests": { "confirmed": true } }
            }),
        );
        let response = process_intent(&manager, serde_json::json!({"intent": "done", "task": id, "path": path}));
        assert_eq!(response["success"], true);
    }

    let expected = ((done_count * 100) / total) as i64;
    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["progress"], expected);
}

/// `TOO_MANY_OPERATIONS_AFTER_EXPANSION` is reported, and nothing is
/// written, when a batch's `paths` expansion overflows the array limit.
#[test]
fn batch_expansion_overflow_performs_no_mutation() {
    let (_temp, manager) = store();
    let id = create(&manager, "Ship the release");

    let paths: Vec<String> = (0..2000).map(|i| i.to_string()).collect();
    let batch = process_intent(
        &manager,
        serde_json::json!({
            "intent": "batch",
            "operations": [{"intent": "note", "task": id, "note": "x", "paths": paths}]
        }),
    );
    assert_eq!(batch["success"], false);
    assert_eq!(batch["error_code"], "TOO_MANY_OPERATIONS_AFTER_EXPANSION");

    let context = process_intent(&manager, serde_json::json!({"intent": "context", "task": id}));
    assert_eq!(context["result"]["revision"], 1);
}
