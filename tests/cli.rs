//! CLI-level smoke tests for the `tt` binary, exercised against a real
//! store directory the way the teacher's `tests/integration/mod.rs` drives
//! its CLI through `assert_cmd::Command::cargo_bin`.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn tt(store: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tt").unwrap();
    cmd.arg("--store").arg(store.path());
    cmd
}

#[test]
fn send_create_against_a_fresh_store_succeeds() {
    let store = TempDir::new().unwrap();
    tt(&store)
        .arg("send")
        .arg(r#"{"intent":"create","kind":"task","title":"Ship the release","domain":"backend"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"))
        .stdout(predicate::str::contains("TASK-001"));

    store.child("backend").assert(predicate::path::exists());
}

#[test]
fn send_reads_request_from_stdin_when_no_argument_given() {
    let store = TempDir::new().unwrap();
    tt(&store)
        .arg("send")
        .write_stdin(r#"{"intent":"create","kind":"task","title":"Via stdin"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"TASK-001\""));
}

#[test]
fn send_exits_nonzero_and_reports_error_code_on_failure() {
    let store = TempDir::new().unwrap();
    tt(&store)
        .arg("send")
        .arg(r#"{"intent":"bogus"}"#)
        .assert()
        .failure()
        .stdout(predicate::str::contains("UNKNOWN_INTENT"));
}

#[test]
fn second_invocation_sees_the_first_invocations_writes() {
    let store = TempDir::new().unwrap();
    tt(&store)
        .arg("send")
        .arg(r#"{"intent":"create","kind":"task","title":"Persisted"}"#)
        .assert()
        .success();

    tt(&store)
        .arg("send")
        .arg(r#"{"intent":"context","task":"TASK-001"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\""));
}
