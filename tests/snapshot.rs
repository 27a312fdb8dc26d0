//! Snapshot coverage for the stable shape of a response envelope.
//!
//! Grounded on the spirit of the teacher's own snapshot-style fixture
//! tests (golden-file comparisons for rendered output); here the
//! "golden" value is a narrow, hand-picked projection of
//! `IntentResponse` rather than the whole JSON body, so the snapshot
//! doesn't churn every time an unrelated field is added to the payload.

use serde_json::json;
use tasktree::intent::process_intent;
use tasktree::manager::Manager;
use tempfile::TempDir;

#[derive(Debug)]
struct EnvelopeShape {
    success: bool,
    intent: String,
    error_code: Option<String>,
    target_resolution_source: Option<String>,
}

#[test]
fn create_response_envelope_snapshot() {
    let temp = TempDir::new().unwrap();
    let manager = Manager::open(temp.path()).unwrap();
    let response = process_intent(&manager, json!({"intent": "create", "kind": "task", "title": "Snapshot me", "domain": "backend"}));

    let shape = EnvelopeShape {
        success: response["success"].as_bool().unwrap(),
        intent: response["intent"].as_str().unwrap().to_string(),
        error_code: response["error_code"].as_str().map(String::from),
        target_resolution_source: response["context"]["target_resolution"]["source"].as_str().map(String::from),
    };

    insta::assert_debug_snapshot!(shape, @r###"
    EnvelopeShape {
        success: true,
        intent: "create",
        error_code: None,
        target_resolution_source: Some(
            "explicit",
        ),
    }
    "###);
}
