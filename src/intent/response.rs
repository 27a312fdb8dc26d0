//! intent::response
//!
//! The envelope every [`super::process_intent`] call returns: a
//! `success` flag, the echoed `intent` name, an intent-specific
//! `result` payload, resolution/targeting `context`, zero or more
//! follow-up `suggestions`, and on failure an `error_code` /
//! `error_message` pair.

use serde::Serialize;
use serde_json::Value;

use super::error::ErrorCode;

#[derive(Debug, Clone, Serialize)]
pub struct IntentResponse {
    pub success: bool,
    pub intent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub context: ResponseContext,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_recovery: Option<ErrorRecovery>,
}

impl IntentResponse {
    pub fn success(intent: impl Into<String>, result: Value, target_resolution: TargetResolution) -> Self {
        Self {
            success: true,
            intent: intent.into(),
            result: Some(result),
            context: ResponseContext {
                target_resolution: Some(target_resolution),
            },
            suggestions: Vec::new(),
            revision: None,
            error_code: None,
            error_message: None,
            error_recovery: None,
        }
    }

    pub fn failure(intent: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            intent: intent.into(),
            result: None,
            context: ResponseContext::default(),
            suggestions: Vec::new(),
            revision: None,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
            error_recovery: None,
        }
    }

    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Attach a structured payload to a failure response (e.g. the
    /// `CIRCULAR_DEPENDENCY` cycle path) without promoting it to success.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<Suggestion>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Resolution/targeting metadata echoed back alongside the result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resolution: Option<TargetResolution>,
}

/// Which of the three sources (explicit id, a `paths` array entry, or
/// the `.last` focus pointer) supplied the operation's target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetResolution {
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TargetResolution {
    pub fn explicit(id: impl Into<String>) -> Self {
        Self {
            source: "explicit",
            id: Some(id.into()),
        }
    }

    pub fn focus(id: impl Into<String>) -> Self {
        Self {
            source: "focus",
            id: Some(id.into()),
        }
    }

    pub fn none() -> Self {
        Self { source: "none", id: None }
    }
}

/// A single follow-up action the caller could take next.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub action: String,
    pub title: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Suggestion {
    pub fn new(action: impl Into<String>, title: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
            params,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Structured guidance attached to an error response. Reserved for the
/// revision-mismatch recovery path (surfacing `current_revision` and a
/// ready-to-retry `resume` payload); not yet populated by any call site.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecovery {
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_serializes_without_error_fields() {
        let response = IntentResponse::success("note", serde_json::json!({}), TargetResolution::explicit("TASK-001"));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("error_code").is_none());
        assert_eq!(value["context"]["target_resolution"]["source"], "explicit");
    }

    #[test]
    fn failure_response_carries_error_code_string() {
        let response = IntentResponse::failure("note", ErrorCode::MissingNote, "empty");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["error_code"], "MISSING_NOTE");
        assert_eq!(value["success"], false);
    }
}
