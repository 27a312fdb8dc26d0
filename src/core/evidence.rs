//! core::evidence
//!
//! Verification and attachment records. Both are written with their
//! zero-valued fields omitted, so a hand-edited file stays minimal and a
//! round-trip through [`crate::core::codec`] does not introduce noise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::UtcTimestamp;

/// Free-form key/value details attached to a verification check or
/// attachment. Kept as a `BTreeMap` so serialization order is stable.
pub type Details = BTreeMap<String, serde_json::Value>;

/// The recorded outcome of running a verification check against a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub kind: String,
    pub spec: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<UtcTimestamp>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview: String,
    #[serde(default, skip_serializing_if = "Details::is_empty")]
    pub details: Details,
}

impl VerificationCheck {
    pub fn new(kind: impl Into<String>, spec: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            spec: spec.into(),
            outcome: outcome.into(),
            observed_at: Some(UtcTimestamp::now()),
            digest: String::new(),
            preview: String::new(),
            details: Details::new(),
        }
    }
}

/// A reference to supporting evidence: a local file, a content URI, or an
/// external link, optionally paired with a size and digest for integrity
/// checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_uri: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<UtcTimestamp>,
    #[serde(default, skip_serializing_if = "Details::is_empty")]
    pub meta: Details,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Attachment {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            path: String::new(),
            uri: String::new(),
            external_uri: String::new(),
            size: 0,
            digest: String::new(),
            observed_at: Some(UtcTimestamp::now()),
            meta: Details::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_check_omits_empty_fields_in_json() {
        let check = VerificationCheck {
            kind: "test".into(),
            spec: "cargo test".into(),
            outcome: "pass".into(),
            observed_at: None,
            digest: String::new(),
            preview: String::new(),
            details: Details::new(),
        };
        let json = serde_json::to_value(&check).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("digest"));
        assert!(!obj.contains_key("preview"));
        assert!(!obj.contains_key("details"));
        assert!(!obj.contains_key("observed_at"));
    }

    #[test]
    fn attachment_omits_zero_size() {
        let attachment = Attachment::new("file");
        let json = serde_json::to_value(&attachment).unwrap();
        assert!(!json.as_object().unwrap().contains_key("size"));
    }

    #[test]
    fn attachment_roundtrips_with_fields_set() {
        let mut attachment = Attachment::new("file");
        attachment.path = "evidence/log.txt".into();
        attachment.size = 128;
        let json = serde_json::to_string(&attachment).unwrap();
        let parsed: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.path, "evidence/log.txt");
        assert_eq!(parsed.size, 128);
    }
}
