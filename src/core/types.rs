//! core::types
//!
//! Strong identifier and scalar types for the task tree.
//!
//! Every identifier that crosses a file or wire boundary is validated on
//! construction rather than passed around as a bare `String`. This mirrors
//! the newtype-plus-`validate()` pattern used throughout the rest of the
//! core: a type can only exist in a form the rest of the crate is allowed
//! to assume.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from constructing a strong type from untrusted input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    #[error("{kind} '{value}' does not match the required pattern {pattern}")]
    Pattern {
        kind: &'static str,
        value: String,
        pattern: &'static str,
    },

    #[error("{kind} '{value}' must not contain path traversal segments")]
    PathTraversal { kind: &'static str, value: String },

    #[error("{kind} '{value}' must not be an absolute path")]
    Absolute { kind: &'static str, value: String },
}

fn numeric_id(kind: &'static str, prefix: &str, value: &str) -> Result<u64, TypeError> {
    let pattern: &'static str = match prefix {
        "PLAN-" => "PLAN-\\d+",
        "TASK-" => "TASK-\\d+",
        _ => "<prefix>-\\d+",
    };
    let suffix = value.strip_prefix(prefix).ok_or_else(|| TypeError::Pattern {
        kind,
        value: value.to_string(),
        pattern,
    })?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TypeError::Pattern {
            kind,
            value: value.to_string(),
            pattern,
        });
    }
    suffix.parse::<u64>().map_err(|_| TypeError::Pattern {
        kind,
        value: value.to_string(),
        pattern,
    })
}

macro_rules! numeric_root_id {
    ($name:ident, $prefix:literal, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                numeric_id($kind, $prefix, &value)?;
                Ok(Self(value))
            }

            /// Build the canonical ID from a numeric sequence value.
            pub fn from_sequence(n: u64) -> Self {
                Self(format!(concat!($prefix, "{:03}"), n))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn sequence(&self) -> u64 {
                numeric_id($kind, $prefix, &self.0).expect("validated on construction")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = TypeError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

numeric_root_id!(PlanId, "PLAN-", "plan id");
numeric_root_id!(TaskId, "TASK-", "task id");

macro_rules! random_node_id {
    ($name:ident, $prefix:literal, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                Self::validate(&value)?;
                Ok(Self(value))
            }

            fn validate(value: &str) -> Result<(), TypeError> {
                let suffix = value.strip_prefix($prefix).ok_or_else(|| TypeError::Pattern {
                    kind: $kind,
                    value: value.to_string(),
                    pattern: concat!($prefix, "[0-9A-F]{8}"),
                })?;
                if suffix.len() != 8 || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(TypeError::Pattern {
                        kind: $kind,
                        value: value.to_string(),
                        pattern: concat!($prefix, "[0-9A-F]{8}"),
                    });
                }
                Ok(())
            }

            /// Generate a fresh random id, matching the 8-hex-uppercase
            /// suffix convention used by legacy fixture files.
            pub fn generate() -> Self {
                let hex = uuid::Uuid::new_v4().simple().to_string();
                Self(format!("{}{}", $prefix, hex[..8].to_uppercase()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }
    };
}

random_node_id!(StepId, "STEP-", "step id");
random_node_id!(NodeId, "NODE-", "embedded task node id");

/// Either kind of root a file on disk can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootId {
    Plan(PlanId),
    Task(TaskId),
}

impl RootId {
    pub fn as_str(&self) -> &str {
        match self {
            RootId::Plan(id) => id.as_str(),
            RootId::Task(id) => id.as_str(),
        }
    }

    /// Parse a bare root id string, inferring the kind from its prefix.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        if value.starts_with("PLAN-") {
            Ok(RootId::Plan(PlanId::new(value)?))
        } else if value.starts_with("TASK-") {
            Ok(RootId::Task(TaskId::new(value)?))
        } else {
            Err(TypeError::Pattern {
                kind: "root id",
                value: value.to_string(),
                pattern: "PLAN-\\d+ | TASK-\\d+",
            })
        }
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directory prefix under the store that groups related roots.
///
/// Never part of an id; validated against path traversal the same way
/// every on-disk path segment the repository touches is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        Self::validate(&value)?;
        Ok(Self(value))
    }

    fn validate(value: &str) -> Result<(), TypeError> {
        if value.is_empty() {
            return Ok(());
        }
        if value.starts_with('/') || value.starts_with('\\') {
            return Err(TypeError::Absolute {
                kind: "domain",
                value: value.to_string(),
            });
        }
        if value.split(['/', '\\']).any(|seg| seg == "..") {
            return Err(TypeError::PathTraversal {
                kind: "domain",
                value: value.to_string(),
            });
        }
        Ok(())
    }

    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Domain {
    type Error = TypeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> String {
        value.0
    }
}

/// Validate a bare id component (no domain) for path-traversal safety.
///
/// Used by the repository before it ever joins an id onto a filesystem
/// path: an id may not contain `..`, `/`, or `\`.
pub fn validate_id_component(kind: &'static str, value: &str) -> Result<(), TypeError> {
    if value.is_empty() {
        return Err(TypeError::Empty { kind });
    }
    if value.contains("..") || value.contains('/') || value.contains('\\') {
        return Err(TypeError::PathTraversal {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A timestamp serialized as RFC 3339 / ISO 8601, matching the on-disk
/// `created` / `updated` / `started_at` / `completed_at` scalar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcTimestamp(DateTime<Utc>);

impl UtcTimestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn parse(value: &str) -> Result<Self, TypeError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|_| TypeError::Pattern {
                kind: "timestamp",
                value: value.to_string(),
                pattern: "RFC 3339",
            })
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rfc3339())
    }
}

impl TryFrom<String> for UtcTimestamp {
    type Error = TypeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcTimestamp> for String {
    fn from(value: UtcTimestamp) -> String {
        value.to_rfc3339()
    }
}

/// Priority levels accepted by `create`/`patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl FromStr for Priority {
    type Err = TypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "CRITICAL" => Ok(Priority::Critical),
            other => Err(TypeError::Pattern {
                kind: "priority",
                value: other.to_string(),
                pattern: "LOW|MEDIUM|HIGH|CRITICAL",
            }),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        write!(f, "{}", label)
    }
}

/// The closed set of checkpoint kinds a node can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Criteria,
    Tests,
    Blockers,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 3] = [Checkpoint::Criteria, Checkpoint::Tests, Checkpoint::Blockers];

    pub fn label_ru(self) -> &'static str {
        match self {
            Checkpoint::Criteria => "Критерии",
            Checkpoint::Tests => "Тесты",
            Checkpoint::Blockers => "Блокеры",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Checkpoint::Criteria => "criteria",
            Checkpoint::Tests => "tests",
            Checkpoint::Blockers => "blockers",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_id_roundtrip() {
        let id = PlanId::new("PLAN-001").unwrap();
        assert_eq!(id.as_str(), "PLAN-001");
        assert_eq!(id.sequence(), 1);
    }

    #[test]
    fn task_id_rejects_malformed() {
        assert!(TaskId::new("TASK-abc").is_err());
        assert!(TaskId::new("PLAN-001").is_err());
        assert!(TaskId::new("").is_err());
    }

    #[test]
    fn from_sequence_zero_pads() {
        assert_eq!(TaskId::from_sequence(7).as_str(), "TASK-007");
        assert_eq!(TaskId::from_sequence(1234).as_str(), "TASK-1234");
    }

    #[test]
    fn step_id_generate_matches_pattern() {
        let id = StepId::generate();
        assert!(id.as_str().starts_with("STEP-"));
        assert_eq!(id.as_str().len(), 13);
        assert!(StepId::new(id.as_str().to_string()).is_ok());
    }

    #[test]
    fn domain_rejects_traversal_and_absolute() {
        assert!(Domain::new("..").is_err());
        assert!(Domain::new("a/../b").is_err());
        assert!(Domain::new("/etc").is_err());
        assert!(Domain::new("backend/api").is_ok());
        assert!(Domain::root().is_root());
    }

    #[test]
    fn validate_id_component_rejects_traversal() {
        assert!(validate_id_component("task id", "../TASK-001").is_err());
        assert!(validate_id_component("task id", "TASK-001/x").is_err());
        assert!(validate_id_component("task id", "TASK-001").is_ok());
    }

    #[test]
    fn root_id_parses_by_prefix() {
        assert!(matches!(RootId::parse("PLAN-001"), Ok(RootId::Plan(_))));
        assert!(matches!(RootId::parse("TASK-042"), Ok(RootId::Task(_))));
        assert!(RootId::parse("STEP-ABCDEF01").is_err());
    }

    #[test]
    fn priority_from_str_case_insensitive() {
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
