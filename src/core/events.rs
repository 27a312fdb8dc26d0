//! core::events
//!
//! The append-only event log recorded against every node: who did what,
//! when, and with what payload. Events are never mutated or removed once
//! written; the `history` intent replays them through [`format_timeline`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::UtcTimestamp;

/// Who performed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Ai,
    Human,
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Actor::Ai => "ai",
            Actor::Human => "human",
            Actor::System => "system",
        };
        write!(f, "{}", label)
    }
}

impl Default for Actor {
    fn default() -> Self {
        Actor::Ai
    }
}

/// The closed set of event kinds that can appear in a node's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Checkpoint,
    Status,
    Blocked,
    Unblocked,
    StepDone,
    Comment,
    DependencyAdded,
    DependencyResolved,
    ContractUpdated,
    PlanUpdated,
    PlanAdvanced,
    Override,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventType::Created => "created",
            EventType::Checkpoint => "checkpoint",
            EventType::Status => "status",
            EventType::Blocked => "blocked",
            EventType::Unblocked => "unblocked",
            EventType::StepDone => "step_done",
            EventType::Comment => "comment",
            EventType::DependencyAdded => "dependency_added",
            EventType::DependencyResolved => "dependency_resolved",
            EventType::ContractUpdated => "contract_updated",
            EventType::PlanUpdated => "plan_updated",
            EventType::PlanAdvanced => "plan_advanced",
            EventType::Override => "override",
        };
        write!(f, "{}", label)
    }
}

pub type EventData = BTreeMap<String, serde_json::Value>;

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub timestamp: UtcTimestamp,
    pub event_type: EventType,
    #[serde(default)]
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "EventData::is_empty")]
    pub data: EventData,
}

fn data_with(pairs: &[(&str, serde_json::Value)]) -> EventData {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

impl NodeEvent {
    fn new(event_type: EventType, actor: Actor, target: impl Into<String>, data: EventData) -> Self {
        Self {
            timestamp: UtcTimestamp::now(),
            event_type,
            actor,
            target: target.into(),
            data,
        }
    }

    pub fn created(actor: Actor, target: impl Into<String>) -> Self {
        Self::new(EventType::Created, actor, target, EventData::new())
    }

    pub fn checkpoint(actor: Actor, target: impl Into<String>, name: &str) -> Self {
        Self::new(
            EventType::Checkpoint,
            actor,
            target,
            data_with(&[("name", serde_json::Value::String(name.to_string()))]),
        )
    }

    pub fn status_changed(actor: Actor, target: impl Into<String>, from: &str, to: &str) -> Self {
        Self::new(
            EventType::Status,
            actor,
            target,
            data_with(&[
                ("from", serde_json::Value::String(from.to_string())),
                ("to", serde_json::Value::String(to.to_string())),
            ]),
        )
    }

    pub fn step_done(actor: Actor, target: impl Into<String>, title: &str) -> Self {
        Self::new(
            EventType::StepDone,
            actor,
            target,
            data_with(&[("title", serde_json::Value::String(title.to_string()))]),
        )
    }

    pub fn blocked(actor: Actor, target: impl Into<String>, reason: &str) -> Self {
        Self::new(
            EventType::Blocked,
            actor,
            target,
            data_with(&[("reason", serde_json::Value::String(reason.to_string()))]),
        )
    }

    pub fn unblocked(actor: Actor, target: impl Into<String>) -> Self {
        Self::new(EventType::Unblocked, actor, target, EventData::new())
    }

    pub fn dependency_added(actor: Actor, target: impl Into<String>, depends_on: &str) -> Self {
        Self::new(
            EventType::DependencyAdded,
            actor,
            target,
            data_with(&[("depends_on", serde_json::Value::String(depends_on.to_string()))]),
        )
    }

    pub fn dependency_resolved(actor: Actor, target: impl Into<String>, depends_on: &str) -> Self {
        Self::new(
            EventType::DependencyResolved,
            actor,
            target,
            data_with(&[("depends_on", serde_json::Value::String(depends_on.to_string()))]),
        )
    }

    pub fn comment(actor: Actor, target: impl Into<String>, text: &str) -> Self {
        Self::new(
            EventType::Comment,
            actor,
            target,
            data_with(&[("text", serde_json::Value::String(text.to_string()))]),
        )
    }

    pub fn override_event(actor: Actor, target: impl Into<String>, reason: &str) -> Self {
        Self::new(
            EventType::Override,
            actor,
            target,
            data_with(&[("reason", serde_json::Value::String(reason.to_string()))]),
        )
    }

    /// Render one human-readable timeline line for this event.
    pub fn format_line(&self) -> String {
        let stamp = self.timestamp.to_rfc3339();
        let body = match self.event_type {
            EventType::Created => "created".to_string(),
            EventType::Checkpoint => {
                let name = self.data.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                format!("checkpoint confirmed: {}", name)
            }
            EventType::Status => {
                let from = self.data.get("from").and_then(|v| v.as_str()).unwrap_or("?");
                let to = self.data.get("to").and_then(|v| v.as_str()).unwrap_or("?");
                format!("status changed {} -> {}", from, to)
            }
            EventType::Blocked => {
                let reason = self.data.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                format!("blocked: {}", reason)
            }
            EventType::Unblocked => "unblocked".to_string(),
            EventType::StepDone => {
                let title = self.data.get("title").and_then(|v| v.as_str()).unwrap_or("");
                format!("step done: {}", title)
            }
            EventType::Comment => {
                let text = self.data.get("text").and_then(|v| v.as_str()).unwrap_or("");
                format!("comment: {}", text)
            }
            EventType::DependencyAdded => {
                let dep = self.data.get("depends_on").and_then(|v| v.as_str()).unwrap_or("?");
                format!("dependency added: {}", dep)
            }
            EventType::DependencyResolved => {
                let dep = self.data.get("depends_on").and_then(|v| v.as_str()).unwrap_or("?");
                format!("dependency resolved: {}", dep)
            }
            EventType::ContractUpdated => "contract updated".to_string(),
            EventType::PlanUpdated => "plan updated".to_string(),
            EventType::PlanAdvanced => "plan advanced".to_string(),
            EventType::Override => {
                let reason = self.data.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                format!("override: {}", reason)
            }
        };
        if self.target.is_empty() {
            format!("{} [{}] {}", stamp, self.actor, body)
        } else {
            format!("{} [{}] {} ({})", stamp, self.actor, body, self.target)
        }
    }
}

/// Sort events chronologically and render the full timeline.
pub fn format_timeline(events: &[NodeEvent]) -> Vec<String> {
    let mut sorted: Vec<&NodeEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);
    sorted.into_iter().map(NodeEvent::format_line).collect()
}
