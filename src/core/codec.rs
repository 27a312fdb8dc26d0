//! core::codec
//!
//! The on-disk file format: a YAML metadata preamble delimited by `---`
//! lines, followed by a Markdown body whose section headers are a fixed,
//! untranslated set of Cyrillic headings. Parsing and serialization must
//! round-trip a hand-edited file without silently dropping content, so
//! every section is parsed defensively and unrecognized headings are
//! preserved verbatim in `extra_sections`.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::evidence::{Attachment, VerificationCheck};
use crate::core::events::NodeEvent;
use crate::core::model::{PlanNode, Step, Task, TaskNode};
use crate::core::types::{Domain, Priority, TaskId, UtcTimestamp};

pub const HEADING_DESCRIPTION: &str = "Описание";
pub const HEADING_CONTEXT: &str = "Контекст";
pub const HEADING_SUBTASKS: &str = "Подзадачи";
pub const HEADING_PROBLEMS: &str = "Текущие проблемы";
pub const HEADING_NEXT_STEPS: &str = "Следующие шаги";
pub const HEADING_CRITERIA: &str = "Критерии успеха";
pub const HEADING_DEPENDENCIES: &str = "Зависимости";
pub const HEADING_RISKS: &str = "Риски";
pub const HEADING_HISTORY: &str = "История";

const HEADING_ORDER: [&str; 9] = [
    HEADING_DESCRIPTION,
    HEADING_CONTEXT,
    HEADING_SUBTASKS,
    HEADING_CRITERIA,
    HEADING_DEPENDENCIES,
    HEADING_PROBLEMS,
    HEADING_NEXT_STEPS,
    HEADING_RISKS,
    HEADING_HISTORY,
];

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("file does not contain a '---' delimited metadata preamble")]
    MissingPreamble,

    #[error("failed to parse metadata: {0}")]
    InvalidMetadata(#[from] serde_yaml::Error),

    #[error("metadata is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("metadata id '{0}' is invalid: {1}")]
    InvalidId(String, crate::core::types::TypeError),
}

/// The YAML preamble. Extra keys the current schema does not know about
/// are kept in `extra` so a round-trip never drops them.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Preamble {
    id: String,
    #[serde(default)]
    domain: String,
    revision: u64,
    created_at: String,
    updated_at: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_manual: Option<bool>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    blocked: Option<bool>,
    #[serde(default)]
    project_item_id: Option<String>,
    #[serde(default)]
    project_issue_number: Option<u64>,
    #[serde(default)]
    events: Vec<NodeEvent>,
    #[serde(default, flatten)]
    extra: BTreeMap<String, serde_yaml::Value>,
}

/// Split `content` into (metadata, body) on the first two `---` delimiter
/// lines, mirroring a `maxsplit=2` split on a three-dash line.
fn split_preamble(content: &str) -> Result<(&str, &str), CodecError> {
    let mut parts = content.splitn(3, "---\n");
    let first = parts.next().unwrap_or("");
    if !first.trim().is_empty() {
        return Err(CodecError::MissingPreamble);
    }
    let meta = parts.next().ok_or(CodecError::MissingPreamble)?;
    let body = parts.next().ok_or(CodecError::MissingPreamble)?;
    Ok((meta, body))
}

fn parse_list(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.trim().strip_prefix("- "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_numbered(lines: &[&str]) -> Vec<String> {
    let re = Regex::new(r"^\d+\.\s+(.*)$").unwrap();
    lines
        .iter()
        .filter_map(|l| re.captures(l.trim()))
        .map(|c| c[1].trim().to_string())
        .collect()
}

fn render_list(items: &[String]) -> String {
    items.iter().map(|i| format!("- {}\n", i)).collect()
}

fn render_numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}\n", i + 1, item))
        .collect()
}

/// Split the body on `## ` headers, preserving section order and raw
/// (unsplit) line groups for each one.
fn split_sections(body: &str) -> Vec<(String, Vec<String>)> {
    let mut sections = Vec::new();
    let mut current_heading: Option<String> = None;
    let mut current_lines: Vec<String> = Vec::new();
    for line in body.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(h) = current_heading.take() {
                sections.push((h, std::mem::take(&mut current_lines)));
            }
            current_heading = Some(heading.trim().to_string());
        } else if current_heading.is_some() {
            current_lines.push(line.to_string());
        }
    }
    if let Some(h) = current_heading {
        sections.push((h, current_lines));
    }
    sections
}

fn tagged_value<'a>(lines: &'a [String], tag: &str) -> Option<&'a str> {
    let prefix = format!("{}:", tag);
    lines
        .iter()
        .find(|l| l.trim_start().starts_with(&prefix))
        .map(|l| l.trim_start().strip_prefix(&prefix).unwrap().trim())
}

fn tagged_list(lines: &[String], tag: &str) -> Vec<String> {
    tagged_value(lines, tag)
        .map(|v| v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Parse the `Подзадачи` section into a flat list of [`Step`]s. Each step
/// is a `- [ ]`/`- [x]` line followed by zero or more 2-space indented
/// tagged lines (`Критерии:`, `Тесты:`, `Блокеры:`, confirmation marks,
/// and timestamps).
fn parse_steps(lines: &[String]) -> Vec<Step> {
    let header_re = Regex::new(r"^-\s*\[(x|X| )\]\s*(.+)$").unwrap();
    let mut steps = Vec::new();
    let mut blocks: Vec<(bool, String, Vec<String>)> = Vec::new();

    for line in lines {
        if let Some(caps) = header_re.captures(line.trim_start()) {
            let completed = caps[1].eq_ignore_ascii_case("x");
            let title = caps[2].trim().to_string();
            blocks.push((completed, title, Vec::new()));
        } else if let Some(last) = blocks.last_mut() {
            if line.starts_with("  ") {
                last.2.push(line.trim_start().to_string());
            }
        }
    }

    for (completed, title, sub_lines) in blocks {
        let criteria = tagged_list(&sub_lines, "Критерии");
        let tests = tagged_list(&sub_lines, "Тесты");
        let blockers = tagged_list(&sub_lines, "Блокеры");
        let criteria = if criteria.is_empty() {
            vec![title.clone()]
        } else {
            criteria
        };
        let mut step = match Step::new(title, criteria, tests, blockers) {
            Ok(s) => s,
            Err(_) => continue,
        };
        step.completed = completed;
        if completed {
            step.completed_at = Some(UtcTimestamp::now());
            step.criteria_confirmed = true;
            step.tests_confirmed = true;
        }
        if let Some(v) = tagged_value(&sub_lines, "Отметки критериев") {
            step.criteria_confirmed = v == "==OK" || step.criteria_confirmed;
        }
        if let Some(v) = tagged_value(&sub_lines, "Отметки тестов") {
            step.tests_confirmed = v == "==OK" || step.tests_confirmed;
        }
        if let Some(v) = tagged_value(&sub_lines, "Заблокировано") {
            step.blocked = true;
            step.block_reason = v.to_string();
        }
        if let Some(v) = tagged_value(&sub_lines, "Начато") {
            step.started_at = UtcTimestamp::parse(v).ok();
        }
        if let Some(v) = tagged_value(&sub_lines, "Создано") {
            if let Ok(ts) = UtcTimestamp::parse(v) {
                step.created_at = ts;
            }
        }
        if let Some(v) = tagged_value(&sub_lines, "Прогресс") {
            step.progress_notes = v.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        steps.push(step);
    }
    steps
}

fn render_step_block(step: &Step) -> String {
    let mark = if step.completed { "x" } else { " " };
    let mut out = format!("- [{}] {}\n", mark, step.title);
    if !step.success_criteria.is_empty() {
        out += &format!("  Критерии: {}\n", step.success_criteria.join("; "));
    }
    if !step.tests.is_empty() {
        out += &format!("  Тесты: {}\n", step.tests.join("; "));
    }
    if !step.blockers.is_empty() {
        out += &format!("  Блокеры: {}\n", step.blockers.join("; "));
    }
    out += &format!(
        "  Отметки критериев: {}\n",
        if step.criteria_confirmed { "==OK" } else { "" }
    );
    out += &format!(
        "  Отметки тестов: {}\n",
        if step.tests_confirmed { "==OK" } else { "" }
    );
    if !step.progress_notes.is_empty() {
        out += &format!("  Прогресс: {}\n", step.progress_notes.join("; "));
    }
    if let Some(started) = &step.started_at {
        out += &format!("  Начато: {}\n", started.to_rfc3339());
    }
    if step.blocked {
        out += &format!("  Заблокировано: {}\n", step.block_reason);
    }
    out += &format!("  Создано: {}\n", step.created_at.to_rfc3339());
    if let Some(completed) = &step.completed_at {
        out += &format!("  Завершено: {}\n", completed.to_rfc3339());
    }
    out
}

/// Full round-trip-safe representation of a parsed task file.
#[derive(Debug, Clone)]
pub struct ParsedTaskFile {
    pub task: Task,
    /// Section headings present in the source file that this codec does
    /// not model, kept verbatim so `reserialize` does not drop them.
    pub extra_sections: Vec<(String, String)>,
}

/// Parse a complete Task file (YAML preamble + Markdown body).
pub fn parse_task(content: &str) -> Result<ParsedTaskFile, CodecError> {
    let (meta_str, body) = split_preamble(content)?;
    let meta: Preamble = serde_yaml::from_str(meta_str)?;

    let id = TaskId::new(meta.id.clone()).map_err(|e| CodecError::InvalidId(meta.id.clone(), e))?;
    let domain = Domain::new(meta.domain.clone()).unwrap_or_default();
    let depends_on: Vec<TaskId> = meta
        .depends_on
        .iter()
        .filter_map(|s| TaskId::new(s.clone()).ok())
        .collect();

    let mut title = String::new();
    let mut node = TaskNode::new("untitled");
    node.priority = meta
        .priority
        .as_deref()
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or_default();
    node.status = meta.status.clone().unwrap_or_else(|| "TODO".to_string());
    node.status_manual = meta.status_manual.unwrap_or(false);
    node.blocked = meta.blocked.unwrap_or(false);

    // The title is the first top-level `# ` heading in the body, if any.
    for line in body.lines() {
        if let Some(t) = line.strip_prefix("# ") {
            title = t.trim().to_string();
            break;
        }
    }
    if !title.is_empty() {
        node.title = title;
    }

    let mut extra_sections = Vec::new();
    for (heading, lines) in split_sections(body) {
        let joined = || lines.join("\n").trim().to_string();
        match heading.as_str() {
            h if h == HEADING_DESCRIPTION => node.description = joined(),
            h if h == HEADING_CONTEXT => node.context = joined(),
            h if h == HEADING_SUBTASKS => node.steps = parse_steps(&lines),
            h if h == HEADING_CRITERIA => {
                let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
                node.success_criteria = parse_list(&refs);
            }
            h if h == HEADING_DEPENDENCIES => { /* already sourced from metadata */ }
            h if h == HEADING_PROBLEMS => {
                let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
                node.problems = parse_numbered(&refs);
            }
            h if h == HEADING_NEXT_STEPS => {
                let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
                node.next_steps = parse_list(&refs);
            }
            h if h == HEADING_RISKS => {
                let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
                node.risks = parse_list(&refs);
            }
            h if h == HEADING_HISTORY => { /* replayed from the event log, not the body */ }
            other => extra_sections.push((other.to_string(), joined())),
        }
    }

    // Auto-promote status when every step is done and nothing is blocked,
    // matching the legacy file convention.
    if !node.steps.is_empty() && node.calculate_progress() == 100 && !node.blocked {
        node.status = "DONE".to_string();
    }

    let task = Task {
        id,
        domain,
        revision: meta.revision,
        created_at: UtcTimestamp::parse(&meta.created_at).unwrap_or_else(|_| UtcTimestamp::now()),
        updated_at: UtcTimestamp::parse(&meta.updated_at).unwrap_or_else(|_| UtcTimestamp::now()),
        depends_on,
        project_item_id: meta.project_item_id.clone(),
        project_issue_number: meta.project_issue_number,
        events: meta.events.clone(),
        node,
    };

    Ok(ParsedTaskFile { task, extra_sections })
}

/// Render one [`NodeEvent`] as a YAML sequence item nested under the
/// `events:` key, reusing `serde_yaml` for the mapping body so new event
/// fields never need a matching hand-written formatter here.
fn render_event_as_yaml_list_item(event: &NodeEvent) -> String {
    let body = serde_yaml::to_string(event).unwrap_or_default();
    let mut out = String::new();
    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            out += &format!("  - {}\n", line);
        } else {
            out += &format!("    {}\n", line);
        }
    }
    out
}

/// Serialize a [`Task`] back into the on-disk file format.
pub fn render_task(task: &Task) -> String {
    let mut meta = String::new();
    meta += "---\n";
    meta += &format!("id: {}\n", task.id);
    meta += &format!("domain: {}\n", task.domain);
    meta += &format!("revision: {}\n", task.revision);
    meta += &format!("created_at: {}\n", task.created_at.to_rfc3339());
    meta += &format!("updated_at: {}\n", task.updated_at.to_rfc3339());
    meta += &format!("priority: {}\n", task.node.priority);
    meta += &format!("status: {}\n", task.node.status);
    meta += &format!("status_manual: {}\n", task.node.status_manual);
    meta += &format!("blocked: {}\n", task.node.blocked);
    if !task.depends_on.is_empty() {
        meta += "depends_on:\n";
        for dep in &task.depends_on {
            meta += &format!("  - {}\n", dep);
        }
    }
    if let Some(item_id) = &task.project_item_id {
        meta += &format!("project_item_id: {}\n", item_id);
    }
    if let Some(issue) = task.project_issue_number {
        meta += &format!("project_issue_number: {}\n", issue);
    }
    if !task.events.is_empty() {
        meta += "events:\n";
        for event in &task.events {
            meta += &render_event_as_yaml_list_item(event);
        }
    }
    meta += "---\n";

    let mut body = String::new();
    body += &format!("# {}\n\n", task.node.title);
    for heading in HEADING_ORDER {
        body += &format!("## {}\n", heading);
        body += &match heading {
            h if h == HEADING_DESCRIPTION => format!("{}\n", task.node.description),
            h if h == HEADING_CONTEXT => format!("{}\n", task.node.context),
            h if h == HEADING_SUBTASKS => task.node.steps.iter().map(render_step_block).collect::<String>(),
            h if h == HEADING_CRITERIA => render_list(&task.node.success_criteria),
            h if h == HEADING_DEPENDENCIES => render_list(&task.depends_on.iter().map(|d| d.to_string()).collect::<Vec<_>>()),
            h if h == HEADING_PROBLEMS => render_numbered(&task.node.problems),
            h if h == HEADING_NEXT_STEPS => render_list(&task.node.next_steps),
            h if h == HEADING_RISKS => render_list(&task.node.risks),
            h if h == HEADING_HISTORY => crate::core::events::format_timeline(&task.events)
                .into_iter()
                .map(|line| format!("- {}\n", line))
                .collect(),
            _ => String::new(),
        };
        body += "\n";
    }

    format!("{}\n{}", meta, body)
}

/// Attachments and verification checks are stored as a parallel JSON
/// sidecar block rather than in the Markdown body, since they carry
/// structured, potentially large payloads that do not fit the fixed
/// Cyrillic-heading format.
pub fn render_evidence_sidecar(checks: &[VerificationCheck], attachments: &[Attachment]) -> String {
    serde_json::to_string_pretty(&serde_json::json!({
        "verification_checks": checks,
        "attachments": attachments,
    }))
    .unwrap_or_default()
}

/// Nested-plan outline rendering for a decomposed step, reusing the same
/// checkbox convention as the top-level `Подзадачи` section.
pub fn render_plan_outline(plan: &PlanNode) -> String {
    plan.steps
        .iter()
        .enumerate()
        .map(|(i, title)| {
            let mark = if i < plan.current { "x" } else { " " };
            format!("- [{}] {}\n", mark, title)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        let mut task = Task::new(TaskId::new("TASK-001").unwrap(), Domain::new("backend").unwrap(), "Ship the thing");
        task.node.description = "Do the work.".to_string();
        task.node.success_criteria = vec!["it ships".to_string()];
        let step = Step::new("write code", vec!["compiles".to_string()], vec!["cargo test".to_string()], vec![]).unwrap();
        task.node.steps.push(step);
        task
    }

    #[test]
    fn render_then_parse_roundtrips_core_fields() {
        let task = sample_task();
        let rendered = render_task(&task);
        let parsed = parse_task(&rendered).unwrap();
        assert_eq!(parsed.task.id, task.id);
        assert_eq!(parsed.task.node.title, task.node.title);
        assert_eq!(parsed.task.node.description, task.node.description);
        assert_eq!(parsed.task.node.success_criteria, task.node.success_criteria);
        assert_eq!(parsed.task.node.steps.len(), 1);
        assert_eq!(parsed.task.node.steps[0].title, "write code");
        assert_eq!(parsed.task.node.steps[0].tests, vec!["cargo test".to_string()]);
    }

    #[test]
    fn parse_rejects_missing_preamble() {
        assert!(parse_task("# no preamble here").is_err());
    }

    #[test]
    fn parse_numbered_extracts_text() {
        let lines = vec!["1. first problem".to_string(), "2. second problem".to_string()];
        let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        assert_eq!(parse_numbered(&refs), vec!["first problem", "second problem"]);
    }

    #[test]
    fn completed_step_marks_task_done_on_parse() {
        let mut task = sample_task();
        task.node.steps[0].completed = true;
        task.node.steps[0].criteria_confirmed = true;
        task.node.steps[0].tests_confirmed = true;
        let rendered = render_task(&task);
        let parsed = parse_task(&rendered).unwrap();
        assert_eq!(parsed.task.node.status, "DONE");
    }

    #[test]
    fn depends_on_roundtrips_through_metadata() {
        let mut task = sample_task();
        task.depends_on = vec![TaskId::new("TASK-002").unwrap()];
        let rendered = render_task(&task);
        let parsed = parse_task(&rendered).unwrap();
        assert_eq!(parsed.task.depends_on, vec![TaskId::new("TASK-002").unwrap()]);
    }

    #[test]
    fn project_item_id_roundtrips_through_metadata() {
        let mut task = sample_task();
        task.project_item_id = Some("PVTI_abc123".to_string());
        task.project_issue_number = Some(42);
        let rendered = render_task(&task);
        let parsed = parse_task(&rendered).unwrap();
        assert_eq!(parsed.task.project_item_id.as_deref(), Some("PVTI_abc123"));
        assert_eq!(parsed.task.project_issue_number, Some(42));
    }

    #[test]
    fn events_roundtrip_through_metadata_and_render_into_history_section() {
        let mut task = sample_task();
        task.record(crate::core::events::NodeEvent::comment(
            crate::core::events::Actor::Ai,
            "",
            "looked reasonable",
        ));
        let rendered = render_task(&task);
        assert!(rendered.contains(HEADING_HISTORY));
        assert!(rendered.contains("looked reasonable"));

        let parsed = parse_task(&rendered).unwrap();
        assert_eq!(parsed.task.events.len(), 1);
        assert_eq!(parsed.task.events[0].event_type, crate::core::events::EventType::Comment);
    }

    #[test]
    fn plan_outline_marks_steps_before_current_as_done() {
        let mut plan = PlanNode::new("rollout");
        plan.steps = vec!["design".into(), "build".into(), "ship".into()];
        plan.current = 2;
        let rendered = render_plan_outline(&plan);
        assert_eq!(rendered, "- [x] design\n- [x] build\n- [ ] ship\n");
    }
}
