// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Full session detail: the complete message list with normalized blocks,
//! plus progress events attached to their parent assistant messages.
//!
//! Progress attachment is a two-pass build: children are collected into a
//! `parent_uuid → events` map during the linear pass and attached by index
//! afterwards, so no mutable pointer graph is needed.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use agento_store::MessageBlock;

use crate::summary::{extract_text, parse_timestamp, RawEvent};

/// One message of the detail view.
#[derive(Debug, Clone, Serialize)]
pub struct DetailMessage {
    pub uuid: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub content: String,
    pub blocks: Vec<MessageBlock>,
    /// Progress events whose `parentUuid` names this message.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub project_path: String,
    pub cwd: String,
    pub git_branch: String,
    pub model: String,
    pub messages: Vec<DetailMessage>,
}

/// Normalize raw content blocks: `thinking`/`text`/`tool_use` survive,
/// everything else is dropped.
fn normalize_blocks(content: &Value) -> Vec<MessageBlock> {
    let Value::Array(raw) = content else {
        return Vec::new();
    };
    raw.iter()
        .filter_map(|block| {
            match block.get("type").and_then(Value::as_str)? {
                "thinking" => Some(MessageBlock::Thinking {
                    text: block
                        .get("thinking")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                "text" => Some(MessageBlock::Text {
                    text: block
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                "tool_use" => Some(MessageBlock::ToolUse {
                    id: block
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                }),
                _ => None,
            }
        })
        .collect()
}

/// Parse a transcript into the full detail view.
pub(crate) fn build_detail(
    path: &Path,
    session_id: &str,
    project_path: &str,
) -> std::io::Result<SessionDetail> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut messages: Vec<DetailMessage> = Vec::new();
    let mut progress_by_parent: HashMap<String, Vec<Value>> = HashMap::new();
    let mut cwd = String::new();
    let mut git_branch = String::new();
    let mut model = String::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<RawEvent>(&line) else {
            continue;
        };
        if event.kind == "file-history-snapshot" {
            continue;
        }

        if cwd.is_empty() {
            if let Some(value) = event.cwd.as_deref().filter(|c| !c.is_empty()) {
                cwd = value.to_string();
            }
        }
        if git_branch.is_empty() {
            if let Some(value) = event.git_branch.as_deref().filter(|b| !b.is_empty()) {
                git_branch = value.to_string();
            }
        }

        match event.kind.as_str() {
            "user" if !event.is_sidechain => {
                let content = event
                    .message
                    .as_ref()
                    .map(|m| extract_text(&m.content))
                    .unwrap_or_default();
                let blocks = event
                    .message
                    .as_ref()
                    .map(|m| normalize_blocks(&m.content))
                    .unwrap_or_default();
                messages.push(DetailMessage {
                    uuid: event.uuid.clone(),
                    role: "user".to_string(),
                    timestamp: parse_timestamp(&event.timestamp),
                    content,
                    blocks,
                    children: Vec::new(),
                });
            }
            "assistant" => {
                if model.is_empty() {
                    if let Some(value) = event
                        .message
                        .as_ref()
                        .and_then(|m| m.model.as_deref())
                        .filter(|m| !m.is_empty())
                    {
                        model = value.to_string();
                    }
                }
                let blocks = event
                    .message
                    .as_ref()
                    .map(|m| normalize_blocks(&m.content))
                    .unwrap_or_default();
                let content = blocks
                    .iter()
                    .filter_map(|b| match b {
                        MessageBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                messages.push(DetailMessage {
                    uuid: event.uuid.clone(),
                    role: "assistant".to_string(),
                    timestamp: parse_timestamp(&event.timestamp),
                    content,
                    blocks,
                    children: Vec::new(),
                });
            }
            "progress" => {
                if let Some(parent) = event.parent_uuid.clone().filter(|p| !p.is_empty()) {
                    if let Ok(raw) = serde_json::from_str::<Value>(&line) {
                        progress_by_parent.entry(parent).or_default().push(raw);
                    }
                }
            }
            _ => {}
        }
    }

    // Second pass: attach collected progress children by message index.
    for message in &mut messages {
        if message.role == "assistant" {
            if let Some(children) = progress_by_parent.remove(&message.uuid) {
                message.children = children;
            }
        }
    }

    Ok(SessionDetail {
        session_id: session_id.to_string(),
        project_path: project_path.to_string(),
        cwd,
        git_branch,
        model,
        messages,
    })
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_lines(lines: &[Value]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn blocks_are_normalized_and_ordered() {
        let file = write_lines(&[json!({
            "type": "assistant",
            "uuid": "a1",
            "timestamp": "2026-03-01T10:00:00Z",
            "message": {"model": "claude-sonnet-4-5", "content": [
                {"type": "thinking", "thinking": "let me think"},
                {"type": "text", "text": "the answer"},
                {"type": "tool_use", "id": "t1", "name": "Read", "input": {"path": "/a"}},
                {"type": "exotic_block", "data": 1}
            ]}
        })]);
        let detail = build_detail(file.path(), "s1", "/proj").unwrap();
        assert_eq!(detail.model, "claude-sonnet-4-5");
        assert_eq!(detail.messages.len(), 1);
        let blocks = &detail.messages[0].blocks;
        assert_eq!(blocks.len(), 3, "unknown block types are dropped");
        assert_eq!(
            blocks[0],
            MessageBlock::Thinking {
                text: "let me think".to_string()
            }
        );
        assert_eq!(
            blocks[1],
            MessageBlock::Text {
                text: "the answer".to_string()
            }
        );
        assert!(matches!(blocks[2], MessageBlock::ToolUse { .. }));
        assert_eq!(detail.messages[0].content, "the answer");
    }

    #[test]
    fn progress_events_attach_to_their_parent() {
        let file = write_lines(&[
            json!({
                "type": "assistant",
                "uuid": "a1",
                "timestamp": "2026-03-01T10:00:00Z",
                "message": {"content": [{"type": "text", "text": "working"}]}
            }),
            json!({"type": "progress", "uuid": "p1", "parentUuid": "a1", "data": {"step": 1}}),
            json!({"type": "progress", "uuid": "p2", "parentUuid": "a1", "data": {"step": 2}}),
            json!({"type": "progress", "uuid": "p3", "parentUuid": "other", "data": {}}),
        ]);
        let detail = build_detail(file.path(), "s1", "/proj").unwrap();
        assert_eq!(detail.messages.len(), 1);
        let children = &detail.messages[0].children;
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["uuid"], "p1");
        assert_eq!(children[1]["uuid"], "p2");
    }

    #[test]
    fn user_and_assistant_interleave_in_order() {
        let file = write_lines(&[
            json!({"type": "user", "uuid": "u1", "timestamp": "2026-03-01T10:00:00Z",
                   "message": {"content": "question"}}),
            json!({"type": "assistant", "uuid": "a1", "timestamp": "2026-03-01T10:00:05Z",
                   "message": {"content": [{"type": "text", "text": "answer"}]}}),
        ]);
        let detail = build_detail(file.path(), "s1", "/proj").unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].role, "user");
        assert_eq!(detail.messages[0].content, "question");
        assert_eq!(detail.messages[1].role, "assistant");
    }
}
