// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Streaming summary of one JSONL transcript file.

use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use agento_store::TokenTotals;

/// Runes of the first user message kept as the session preview.
const PREVIEW_CHARS: usize = 120;

/// Raw transcript line, decoded permissively: any field may be absent.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "parentUuid", default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(rename = "gitBranch", default)]
    pub git_branch: Option<String>,
    #[serde(rename = "isSidechain", default)]
    pub is_sidechain: bool,
    #[serde(default)]
    pub message: Option<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawMessage {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub usage: Option<RawUsage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Summary fields derived from one transcript (file identity is added by
/// the scanner).
#[derive(Debug, Clone)]
pub(crate) struct SessionSummary {
    pub preview: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
    pub tokens: TokenTotals,
    pub model: String,
    pub cwd: String,
    pub git_branch: String,
}

/// Extract the textual content of a user message: either a bare string or
/// the concatenated `text` blocks of a content array.
pub(crate) fn extract_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

pub(crate) fn parse_timestamp(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Build a summary by streaming the file line by line.
///
/// Unparseable lines are skipped; `file-history-snapshot` events are
/// ignored entirely.  A file that yields no timestamp at all (empty or
/// snapshot-only) produces `None` and the session is dropped.
pub(crate) fn build_summary(path: &Path) -> std::io::Result<Option<SessionSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut start_time: Option<DateTime<Utc>> = None;
    let mut last_activity: Option<DateTime<Utc>> = None;
    let mut preview = String::new();
    let mut message_count = 0u64;
    let mut tokens = TokenTotals::default();
    let mut model = String::new();
    let mut cwd = String::new();
    let mut git_branch = String::new();

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

        if let Some(ts) = parse_timestamp(&event.timestamp) {
            if start_time.map_or(true, |s| ts < s) {
                start_time = Some(ts);
            }
            if last_activity.map_or(true, |l| ts > l) {
                last_activity = Some(ts);
            }
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
                message_count += 1;
                if preview.is_empty() {
                    if let Some(message) = &event.message {
                        let text = extract_text(&message.content);
                        preview = text.trim().chars().take(PREVIEW_CHARS).collect();
                    }
                }
            }
            "assistant" => {
                message_count += 1;
                if let Some(message) = &event.message {
                    if model.is_empty() {
                        if let Some(value) = message.model.as_deref().filter(|m| !m.is_empty()) {
                            model = value.to_string();
                        }
                    }
                    if let Some(usage) = &message.usage {
                        tokens.add(&TokenTotals {
                            input_tokens: usage.input_tokens,
                            output_tokens: usage.output_tokens,
                            cache_creation_tokens: usage.cache_creation_input_tokens,
                            cache_read_tokens: usage.cache_read_input_tokens,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    let Some(start_time) = start_time else {
        return Ok(None);
    };
    Ok(Some(SessionSummary {
        preview,
        start_time,
        last_activity: last_activity.unwrap_or(start_time),
        message_count,
        tokens,
        model,
        cwd,
        git_branch,
    }))
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
