// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// One stdout frame from the subprocess.
///
/// `raw` is the exact line as received; consumers that relay frames (the SSE
/// endpoint) must forward it untouched instead of re-serializing `payload`.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    /// The frame's `type` field (`assistant`, `result`, `system`, ...).
    pub event_type: String,
    /// The unmodified JSON line.
    pub raw: String,
    pub payload: EventPayload,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    Assistant(AssistantEvent),
    Result(ResultEvent),
    /// Any frame type agento does not interpret; passed through verbatim.
    Other,
}

/// Partial assistant output: interleaved thinking/text/tool-call blocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantEvent {
    #[serde(default)]
    pub message: AssistantMessage,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One content block of an assistant message, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Thinking {
        thinking: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Block types agento does not model (e.g. `tool_result` echoes).
    #[serde(other)]
    Unknown,
}

/// Terminal frame of one subprocess turn.
///
/// The subprocess may emit more than one result per stream (sub-task
/// results); consumers sum `usage` across results and keep the last
/// non-error result's text and session id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultEvent {
    #[serde(default)]
    pub subtype: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ResultEvent {
    /// The error text to surface for an `is_error` result: the result body,
    /// else the joined `errors`, else the subtype.
    pub fn error_text(&self) -> String {
        if let Some(text) = self.result.as_ref().filter(|t| !t.is_empty()) {
            return text.clone();
        }
        if !self.errors.is_empty() {
            return self.errors.join("; ");
        }
        format!("subtype={}", self.subtype)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_input_tokens += other.cache_creation_input_tokens;
        self.cache_read_input_tokens += other.cache_read_input_tokens;
    }
}

/// Decode one stdout line into a [`StreamEvent`].
///
/// Unparseable lines and frames without a `type` yield `None`; the caller
/// skips them (the CLI occasionally prints non-JSON diagnostics).
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    let event_type = value.get("type")?.as_str()?.to_string();

    let payload = match event_type.as_str() {
        "assistant" => serde_json::from_value::<AssistantEvent>(value)
            .map(EventPayload::Assistant)
            .unwrap_or(EventPayload::Other),
        "result" => serde_json::from_value::<ResultEvent>(value)
            .map(EventPayload::Result)
            .unwrap_or(EventPayload::Other),
        _ => EventPayload::Other,
    };

    Some(StreamEvent {
        event_type,
        raw: trimmed.to_string(),
        payload,
    })
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_assistant_preserves_block_order() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"thinking","thinking":"hmm"},
            {"type":"text","text":"hello"},
            {"type":"tool_use","id":"t1","name":"Read","input":{"path":"/a"}}
        ]},"session_id":"s1"}"#
            .replace('\n', "");
        let event = decode_line(&line).unwrap();
        assert_eq!(event.event_type, "assistant");
        let EventPayload::Assistant(a) = event.payload else {
            panic!("expected assistant payload");
        };
        assert_eq!(a.session_id, "s1");
        assert_eq!(a.message.content.len(), 3);
        assert!(matches!(a.message.content[0], ContentBlock::Thinking { .. }));
        assert!(matches!(a.message.content[1], ContentBlock::Text { .. }));
        assert!(matches!(a.message.content[2], ContentBlock::ToolUse { .. }));
    }

    #[test]
    fn decode_result_success() {
        let line = r#"{"type":"result","subtype":"success","is_error":false,
            "result":"done","session_id":"s2","total_cost_usd":0.012,
            "usage":{"input_tokens":10,"output_tokens":20,
                     "cache_creation_input_tokens":1,"cache_read_input_tokens":2}}"#
            .replace('\n', "");
        let event = decode_line(&line).unwrap();
        let EventPayload::Result(r) = event.payload else {
            panic!("expected result payload");
        };
        assert!(!r.is_error);
        assert_eq!(r.result.as_deref(), Some("done"));
        assert_eq!(r.session_id, "s2");
        assert_eq!(r.usage.input_tokens, 10);
        assert_eq!(r.usage.cache_read_input_tokens, 2);
    }

    #[test]
    fn unknown_event_types_pass_through() {
        let event = decode_line(r#"{"type":"system","subtype":"init","cwd":"/tmp"}"#).unwrap();
        assert_eq!(event.event_type, "system");
        assert!(matches!(event.payload, EventPayload::Other));
        assert!(event.raw.contains(r#""subtype":"init""#));
    }

    #[test]
    fn unknown_content_blocks_decode_without_error() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"server_tool_use","id":"x"}]}}"#;
        let event = decode_line(line).unwrap();
        let EventPayload::Assistant(a) = event.payload else {
            panic!("expected assistant payload");
        };
        assert_eq!(a.message.content, vec![ContentBlock::Unknown]);
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(decode_line("").is_none());
        assert!(decode_line("not json").is_none());
        assert!(decode_line(r#"{"no_type":1}"#).is_none());
    }

    // ── error_text fallback chain ─────────────────────────────────────────────

    #[test]
    fn error_text_prefers_result_body() {
        let r = ResultEvent {
            is_error: true,
            result: Some("boom".to_string()),
            errors: vec!["ignored".to_string()],
            subtype: "error".to_string(),
            ..ResultEvent::default()
        };
        assert_eq!(r.error_text(), "boom");
    }

    #[test]
    fn error_text_joins_errors_when_no_body() {
        let r = ResultEvent {
            is_error: true,
            errors: vec!["a".to_string(), "b".to_string()],
            subtype: "error".to_string(),
            ..ResultEvent::default()
        };
        assert_eq!(r.error_text(), "a; b");
    }

    #[test]
    fn error_text_falls_back_to_subtype() {
        let r = ResultEvent {
            is_error: true,
            subtype: "error_max_turns".to_string(),
            ..ResultEvent::default()
        };
        assert_eq!(r.error_text(), "subtype=error_max_turns");
    }

    #[test]
    fn usage_add_is_componentwise() {
        let mut total = Usage::default();
        total.add(&Usage {
            input_tokens: 1,
            output_tokens: 2,
            cache_creation_input_tokens: 3,
            cache_read_input_tokens: 4,
        });
        total.add(&Usage {
            input_tokens: 10,
            output_tokens: 20,
            cache_creation_input_tokens: 30,
            cache_read_input_tokens: 40,
        });
        assert_eq!(total.input_tokens, 11);
        assert_eq!(total.output_tokens, 22);
        assert_eq!(total.cache_creation_input_tokens, 33);
        assert_eq!(total.cache_read_input_tokens, 44);
    }
}
