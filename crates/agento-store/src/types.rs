// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cumulative token counters, summed additively across turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenTotals {
    pub fn add(&mut self, other: &TokenTotals) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cache_creation_tokens += other.cache_creation_tokens;
        self.cache_read_tokens += other.cache_read_tokens;
    }
}

/// One persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    /// Empty for bare chats (no agent restrictions).
    #[serde(default)]
    pub agent_slug: String,
    /// Subprocess-assigned id used for `--resume`; empty until the first
    /// completed turn.
    #[serde(default)]
    pub sdk_session_id: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub settings_profile_id: String,
    #[serde(default)]
    pub tokens: TokenTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sentinel title assigned at creation; replaced by the first user message.
pub const NEW_CHAT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("unknown message role {other:?}")),
        }
    }
}

/// One ordered content block of an assistant message, kept for UI replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBlock {
    Thinking {
        text: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Append-only message row; ordered by insertion id within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub blocks: Vec<MessageBlock>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    OneOff,
    Interval,
    Cron,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::OneOff => "one_off",
            ScheduleType::Interval => "interval",
            ScheduleType::Cron => "cron",
        }
    }
}

impl std::str::FromStr for ScheduleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_off" => Ok(ScheduleType::OneOff),
            "interval" => Ok(ScheduleType::Interval),
            "cron" => Ok(ScheduleType::Cron),
            other => Err(format!("unknown schedule type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            other => Err(format!("unknown task status {other:?}")),
        }
    }
}

/// A persisted recurring (or one-off) agent job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Prompt template; same `{{var}}` grammar as agent system prompts.
    pub prompt: String,
    #[serde(default)]
    pub agent_slug: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub settings_profile_id: String,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    pub schedule_type: ScheduleType,
    /// Type-specific fields: `run_at` (one_off), `every_minutes` /
    /// `every_hours` / `every_days` + `at_time` (interval), `expression`
    /// (cron).
    #[serde(default)]
    pub schedule_config: serde_json::Value,
    #[serde(default)]
    pub stop_after_count: Option<u32>,
    #[serde(default)]
    pub stop_after_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<String>,
    #[serde(default)]
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn default_timeout_minutes() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status {other:?}")),
        }
    }
}

/// One scheduled-task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    pub task_name: String,
    #[serde(default)]
    pub agent_slug: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub chat_session_id: String,
    #[serde(default)]
    pub model: String,
    /// First 200 characters of the interpolated prompt.
    #[serde(default)]
    pub prompt_preview: String,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// One row of the notification log (persisted event-bus entries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub id: i64,
    pub event_type: String,
    pub payload: std::collections::BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Cached summary of one Claude CLI session transcript, keyed by
/// `(session_id, project_path)`.  `file_mtime` (unix seconds, UTC) is the
/// authoritative freshness witness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCacheRow {
    pub session_id: String,
    pub project_path: String,
    pub file_path: String,
    pub file_mtime: i64,
    #[serde(default)]
    pub preview: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub tokens: TokenTotals,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub git_branch: String,
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
