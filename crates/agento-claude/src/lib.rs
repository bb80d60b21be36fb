// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Client for the Claude Code CLI.
//!
//! The CLI is spawned in bidirectional stream-JSON mode: user turns and
//! control responses are written to its stdin, one JSON object per line, and
//! events come back on stdout the same way.  Three frame types are decoded
//! ([`AssistantEvent`], [`ResultEvent`], and the internal `control_request`);
//! everything else is forwarded verbatim so downstream consumers can relay
//! frames without re-serialization.
//!
//! Permission prompts (`can_use_tool` control requests) are answered by a
//! caller-installed [`PermissionHandler`].  Without a handler every tool is
//! allowed, which matches running the CLI with prompts disabled.

mod client;
mod events;
mod options;
mod permission;

pub use client::{ClaudeClient, ClaudeSession};
pub use events::{
    AssistantEvent, AssistantMessage, ContentBlock, EventPayload, ResultEvent, StreamEvent, Usage,
};
pub use options::{ClaudeOptions, CliPermissionMode, McpServerDescriptor};
pub use permission::{PermissionDecision, PermissionHandler, PermissionRequest};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaudeError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("subprocess stdin closed")]
    StdinClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
