// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// Descriptor of one tool: name, human description, JSON Schema for inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: schema,
        }
    }
}

/// Outcome of a tool call: text content plus an error flag, mirroring the
/// MCP `CallToolResult` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub content: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A set of tools servable over MCP.
///
/// Integration starters return these; the registry wraps them in
/// [`crate::ToolSetServer`] for serving.  Implementations must tolerate
/// concurrent calls.
#[async_trait]
pub trait McpToolSet: Send + Sync {
    fn tools(&self) -> Vec<ToolDef>;

    /// Execute a tool.  Unknown names return an error response, not a
    /// protocol failure, so the model sees a normal tool error.
    async fn call_tool(&self, name: &str, args: Value) -> ToolResponse;
}

/// View over another tool set exposing only the named tools.
///
/// Backs per-session filtered servers: the session's capability set chooses
/// the subset, everything else stays invisible to list *and* call.
pub struct FilteredToolSet {
    inner: Arc<dyn McpToolSet>,
    allowed: BTreeSet<String>,
}

impl FilteredToolSet {
    pub fn new(inner: Arc<dyn McpToolSet>, allowed: BTreeSet<String>) -> Self {
        Self { inner, allowed }
    }
}

#[async_trait]
impl McpToolSet for FilteredToolSet {
    fn tools(&self) -> Vec<ToolDef> {
        self.inner
            .tools()
            .into_iter()
            .filter(|t| self.allowed.contains(&t.name))
            .collect()
    }

    async fn call_tool(&self, name: &str, args: Value) -> ToolResponse {
        if !self.allowed.contains(name) {
            return ToolResponse::error(format!("unknown tool: {name}"));
        }
        self.inner.call_tool(name, args).await
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
