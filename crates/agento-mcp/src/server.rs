// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! [`ToolSetServer`] — the rmcp [`ServerHandler`] implementation.
//!
//! Wraps an [`McpToolSet`] and implements the MCP `tools/list` and
//! `tools/call` protocol methods.  All other lifecycle methods (initialize,
//! shutdown, ping) come from the default rmcp implementations.
//!
//! The server is stateless per request; tool-set state, if any, lives behind
//! the [`McpToolSet`] implementation.

use std::sync::Arc;

use rmcp::{
    handler::server::ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, JsonObject, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool as McpTool,
    },
    service::{RequestContext, RoleServer},
    ErrorData as McpError,
};

use crate::toolset::{McpToolSet, ToolDef, ToolResponse};

/// MCP server over one [`McpToolSet`].
#[derive(Clone)]
pub struct ToolSetServer {
    toolset: Arc<dyn McpToolSet>,
}

impl ToolSetServer {
    pub fn new(toolset: Arc<dyn McpToolSet>) -> Self {
        Self { toolset }
    }
}

impl ServerHandler for ToolSetServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let toolset = self.toolset.clone();
        async move {
            let tools = toolset.tools().into_iter().map(def_to_mcp_tool).collect();
            Ok(ListToolsResult {
                tools,
                next_cursor: None,
                meta: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(|m| serde_json::Value::Object(m.into_iter().collect()))
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let response = self.toolset.call_tool(&request.name, args).await;
        Ok(response_to_call_result(response))
    }
}

/// Convert a [`ToolDef`] into an rmcp [`McpTool`] descriptor.  The stored
/// schema is passed through as the `input_schema`, wrapped in a minimal
/// object envelope when it is not already a JSON object.
fn def_to_mcp_tool(def: ToolDef) -> McpTool {
    let input_schema: JsonObject = match def.input_schema {
        serde_json::Value::Object(m) => m,
        other => {
            let mut m = serde_json::Map::new();
            m.insert(
                "type".to_string(),
                serde_json::Value::String("object".to_string()),
            );
            m.insert("value".to_string(), other);
            m
        }
    };
    McpTool::new(
        std::borrow::Cow::Owned(def.name),
        std::borrow::Cow::Owned(def.description),
        Arc::new(input_schema),
    )
}

fn response_to_call_result(response: ToolResponse) -> CallToolResult {
    let content = vec![Content::text(response.content)];
    if response.is_error {
        CallToolResult {
            content,
            is_error: Some(true),
            structured_content: None,
            meta: None,
        }
    } else {
        CallToolResult::success(content)
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
//
// The full list/call round-trip runs over in-memory pipes in
// tests/integration.rs; here we cover the pure conversion helpers and
// get_info.
