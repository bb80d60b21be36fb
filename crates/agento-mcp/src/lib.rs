// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! In-process MCP servers.
//!
//! agento exposes tools to the Claude subprocess through three kinds of MCP
//! servers, all sharing one serving path (loopback streamable HTTP, lifetime
//! bound to a cancellation token):
//!
//! - the **local tools** server: a fixed tool set provided by the embedding
//!   application, attached under the name [`LOCAL_SERVER_NAME`];
//! - **integration** servers: one per enabled+authenticated external
//!   integration, built by an injected [`IntegrationStarter`] keyed on the
//!   integration's `type`;
//! - **per-session filtered** servers: narrow views over an integration's
//!   tool surface, created on demand by the capability composer and torn
//!   down with the requesting session.
//!
//! A separate [`StaticMcpRegistry`] maps user-configured server names to
//! descriptors for external servers agento does not run itself.

mod http;
mod integrations;
mod server;
mod static_registry;
mod toolset;

pub use http::{serve_toolset, ServerBinding};
pub use integrations::{IntegrationRegistry, IntegrationSource, IntegrationStarter};
pub use server::ToolSetServer;
pub use static_registry::StaticMcpRegistry;
pub use toolset::{FilteredToolSet, McpToolSet, ToolDef, ToolResponse};

/// Fixed server name under which the local tool set is attached.
pub const LOCAL_SERVER_NAME: &str = "agento_local";

/// Qualified tool name as the subprocess sees it: `mcp__<server>__<tool>`.
pub fn qualified_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{server}__{tool}")
}
