// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Capability composition: an agent's three-bucket capability set becomes
//! the subprocess's allow/disallow tool lists plus the MCP server
//! descriptors it may reach.
//!
//! The subprocess hides disallowed tools from the model entirely, so the
//! disallow list must enumerate every built-in outside the allow set —
//! an exhaustive allow-list, not a hint.  The second line of defense is
//! [`AllowlistPermissionHandler`], which denies anything that slips
//! through.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use agento_claude::{
    McpServerDescriptor, PermissionDecision, PermissionHandler, PermissionRequest,
};
use agento_config::AgentConfig;
use agento_mcp::{qualified_tool_name, IntegrationRegistry, StaticMcpRegistry, LOCAL_SERVER_NAME};

/// Every Claude built-in tool name, in canonical order.
pub const ALL_BUILT_IN_TOOLS: &[&str] = &[
    "Bash",
    "Edit",
    "Glob",
    "Grep",
    "Read",
    "Task",
    "WebFetch",
    "WebSearch",
    "Write",
];

/// Reserved pseudo-tool the subprocess uses to ask the user a question.
/// Always permitted, whatever the agent's capability set says.
pub const ASK_USER_QUESTION_TOOL: &str = "AskUserQuestion";

/// Output of [`compose_capabilities`].
#[derive(Debug, Clone, Default)]
pub struct ComposedCapabilities {
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub mcp_servers: BTreeMap<String, McpServerDescriptor>,
    /// True whenever any MCP server is attached: the subprocess must not
    /// pick up ambient user-account servers alongside ours.
    pub strict_mcp: bool,
}

/// Collaborators the composer draws descriptors from.
#[derive(Clone, Default)]
pub struct ComposeContext {
    /// Descriptor of the app-wide local tools server, when one is running.
    pub local_server: Option<McpServerDescriptor>,
    pub static_registry: Option<Arc<StaticMcpRegistry>>,
    pub integrations: Option<Arc<IntegrationRegistry>>,
    /// Scope for per-session filtered servers; cancelled when the run ends.
    pub cancel: CancellationToken,
}

/// Translate an agent's capability set into subprocess configuration.
///
/// No agent means bare chat: an empty allow list permits everything and no
/// servers are attached.
pub async fn compose_capabilities(
    agent: Option<&AgentConfig>,
    ctx: &ComposeContext,
) -> ComposedCapabilities {
    let Some(agent) = agent else {
        return ComposedCapabilities::default();
    };
    let caps = &agent.capabilities;

    // All three buckets empty: every built-in is implicitly permitted.
    if caps.is_empty() {
        return ComposedCapabilities {
            allowed_tools: ALL_BUILT_IN_TOOLS.iter().map(|t| t.to_string()).collect(),
            disallowed_tools: Vec::new(),
            mcp_servers: BTreeMap::new(),
            strict_mcp: false,
        };
    }

    // Built-ins: the explicit selection, or none when only local/mcp
    // buckets are populated.
    let selected: BTreeSet<&str> = caps
        .built_in
        .iter()
        .map(String::as_str)
        .filter(|name| ALL_BUILT_IN_TOOLS.contains(name))
        .collect();

    let mut allowed: Vec<String> = selected.iter().map(|t| t.to_string()).collect();
    let disallowed: Vec<String> = ALL_BUILT_IN_TOOLS
        .iter()
        .filter(|t| !selected.contains(*t))
        .map(|t| t.to_string())
        .collect();

    let mut mcp_servers = BTreeMap::new();

    // Local tools server, attached under its fixed name.
    if !caps.local.is_empty() {
        if let Some(descriptor) = &ctx.local_server {
            mcp_servers.insert(LOCAL_SERVER_NAME.to_string(), descriptor.clone());
            for tool in &caps.local {
                allowed.push(qualified_tool_name(LOCAL_SERVER_NAME, tool));
            }
        } else {
            debug!("agent requests local tools but no local server is running");
        }
    }

    // External servers: static registry first, then per-session filtered
    // integration servers.  Unresolvable names are skipped silently.
    for (server_name, capability) in &caps.mcp {
        let descriptor = match ctx
            .static_registry
            .as_ref()
            .and_then(|r| r.get(server_name).cloned())
        {
            Some(descriptor) => Some(descriptor),
            None => match &ctx.integrations {
                Some(registry) => {
                    registry
                        .start_filtered_server(
                            server_name,
                            capability.tools.clone(),
                            ctx.cancel.child_token(),
                        )
                        .await
                }
                None => None,
            },
        };
        let Some(descriptor) = descriptor else {
            debug!(server = %server_name, "mcp server not resolvable; skipping");
            continue;
        };
        mcp_servers.insert(server_name.clone(), descriptor);
        for tool in &capability.tools {
            allowed.push(qualified_tool_name(server_name, tool));
        }
    }

    let strict_mcp = !mcp_servers.is_empty();
    ComposedCapabilities {
        allowed_tools: allowed,
        disallowed_tools: disallowed,
        mcp_servers,
        strict_mcp,
    }
}

// ── Allow-list permission wrapper ─────────────────────────────────────────────

/// Defense-in-depth wrapper around a caller's [`PermissionHandler`].
///
/// The allow list already hides tools from the model; this wrapper denies
/// any call that slips through anyway.  `AskUserQuestion` always reaches
/// the inner handler.
pub struct AllowlistPermissionHandler {
    inner: Arc<dyn PermissionHandler>,
    allowed: BTreeSet<String>,
}

impl AllowlistPermissionHandler {
    /// `allowed` is the composed allow list; an empty list means
    /// unrestricted and the wrapper is pass-through.
    pub fn new(inner: Arc<dyn PermissionHandler>, allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner,
            allowed: allowed.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PermissionHandler for AllowlistPermissionHandler {
    async fn can_use_tool(&self, request: PermissionRequest) -> PermissionDecision {
        if request.tool_name != ASK_USER_QUESTION_TOOL
            && !self.allowed.is_empty()
            && !self.allowed.contains(&request.tool_name)
        {
            return PermissionDecision::deny(format!(
                "tool {} is not in this agent's allowed capabilities",
                request.tool_name
            ));
        }
        self.inner.can_use_tool(request).await
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
