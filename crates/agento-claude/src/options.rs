// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How an MCP server is reachable from the subprocess.
///
/// Serializes to the exact shape the CLI expects inside `--mcp-config`, so a
/// descriptor map can be embedded without conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerDescriptor {
    /// Streamable-HTTP server at `url`.
    Http { url: String },
    /// Legacy SSE server at `url`.
    Sse { url: String },
    /// Child process the CLI spawns itself.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

/// Permission prompting mode forwarded to `--permission-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CliPermissionMode {
    /// The CLI asks before each tool use (a control request per call).
    #[default]
    Default,
    /// No prompts; every tool runs unattended.
    BypassPermissions,
}

impl CliPermissionMode {
    fn flag_value(&self) -> &'static str {
        match self {
            CliPermissionMode::Default => "default",
            CliPermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

/// Everything needed to spawn one Claude subprocess.
#[derive(Debug, Clone, Default)]
pub struct ClaudeOptions {
    pub model: Option<String>,
    /// Appended after the CLI's own system prompt.
    pub append_system_prompt: Option<String>,
    pub working_directory: Option<PathBuf>,
    /// Resume an existing conversation by its CLI-assigned session id.
    pub resume_session_id: Option<String>,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub mcp_servers: BTreeMap<String, McpServerDescriptor>,
    /// Restrict the subprocess to exactly `mcp_servers`, ignoring servers
    /// from the user's own Claude configuration.
    pub strict_mcp: bool,
    pub permission_mode: CliPermissionMode,
    /// Thinking budget: `None` lets the model decide, `Some(0)` disables
    /// thinking, any other value forces that budget.  Mapped to the
    /// `MAX_THINKING_TOKENS` environment variable (the CLI has no flag).
    pub max_thinking_tokens: Option<u32>,
    /// Settings file passed as `--settings`.
    pub settings_path: Option<PathBuf>,
    /// Extra environment for the subprocess (e.g. `ANTHROPIC_API_KEY`).
    pub env: Vec<(String, String)>,
}

impl ClaudeOptions {
    /// Assemble the CLI argument vector.
    ///
    /// Deterministic for a given option set: map-backed inputs iterate in
    /// key order and list-backed inputs keep caller order.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--print".into(),
            "--input-format".into(),
            "stream-json".into(),
            "--output-format".into(),
            "stream-json".into(),
            "--verbose".into(),
        ];

        if let Some(model) = &self.model {
            args.push("--model".into());
            args.push(model.into());
        }
        if let Some(prompt) = &self.append_system_prompt {
            args.push("--append-system-prompt".into());
            args.push(prompt.into());
        }
        if let Some(id) = &self.resume_session_id {
            args.push("--resume".into());
            args.push(id.into());
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".into());
            args.push(self.allowed_tools.join(",").into());
        }
        if !self.disallowed_tools.is_empty() {
            args.push("--disallowedTools".into());
            args.push(self.disallowed_tools.join(",").into());
        }
        if !self.mcp_servers.is_empty() {
            args.push("--mcp-config".into());
            args.push(self.mcp_config_json().into());
            if self.strict_mcp {
                args.push("--strict-mcp-config".into());
            }
        }
        args.push("--permission-mode".into());
        args.push(self.permission_mode.flag_value().into());
        if let Some(path) = &self.settings_path {
            args.push("--settings".into());
            args.push(path.into());
        }

        args
    }

    /// The `--mcp-config` payload: `{"mcpServers": {name: descriptor}}`.
    pub fn mcp_config_json(&self) -> String {
        #[derive(Serialize)]
        struct McpConfig<'a> {
            #[serde(rename = "mcpServers")]
            mcp_servers: &'a BTreeMap<String, McpServerDescriptor>,
        }
        serde_json::to_string(&McpConfig {
            mcp_servers: &self.mcp_servers,
        })
        .unwrap_or_else(|_| r#"{"mcpServers":{}}"#.to_string())
    }

    /// Environment variables to set on the subprocess.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = self.env.clone();
        if let Some(budget) = self.max_thinking_tokens {
            vars.push(("MAX_THINKING_TOKENS".to_string(), budget.to_string()));
        }
        vars
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
