// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// How the Claude subprocess spends (or does not spend) thinking tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingMode {
    /// Let the model decide per request.
    #[default]
    Adaptive,
    /// Always enable extended thinking.
    Enabled,
    /// Never think.
    Disabled,
}

impl ThinkingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingMode::Adaptive => "adaptive",
            ThinkingMode::Enabled => "enabled",
            ThinkingMode::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for ThinkingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adaptive" | "" => Ok(ThinkingMode::Adaptive),
            "enabled" => Ok(ThinkingMode::Enabled),
            "disabled" => Ok(ThinkingMode::Disabled),
            other => Err(format!("unknown thinking mode {other:?}")),
        }
    }
}

/// Whether the subprocess asks before each tool use or runs unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Ask for every tool use; a caller-installed handler answers.
    #[default]
    Default,
    /// Skip all permission prompts.
    Bypass,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Bypass => "bypass",
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" | "" => Ok(PermissionMode::Default),
            "bypass" => Ok(PermissionMode::Bypass),
            other => Err(format!("unknown permission mode {other:?}")),
        }
    }
}

/// The three-bucket tool allow-list of an agent.
///
/// When every bucket is empty the agent runs in bare-chat mode and all
/// built-in tools are implicitly permitted.  As soon as any bucket is
/// populated the combined set becomes exhaustive: built-ins outside it are
/// explicitly disallowed so the model never sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Claude built-in tools (`Read`, `Bash`, ...), by exact name.
    #[serde(default)]
    pub built_in: BTreeSet<String>,
    /// Tools served by the local in-process MCP server.
    #[serde(default)]
    pub local: BTreeSet<String>,
    /// External MCP servers: server name → enabled tool names.
    #[serde(default)]
    pub mcp: BTreeMap<String, McpCapability>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpCapability {
    #[serde(default)]
    pub tools: BTreeSet<String>,
}

impl Capabilities {
    /// True when no bucket is populated (bare-chat mode).
    pub fn is_empty(&self) -> bool {
        self.built_in.is_empty() && self.local.is_empty() && self.mcp.is_empty()
    }
}

/// A named agent definition: model + prompt + capabilities.
///
/// The `slug` is the stable identity; renaming an agent never renumbers
/// references held by chats or scheduled tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub thinking_mode: ThinkingMode,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    /// System prompt template; `{{var}}` placeholders are interpolated at
    /// run time.
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl AgentConfig {
    /// Validate the record for creation/update.  Returns a human-readable
    /// message describing the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.slug.is_empty() {
            return Err("slug must not be empty".to_string());
        }
        if !is_valid_slug(&self.slug) {
            return Err(format!(
                "slug {:?} must be lowercase alphanumeric with hyphens",
                self.slug
            ));
        }
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(())
    }
}

/// URL-safe agent identifier: lowercase alphanumeric plus hyphens, no
/// leading/trailing/double hyphen.
pub fn is_valid_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return false;
    }
    slug.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Singleton user preferences, persisted by the store and edited over REST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(default)]
    pub default_model: String,
    #[serde(default)]
    pub default_working_directory: String,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

fn default_max_concurrent_tasks() -> usize {
    3
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            default_model: String::new(),
            default_working_directory: String::new(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

/// An external-service connection (calendar, email, ...).
///
/// `credentials` and `auth` are opaque provider-specific JSON; agento stores
/// and forwards them without interpreting their contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    /// Provider type, used to look up the registered starter.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub credentials: serde_json::Value,
    /// Tokens obtained after the provider's auth flow; `None` or JSON null
    /// means the integration is not yet authenticated.
    #[serde(default)]
    pub auth: Option<serde_json::Value>,
    /// Per-service enablement and tool selection.
    #[serde(default)]
    pub services: BTreeMap<String, IntegrationService>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationService {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Integration {
    /// An integration is authenticated when `auth` is present and not JSON
    /// null.
    pub fn is_authenticated(&self) -> bool {
        matches!(&self.auth, Some(v) if !v.is_null())
    }

    /// Names of tools enabled across all enabled services.
    pub fn enabled_tools(&self) -> BTreeSet<String> {
        self.services
            .values()
            .filter(|s| s.enabled)
            .flat_map(|s| s.tools.iter().cloned())
            .collect()
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
