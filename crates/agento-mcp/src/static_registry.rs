// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::path::Path;

use agento_claude::McpServerDescriptor;
use serde::Deserialize;
use tracing::warn;

/// Name → descriptor map for user-configured external MCP servers.
///
/// These are servers agento does not run itself (a globally installed
/// GitHub server, a remote HTTP endpoint, ...).  The capability composer
/// consults this registry before asking the integration registry.
#[derive(Debug, Clone, Default)]
pub struct StaticMcpRegistry {
    servers: BTreeMap<String, McpServerDescriptor>,
}

#[derive(Debug, Deserialize)]
struct StaticConfigFile {
    #[serde(rename = "mcpServers", default)]
    mcp_servers: BTreeMap<String, McpServerDescriptor>,
}

impl StaticMcpRegistry {
    pub fn new(servers: BTreeMap<String, McpServerDescriptor>) -> Self {
        Self { servers }
    }

    /// Load `mcp_servers.json` from the data directory.  Missing file means
    /// an empty registry; a malformed file is ignored with a warning rather
    /// than failing startup.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }
        match std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<StaticConfigFile>(&text).map_err(Into::into))
        {
            Ok(file) => Self::new(file.mcp_servers),
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable mcp_servers.json: {e}");
                Self::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&McpServerDescriptor> {
        self.servers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
