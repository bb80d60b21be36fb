// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use agento_claude::PermissionHandler;

/// Per-run options shared by all three runner entry points.
#[derive(Default)]
pub struct RunOptions {
    /// Template variables for `{{var}}` interpolation, on top of the
    /// built-in `current_date` / `current_time` fallbacks.
    pub variables: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
    /// Overrides the agent's model (and the bare-chat default).
    pub model: Option<String>,
    /// Claude settings file forwarded as `--settings`.
    pub settings_file_path: Option<PathBuf>,
    /// Resume an earlier subprocess conversation.
    pub resume_session_id: Option<String>,
    /// Force thinking off regardless of the agent's setting.
    pub no_thinking: bool,
    /// Interactive permission handler.  Installing one forces the
    /// subprocess into default permission mode so every tool use is
    /// routed through it.
    pub permission_handler: Option<Arc<dyn PermissionHandler>>,
    /// Lifetime scope of this run; per-session MCP servers stop when it
    /// fires.
    pub cancel: CancellationToken,
}

impl RunOptions {
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }
}
