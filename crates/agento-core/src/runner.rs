// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tracing::debug;

use agento_claude::{
    ClaudeClient, ClaudeOptions, ClaudeSession, CliPermissionMode, EventPayload,
    McpServerDescriptor, PermissionHandler, Usage,
};
use agento_config::{AgentConfig, PermissionMode, ThinkingMode};
use agento_mcp::{IntegrationRegistry, StaticMcpRegistry};

use crate::composer::{compose_capabilities, AllowlistPermissionHandler, ComposeContext};
use crate::interpolate::interpolate;
use crate::options::RunOptions;
use crate::RunnerError;

/// Thinking budget used when an agent forces thinking on.
const ENABLED_THINKING_BUDGET: u32 = 16_000;

/// Terminal outcome of [`AgentRunner::run_to_completion`].
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    /// Final answer text from the last non-error result.
    pub text: String,
    /// Subprocess-assigned conversation id, usable for `--resume`.
    pub sdk_session_id: String,
    /// Token usage summed across every result event of the stream.
    pub usage: Usage,
    pub total_cost_usd: f64,
}

/// Builds subprocess configurations from agent definitions and drives runs.
///
/// One runner serves the whole process; it owns no per-run state.
pub struct AgentRunner {
    client: ClaudeClient,
    local_server: Option<McpServerDescriptor>,
    static_registry: Option<Arc<StaticMcpRegistry>>,
    integrations: Option<Arc<IntegrationRegistry>>,
    anthropic_api_key: Option<String>,
}

impl AgentRunner {
    pub fn new(client: ClaudeClient) -> Self {
        Self {
            client,
            local_server: None,
            static_registry: None,
            integrations: None,
            anthropic_api_key: None,
        }
    }

    /// Attach the app-wide local tools server descriptor.
    pub fn with_local_server(mut self, descriptor: McpServerDescriptor) -> Self {
        self.local_server = Some(descriptor);
        self
    }

    pub fn with_static_registry(mut self, registry: Arc<StaticMcpRegistry>) -> Self {
        self.static_registry = Some(registry);
        self
    }

    pub fn with_integrations(mut self, registry: Arc<IntegrationRegistry>) -> Self {
        self.integrations = Some(registry);
        self
    }

    /// Forward an explicit API key to the subprocess.  Without one the CLI
    /// uses its own stored credentials.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.anthropic_api_key = Some(key.into());
        self
    }

    /// Shared configuration path of all three entry points.
    async fn build(
        &self,
        agent: Option<&AgentConfig>,
        opts: &RunOptions,
    ) -> Result<(ClaudeOptions, Option<Arc<dyn PermissionHandler>>), RunnerError> {
        // 1. System prompt with {{var}} interpolation.  Bare chats send none.
        let append_system_prompt = match agent {
            Some(agent) if !agent.system_prompt.is_empty() => {
                Some(interpolate(&agent.system_prompt, &opts.variables)?)
            }
            _ => None,
        };

        // 2-3. Permission mode: a caller handler forces prompting so it can
        // intercept; otherwise the agent decides; bare chat bypasses.
        let permission_mode = if opts.permission_handler.is_some() {
            CliPermissionMode::Default
        } else if agent.map(|a| a.permission_mode) == Some(PermissionMode::Default) {
            CliPermissionMode::Default
        } else {
            CliPermissionMode::BypassPermissions
        };

        // 4. Thinking mode.
        let max_thinking_tokens = if opts.no_thinking {
            Some(0)
        } else {
            match agent.map(|a| a.thinking_mode) {
                Some(ThinkingMode::Enabled) => Some(ENABLED_THINKING_BUDGET),
                Some(ThinkingMode::Disabled) => Some(0),
                Some(ThinkingMode::Adaptive) | None => None,
            }
        };

        // 5. Tool and MCP assembly.
        let context = ComposeContext {
            local_server: self.local_server.clone(),
            static_registry: self.static_registry.clone(),
            integrations: self.integrations.clone(),
            cancel: opts.cancel.clone(),
        };
        let composed = compose_capabilities(agent, &context).await;

        // 6. Allow-list wrapper around the caller's handler.
        let handler = opts.permission_handler.clone().map(|inner| {
            if composed.allowed_tools.is_empty() {
                inner
            } else {
                Arc::new(AllowlistPermissionHandler::new(
                    inner,
                    composed.allowed_tools.clone(),
                )) as Arc<dyn PermissionHandler>
            }
        });

        let model = opts.model.clone().or_else(|| {
            agent.and_then(|a| (!a.model.is_empty()).then(|| a.model.clone()))
        });

        let mut env = Vec::new();
        if let Some(key) = &self.anthropic_api_key {
            env.push(("ANTHROPIC_API_KEY".to_string(), key.clone()));
        }

        Ok((
            ClaudeOptions {
                model,
                append_system_prompt,
                working_directory: opts.working_directory.clone(),
                resume_session_id: opts.resume_session_id.clone(),
                allowed_tools: composed.allowed_tools,
                disallowed_tools: composed.disallowed_tools,
                mcp_servers: composed.mcp_servers,
                strict_mcp: composed.strict_mcp,
                permission_mode,
                max_thinking_tokens,
                settings_path: opts.settings_file_path.clone(),
                env,
            },
            handler,
        ))
    }

    /// Spawn a subprocess, queue `first_message`, and hand the live session
    /// to the caller.  Input stays open: the caller sends follow-up turns
    /// and control responses, and ends input when done.
    pub async fn start_persistent_session(
        &self,
        agent: Option<&AgentConfig>,
        first_message: &str,
        opts: RunOptions,
    ) -> Result<ClaudeSession, RunnerError> {
        let (options, handler) = self.build(agent, &opts).await?;
        debug!(
            model = options.model.as_deref().unwrap_or("(default)"),
            tools = options.allowed_tools.len(),
            servers = options.mcp_servers.len(),
            "starting claude session"
        );
        let session = self.client.start(&options, handler).await?;
        session.send_user_message(first_message).await?;
        Ok(session)
    }

    /// One-shot streaming run: like a persistent session, but the caller
    /// only drains events.  End input (or close) after the final result to
    /// let the subprocess exit.
    pub async fn stream_events(
        &self,
        agent: Option<&AgentConfig>,
        question: &str,
        opts: RunOptions,
    ) -> Result<ClaudeSession, RunnerError> {
        self.start_persistent_session(agent, question, opts).await
    }

    /// Run one question to completion.
    ///
    /// The drain never returns early on a `result` event: it keeps reading
    /// until the event channel closes, which gives the subprocess time to
    /// flush its session transcript before our caller's scope unwinds.
    /// Multiple results accumulate token usage; the last non-error result
    /// wins.
    pub async fn run_to_completion(
        &self,
        agent: Option<&AgentConfig>,
        question: &str,
        opts: RunOptions,
    ) -> Result<RunResult, RunnerError> {
        let cancel = opts.cancel.clone();
        let mut session = self.start_persistent_session(agent, question, opts).await?;

        let mut usage = Usage::default();
        let mut total_cost_usd = 0.0;
        let mut last_success = None;
        let mut last_error: Option<String> = None;
        let mut cancelled = false;

        loop {
            tokio::select! {
                event = session.next_event() => {
                    let Some(event) = event else { break };
                    if let EventPayload::Result(result) = event.payload {
                        usage.add(&result.usage);
                        total_cost_usd += result.total_cost_usd;
                        if result.is_error {
                            last_error = Some(result.error_text());
                        } else {
                            last_success = Some(result);
                        }
                        // The turn is over; closing input lets the CLI exit.
                        // Keep draining until its stdout closes.
                        session.end_input().await;
                    }
                }
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    session.close();
                }
            }
        }

        if cancelled && last_success.is_none() {
            return Err(RunnerError::AgentFailed(
                "run cancelled before completion".to_string(),
            ));
        }
        if let Some(message) = last_error {
            return Err(RunnerError::AgentFailed(message));
        }
        let result = last_success.ok_or(RunnerError::NoResult)?;
        Ok(RunResult {
            text: result.result.unwrap_or_default(),
            sdk_session_id: result.session_id,
            usage,
            total_cost_usd,
        })
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
//
// The subprocess is stood in for by executable shell scripts that speak just
// enough of the stream-JSON protocol.  Every script reads one stdin line
// first so the runner's initial user message never hits a closed pipe.
