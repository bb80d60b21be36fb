// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The agent runner: turns an optional [`agento_config::AgentConfig`] plus
//! per-run options into a configured Claude subprocess, and drains its event
//! stream into a final result.
//!
//! Three entry points share one configuration path
//! (see [`AgentRunner::run_to_completion`], [`AgentRunner::stream_events`],
//! [`AgentRunner::start_persistent_session`]):
//!
//! 1. interpolate the system prompt (`{{var}}` grammar, [`interpolate`]);
//! 2. resolve permission and thinking modes;
//! 3. compose capabilities into allow/disallow lists and MCP descriptors
//!    ([`compose_capabilities`]);
//! 4. wrap any caller permission handler with the allow-list filter
//!    ([`AllowlistPermissionHandler`]).

mod composer;
mod interpolate;
mod options;
mod runner;

pub use composer::{
    compose_capabilities, AllowlistPermissionHandler, ComposeContext, ComposedCapabilities,
    ALL_BUILT_IN_TOOLS, ASK_USER_QUESTION_TOOL,
};
pub use interpolate::interpolate;
pub use options::RunOptions;
pub use runner::{AgentRunner, RunResult};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing template variable: {name}")]
    MissingVariable { name: String },
    #[error("agent error: {0}")]
    AgentFailed(String),
    #[error("agent finished without returning a result")]
    NoResult,
    #[error(transparent)]
    Claude(#[from] agento_claude::ClaudeError),
}
