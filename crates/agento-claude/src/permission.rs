// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::Serialize;

/// A `can_use_tool` control request from the subprocess.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// The caller's verdict on a [`PermissionRequest`].
///
/// Denying with a message is also the protocol convention for answering
/// `AskUserQuestion`: the message carries the user's reply back to the model.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow,
    Deny { message: String },
}

impl PermissionDecision {
    pub fn deny(message: impl Into<String>) -> Self {
        PermissionDecision::Deny {
            message: message.into(),
        }
    }

    /// The wire shape embedded in a `control_response` frame.
    pub(crate) fn to_wire(&self, original_input: &serde_json::Value) -> serde_json::Value {
        #[derive(Serialize)]
        #[serde(tag = "behavior", rename_all = "lowercase")]
        enum Wire<'a> {
            Allow {
                #[serde(rename = "updatedInput")]
                updated_input: &'a serde_json::Value,
            },
            Deny {
                message: &'a str,
            },
        }
        let wire = match self {
            PermissionDecision::Allow => Wire::Allow {
                updated_input: original_input,
            },
            PermissionDecision::Deny { message } => Wire::Deny { message },
        };
        serde_json::to_value(wire).unwrap_or(serde_json::Value::Null)
    }
}

/// Decides whether the subprocess may invoke a tool.
///
/// Runs on the subprocess reader task, so implementations may block on
/// channels (e.g. waiting for a user's answer) — the event stream continues
/// to be read concurrently.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    async fn can_use_tool(&self, request: PermissionRequest) -> PermissionDecision;
}

/// Handler that allows everything.  Used when no caller handler is
/// installed but the subprocess still runs in default permission mode.
pub struct AllowAll;

#[async_trait]
impl PermissionHandler for AllowAll {
    async fn can_use_tool(&self, _request: PermissionRequest) -> PermissionDecision {
        PermissionDecision::Allow
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
