// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Subprocess lifecycle: spawn, pump stdout into an event channel, answer
//! control requests, and tear down.
//!
//! # Ownership
//!
//! ```text
//! ClaudeSession
//!     │ stdin   Mutex<Option<ChildStdin>>   (user turns + control responses)
//!     │ child   Mutex<Option<Child>>        (kill on close; reaped by reader)
//!     ▼
//! reader task ──► mpsc::Sender<StreamEvent> ──► caller
//!     │
//!     └── per control_request: PermissionHandler → control_response on stdin
//! ```
//!
//! The event channel closes only when the subprocess closes its stdout, so a
//! caller that drains to channel-close has also waited for the CLI to flush
//! its session transcript.

use std::process::Stdio;
use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::events::{decode_line, StreamEvent};
use crate::options::ClaudeOptions;
use crate::permission::{PermissionHandler, PermissionRequest};
use crate::ClaudeError;

/// Default event channel capacity; large enough that a slow SSE client does
/// not stall the subprocess on a typical turn.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Factory for Claude subprocesses.
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    binary: String,
}

impl Default for ClaudeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeClient {
    /// Use the binary named by `CLAUDE_BINARY`, falling back to `claude` on
    /// the PATH.
    pub fn new() -> Self {
        let binary = std::env::var("CLAUDE_BINARY").unwrap_or_else(|_| "claude".to_string());
        Self { binary }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Spawn a subprocess and return the live session handle.
    ///
    /// The caller sends turns with [`ClaudeSession::send_user_message`] and
    /// reads events from [`ClaudeSession::next_event`] until `None`.
    pub async fn start(
        &self,
        options: &ClaudeOptions,
        handler: Option<Arc<dyn PermissionHandler>>,
    ) -> Result<ClaudeSession, ClaudeError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(options.to_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in options.env_vars() {
            cmd.env(key, value);
        }
        if let Some(dir) = &options.working_directory {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ClaudeError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let stdin = child.stdin.take().expect("stdin was piped");

        debug!(binary = %self.binary, pid = ?child.id(), "claude subprocess spawned");

        let stdin = Arc::new(Mutex::new(Some(stdin)));
        let child = Arc::new(std::sync::Mutex::new(Some(child)));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Drain stderr so the subprocess never blocks on a full pipe.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "claude::stderr", "{line}");
            }
        });

        tokio::spawn(reader_loop(
            stdout,
            event_tx,
            stdin.clone(),
            child.clone(),
            handler,
        ));

        Ok(ClaudeSession {
            stdin,
            child,
            events: event_rx,
        })
    }
}

/// Handle to one running subprocess.
pub struct ClaudeSession {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    child: Arc<std::sync::Mutex<Option<Child>>>,
    events: mpsc::Receiver<StreamEvent>,
}

impl ClaudeSession {
    /// Queue a user turn.  Fails once input has been ended or the process is
    /// gone.
    pub async fn send_user_message(&self, text: &str) -> Result<(), ClaudeError> {
        let frame = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": text}],
            },
        });
        self.write_frame(&frame).await
    }

    /// Next event, or `None` once the subprocess has exited and its stdout is
    /// fully drained.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Close stdin.  In stream-JSON mode this tells the CLI to exit after
    /// finishing the current turn; call it after the final `result` has been
    /// observed, then keep draining events until `None`.
    pub async fn end_input(&self) {
        let mut guard = self.stdin.lock().await;
        if let Some(mut stdin) = guard.take() {
            let _ = stdin.shutdown().await;
        }
    }

    /// Kill the subprocess.  Safe to call on any exit path; errors are
    /// logged, never propagated.
    pub fn close(&self) {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(child) = guard.as_mut() {
            if let Err(e) = child.start_kill() {
                debug!("claude subprocess kill failed (already exited?): {e}");
            }
        }
    }

    async fn write_frame(&self, frame: &serde_json::Value) -> Result<(), ClaudeError> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ClaudeError::StdinClosed)?;
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        Ok(())
    }
}

// ── Reader loop ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ControlRequestFrame {
    request_id: String,
    request: ControlRequestBody,
}

#[derive(Debug, Deserialize)]
struct ControlRequestBody {
    #[serde(default)]
    subtype: String,
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    input: serde_json::Value,
}

/// Pump stdout lines into the event channel until EOF, answering control
/// requests inline, then reap the child.
async fn reader_loop(
    stdout: tokio::process::ChildStdout,
    event_tx: mpsc::Sender<StreamEvent>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    child: Arc<std::sync::Mutex<Option<Child>>>,
    handler: Option<Arc<dyn PermissionHandler>>,
) {
    let mut lines = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(frame) = parse_control_request(trimmed) {
            // The handler may block on user input for a long time; answer on
            // a separate task so the event stream keeps flowing.
            let handler = handler.clone();
            let stdin = stdin.clone();
            tokio::spawn(async move {
                answer_control_request(frame, handler, stdin).await;
            });
            continue;
        }

        match decode_line(trimmed) {
            Some(event) => {
                // A dropped receiver means nobody is listening any more; keep
                // reading so the subprocess can exit cleanly instead of
                // blocking on a full pipe.
                let _ = event_tx.send(event).await;
            }
            None => debug!(target: "claude::stdout", "skipping non-event line: {trimmed}"),
        }
    }

    // EOF: take the child out of the shared slot (so `close` becomes a
    // no-op) and reap it outside any lock.
    let taken = {
        let mut guard = child.lock().unwrap_or_else(|e| e.into_inner());
        guard.take()
    };
    if let Some(mut child) = taken {
        match child.wait().await {
            Ok(status) => debug!(%status, "claude subprocess exited"),
            Err(e) => warn!("failed to reap claude subprocess: {e}"),
        }
    }
}

fn parse_control_request(line: &str) -> Option<ControlRequestFrame> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    if value.get("type")?.as_str()? != "control_request" {
        return None;
    }
    serde_json::from_value(value).ok()
}

async fn answer_control_request(
    frame: ControlRequestFrame,
    handler: Option<Arc<dyn PermissionHandler>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
) {
    if frame.request.subtype != "can_use_tool" {
        debug!(
            subtype = %frame.request.subtype,
            "ignoring unsupported control request"
        );
        return;
    }

    let decision = match handler {
        Some(handler) => {
            handler
                .can_use_tool(PermissionRequest {
                    tool_name: frame.request.tool_name.clone(),
                    input: frame.request.input.clone(),
                })
                .await
        }
        None => crate::PermissionDecision::Allow,
    };

    let response = serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": frame.request_id,
            "response": decision.to_wire(&frame.request.input),
        },
    });

    let mut line = match serde_json::to_vec(&response) {
        Ok(line) => line,
        Err(e) => {
            warn!("failed to serialize control response: {e}");
            return;
        }
    };
    line.push(b'\n');

    let mut guard = stdin.lock().await;
    match guard.as_mut() {
        Some(stdin) => {
            if let Err(e) = stdin.write_all(&line).await {
                warn!("failed to write control response: {e}");
            } else {
                let _ = stdin.flush().await;
            }
        }
        None => warn!(
            tool = %frame.request.tool_name,
            "control request arrived after input was closed"
        ),
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
//
// These use stand-in binaries (`cat`, `sh`) instead of a real Claude CLI:
// `cat` echoes frames back for round-trip checks, and a small shell script
// emits canned assistant/result frames.
