// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Chat endpoints, including the SSE streaming turn.
//!
//! # Streaming concurrency
//!
//! Exactly one task owns the SSE response: the generator below.  It
//! multiplexes three sources with `select!`:
//!
//! - the subprocess event channel (frames forwarded verbatim),
//! - the question channel fed by the permission handler
//!   (`user_input_required` synthetic events),
//! - client disconnect (the generator is dropped, the guard cancels and
//!   kills the subprocess, nothing is committed).
//!
//! The permission handler runs on the subprocess reader task.  For
//! `AskUserQuestion` it pushes the question payload onto the question
//! channel (non-blocking, drop-on-full) and then parks on the two
//! rendezvous channels until `POST /chats/{id}/input` delivers the answer,
//! `POST /chats/{id}/permission` delivers an approve/deny decision, or the
//! turn is cancelled.  Returning the answer as a *deny* message is the
//! protocol convention that routes the reply to the model.
//!
//! Persistence happens exclusively in the done phase after the event
//! channel closes — never mid-stream.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use agento_claude::{
    ContentBlock, EventPayload, PermissionDecision, PermissionHandler, PermissionRequest,
};
use agento_core::{RunOptions, ASK_USER_QUESTION_TOOL};
use agento_store::{derive_title, ChatSession, MessageBlock, MessageRole, TokenTotals, NEW_CHAT_TITLE};

use crate::error::ApiError;
use crate::live::{LiveRegistry, LiveSession};
use crate::state::AppState;

/// Capacity of the question channel.  Only one `AskUserQuestion` is in
/// flight per turn in practice; the headroom absorbs protocol surprises
/// and the send drops on overflow rather than blocking the reader.
const QUESTION_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Deserialize)]
pub struct CreateChatBody {
    #[serde(default)]
    pub agent_slug: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub settings_profile_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct InputBody {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct PermissionBody {
    pub allow: bool,
}

// ── CRUD ──────────────────────────────────────────────────────────────────────

pub async fn list_chats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_chats().await?))
}

pub async fn create_chat(
    State(state): State<AppState>,
    Json(body): Json<CreateChatBody>,
) -> Result<impl IntoResponse, ApiError> {
    if !body.agent_slug.is_empty() {
        // 404 when the referenced agent does not exist.
        state.store.get_agent(&body.agent_slug).await?;
    }
    let chat = state
        .store
        .create_chat(
            &body.agent_slug,
            &body.working_directory,
            &body.model,
            &body.settings_profile_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.store.get_chat(id).await?;
    let messages = state.store.list_messages(id).await?;
    Ok(Json(serde_json::json!({
        "session": session,
        "messages": messages,
    })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_chat(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Rendezvous endpoints ──────────────────────────────────────────────────────

pub async fn post_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<InputBody>,
) -> Result<impl IntoResponse, ApiError> {
    if state.live.send_input(id, body.answer) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict(format!(
            "chat {id} has no session awaiting input"
        )))
    }
}

pub async fn post_permission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PermissionBody>,
) -> Result<impl IntoResponse, ApiError> {
    if state.live.send_permission(id, body.allow) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict(format!(
            "chat {id} has no session awaiting a permission decision"
        )))
    }
}

// ── Permission handler ────────────────────────────────────────────────────────

/// Bridges the subprocess's `can_use_tool` control requests to the HTTP
/// rendezvous channels.  Non-question tools are auto-allowed here — the
/// allow-list wrapper installed by the runner is the capability guard.
///
/// Both rendezvous receivers live here for the whole turn, so the
/// `/input` and `/permission` endpoints always find an open channel while
/// the session is live.
struct ChatPermissionHandler {
    question_tx: mpsc::Sender<serde_json::Value>,
    input_rx: Mutex<mpsc::Receiver<String>>,
    permission_rx: Mutex<mpsc::Receiver<bool>>,
    cancel: CancellationToken,
}

#[async_trait]
impl PermissionHandler for ChatPermissionHandler {
    async fn can_use_tool(&self, request: PermissionRequest) -> PermissionDecision {
        if request.tool_name != ASK_USER_QUESTION_TOOL {
            return PermissionDecision::Allow;
        }

        // Surface the question to the SSE stream; drop-on-full keeps the
        // reader task from ever blocking here.
        if self.question_tx.try_send(request.input.clone()).is_err() {
            warn!("question channel full; dropping user_input_required event");
        }

        // Park until the user answers, rules on the request, or the turn
        // dies.  A textual answer is delivered as a deny message (the
        // protocol convention); a bare approval lets the tool run as-is.
        let mut input_rx = self.input_rx.lock().await;
        let mut permission_rx = self.permission_rx.lock().await;
        tokio::select! {
            answer = input_rx.recv() => match answer {
                Some(answer) => PermissionDecision::deny(answer),
                None => PermissionDecision::deny("input channel closed"),
            },
            decision = permission_rx.recv() => match decision {
                Some(true) => PermissionDecision::Allow,
                Some(false) => PermissionDecision::deny("request denied by user"),
                None => PermissionDecision::deny("permission channel closed"),
            },
            _ = self.cancel.cancelled() => PermissionDecision::deny("request cancelled"),
        }
    }
}

// ── Streaming turn ────────────────────────────────────────────────────────────

/// Removes the live-session entry and cancels the turn when the stream
/// ends for any reason, including client disconnect mid-await.
struct StreamGuard {
    live: Arc<LiveRegistry>,
    chat_id: Uuid,
    cancel: CancellationToken,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.live.remove(self.chat_id);
    }
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::Validation("message content must not be empty".to_string()));
    }
    let chat = state.store.get_chat(id).await?;
    let agent = if chat.agent_slug.is_empty() {
        None
    } else {
        Some(state.store.get_agent(&chat.agent_slug).await?)
    };

    let (question_tx, question_rx) = mpsc::channel(QUESTION_CHANNEL_CAPACITY);
    let (input_tx, input_rx) = mpsc::channel(QUESTION_CHANNEL_CAPACITY);
    let (permission_tx, permission_rx) = mpsc::channel(QUESTION_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    state
        .live
        .insert(
            chat.id,
            LiveSession {
                input_tx,
                permission_tx,
                cancel: cancel.clone(),
            },
        )
        .map_err(|_| ApiError::Conflict(format!("chat {id} already has an active stream")))?;

    let handler = Arc::new(ChatPermissionHandler {
        question_tx,
        input_rx: Mutex::new(input_rx),
        permission_rx: Mutex::new(permission_rx),
        cancel: cancel.clone(),
    });

    let opts = RunOptions {
        working_directory: (!chat.working_directory.is_empty())
            .then(|| chat.working_directory.clone().into()),
        model: (!chat.model.is_empty()).then(|| chat.model.clone()),
        settings_file_path: (!chat.settings_profile_id.is_empty())
            .then(|| state.profiles.profile_path(&chat.settings_profile_id)),
        resume_session_id: (!chat.sdk_session_id.is_empty())
            .then(|| chat.sdk_session_id.clone()),
        permission_handler: Some(handler as Arc<dyn PermissionHandler>),
        cancel: cancel.clone(),
        ..RunOptions::default()
    };

    let session = match state
        .runner
        .start_persistent_session(agent.as_ref(), &body.content, opts)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            state.live.remove(chat.id);
            return Err(e.into());
        }
    };

    let guard = StreamGuard {
        live: state.live.clone(),
        chat_id: chat.id,
        cancel,
    };

    let stream = turn_stream(state, chat, body.content, session, question_rx, guard);
    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
        .into_response())
}

/// The single owner of the SSE response.
fn turn_stream(
    state: AppState,
    chat: ChatSession,
    user_content: String,
    mut session: agento_claude::ClaudeSession,
    mut question_rx: mpsc::Receiver<serde_json::Value>,
    guard: StreamGuard,
) -> impl tokio_stream::Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        // Moved into the generator so a client disconnect drops it.
        let _guard = guard;

        let mut blocks: Vec<MessageBlock> = Vec::new();
        let mut tokens = TokenTotals::default();
        let mut final_text = String::new();
        let mut sdk_session_id = String::new();
        let mut saw_success = false;
        let mut error_text: Option<String> = None;

        // Multiplexed without yielding inside select arms (async_stream
        // cannot transform a yield nested in another macro).
        enum Step {
            Subprocess(Option<agento_claude::StreamEvent>),
            Question(serde_json::Value),
        }

        loop {
            let step = tokio::select! {
                event = session.next_event() => Step::Subprocess(event),
                Some(question) = question_rx.recv() => Step::Question(question),
            };

            let event = match step {
                Step::Subprocess(None) => break,
                Step::Subprocess(Some(event)) => event,
                Step::Question(question) => {
                    yield Ok(Event::default()
                        .event("user_input_required")
                        .data(question.to_string()));
                    continue;
                }
            };

            match &event.payload {
                EventPayload::Assistant(assistant) => {
                    for block in &assistant.message.content {
                        match block {
                            ContentBlock::Thinking { thinking } => {
                                blocks.push(MessageBlock::Thinking { text: thinking.clone() });
                            }
                            ContentBlock::Text { text } => {
                                blocks.push(MessageBlock::Text { text: text.clone() });
                            }
                            ContentBlock::ToolUse { id, name, input } => {
                                blocks.push(MessageBlock::ToolUse {
                                    id: id.clone(),
                                    name: name.clone(),
                                    input: input.clone(),
                                });
                            }
                            ContentBlock::Unknown => {}
                        }
                    }
                }
                EventPayload::Result(result) => {
                    tokens.add(&TokenTotals {
                        input_tokens: result.usage.input_tokens,
                        output_tokens: result.usage.output_tokens,
                        cache_creation_tokens: result.usage.cache_creation_input_tokens,
                        cache_read_tokens: result.usage.cache_read_input_tokens,
                    });
                    if result.is_error {
                        error_text = Some(result.error_text());
                    } else {
                        saw_success = true;
                        final_text = result.result.clone().unwrap_or_default();
                        if !result.session_id.is_empty() {
                            sdk_session_id = result.session_id.clone();
                        }
                    }
                    // Turn finished: let the subprocess wind down while we
                    // keep draining its remaining events.
                    session.end_input().await;
                }
                EventPayload::Other => {}
            }
            // Raw passthrough: the exact bytes the subprocess emitted.
            yield Ok(Event::default().event(&event.event_type).data(&event.raw));
        }

        // ── Done phase: all persistence happens here ──────────────────────────
        if saw_success {
            if chat.title == NEW_CHAT_TITLE {
                let title = derive_title(&user_content);
                if let Err(e) = state.store.update_chat_title(chat.id, &title).await {
                    warn!(chat = %chat.id, "title update failed: {e}");
                }
            }
            let commit = async {
                state
                    .store
                    .append_message(chat.id, MessageRole::User, &user_content, &[])
                    .await?;
                state
                    .store
                    .append_message(chat.id, MessageRole::Assistant, &final_text, &blocks)
                    .await?;
                state
                    .store
                    .update_chat_after_turn(chat.id, &sdk_session_id, &tokens)
                    .await
            };
            if let Err(e) = commit.await {
                warn!(chat = %chat.id, "turn commit failed: {e}");
                yield Ok(Event::default()
                    .event("error")
                    .data(r#"{"error":"failed to persist turn"}"#));
            }
            debug!(chat = %chat.id, blocks = blocks.len(), "turn committed");
        } else if let Some(message) = error_text {
            // The subprocess already streamed its own error event; nothing
            // is committed for a failed turn.
            debug!(chat = %chat.id, "turn failed: {message}");
        } else {
            yield Ok(Event::default()
                .event("error")
                .data(r#"{"error":"agent finished without returning a result"}"#));
        }
    }
}
