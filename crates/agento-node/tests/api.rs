// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! API-level tests driving the real router with `tower::ServiceExt`.
//! The Claude subprocess is a shell-script stand-in, so the SSE turn test
//! exercises the full path: spawn → stream → finalize → persist.

use std::io::Write;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use agento_claude::ClaudeClient;
use agento_config::ProfileStore;
use agento_core::AgentRunner;
use agento_mcp::IntegrationRegistry;
use agento_node::{build_router, live::LiveRegistry, state::StoreIntegrationSource, AppState};
use agento_scheduler::{EventBus, Scheduler};
use agento_sessions::SessionIndex;
use agento_store::Store;

/// Write an executable shell script that plays the Claude CLI.  Every
/// script starts by consuming the initial user message so the runner's
/// first write never hits a closed pipe.
fn fake_claude_script(dir: &tempfile::TempDir, body: &str) -> ClaudeClient {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join("fake-claude");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "#!/bin/sh\nhead -n 1 >/dev/null\n{body}").unwrap();
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    ClaudeClient::with_binary(path.to_string_lossy().into_owned())
}

fn fake_claude(dir: &tempfile::TempDir) -> ClaudeClient {
    let body = format!(
        "printf '%s\\n' '{}'\nprintf '%s\\n' '{}'\n",
        r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"the answer"}]},"session_id":"sdk-7"}"#,
        r#"{"type":"result","subtype":"success","is_error":false,"result":"the answer","session_id":"sdk-7","usage":{"input_tokens":9,"output_tokens":13}}"#,
    );
    fake_claude_script(dir, &body)
}

/// A CLI stand-in that asks `AskUserQuestion`, waits for the control
/// response on stdin, then finishes the turn.
fn questioning_claude(dir: &tempfile::TempDir) -> ClaudeClient {
    let body = format!(
        "printf '%s\\n' '{}'\nhead -n 1 >/dev/null\nprintf '%s\\n' '{}'\n",
        r#"{"type":"control_request","request_id":"q1","request":{"subtype":"can_use_tool","tool_name":"AskUserQuestion","input":{"questions":[{"question":"Proceed?"}]}}}"#,
        r#"{"type":"result","subtype":"success","is_error":false,"result":"resolved","session_id":"sdk-q","usage":{"input_tokens":2,"output_tokens":3}}"#,
    );
    fake_claude_script(dir, &body)
}

fn test_state(dir: &tempfile::TempDir) -> AppState {
    test_state_with(dir, fake_claude(dir))
}

fn test_state_with(dir: &tempfile::TempDir, client: ClaudeClient) -> AppState {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let runner = Arc::new(AgentRunner::new(client));
    let profiles = ProfileStore::new(dir.path().join("claude-home"));
    let bus = EventBus::new(16);
    let scheduler = Scheduler::new(
        store.clone(),
        runner.clone(),
        profiles.clone(),
        bus.clone(),
        3,
    );
    let sessions = Arc::new(SessionIndex::new(
        store.clone(),
        dir.path().join("projects"),
    ));
    let integrations = Arc::new(IntegrationRegistry::new(
        Arc::new(StoreIntegrationSource(store.clone())),
        Default::default(),
    ));
    AppState {
        store,
        runner,
        scheduler,
        sessions,
        integrations,
        profiles,
        live: Arc::new(LiveRegistry::new()),
        bus,
    }
}

async fn send(
    state: &AppState,
    method: &str,
    path: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    };
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

// ── Health ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (status, body) = send(&state, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ── Agents ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_crud_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let agent = serde_json::json!({
        "slug": "researcher",
        "name": "Researcher",
        "system_prompt": "You research {{topic}}.",
        "capabilities": {"built_in": ["Read", "Grep"]}
    });

    let (status, _) = send(&state, "POST", "/api/agents", Some(agent.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&state, "GET", "/api/agents/researcher", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Researcher");

    // Duplicate slug conflicts.
    let (status, _) = send(&state, "POST", "/api/agents", Some(agent)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Invalid slug is a validation failure.
    let bad = serde_json::json!({"slug": "Bad Slug", "name": "X"});
    let (status, _) = send(&state, "POST", "/api/agents", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Updating a missing agent is 404.
    let update = serde_json::json!({"slug": "ignored", "name": "Ghost"});
    let (status, _) = send(&state, "PUT", "/api/agents/ghost", Some(update)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, "DELETE", "/api/agents/researcher", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&state, "GET", "/api/agents/researcher", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Chats ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_creation_validates_agent_reference() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let (status, _) = send(
        &state,
        "POST",
        "/api/chats",
        Some(serde_json::json!({"agent_slug": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&state, "POST", "/api/chats", Some(serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "New Chat");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (_, chat) = send(&state, "POST", "/api/chats", Some(serde_json::json!({}))).await;
    let id = chat["id"].as_str().unwrap();

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/chats/{id}/messages"),
        Some(serde_json::json!({"content": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn input_without_live_session_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (_, chat) = send(&state, "POST", "/api/chats", Some(serde_json::json!({}))).await;
    let id = chat["id"].as_str().unwrap();

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/chats/{id}/input"),
        Some(serde_json::json!({"answer": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/chats/{id}/permission"),
        Some(serde_json::json!({"allow": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

/// Start a streaming turn in a background task and wait until its live
/// session is registered.  The join handle yields the full SSE body.
async fn start_live_turn(state: &AppState) -> (uuid::Uuid, tokio::task::JoinHandle<String>) {
    let (_, chat) = send(state, "POST", "/api/chats", Some(serde_json::json!({}))).await;
    let id: uuid::Uuid = chat["id"].as_str().unwrap().parse().unwrap();

    let state_bg = state.clone();
    let handle = tokio::spawn(async move {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/chats/{id}/messages"))
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({"content": "Ask me something"}).to_string(),
            ))
            .unwrap();
        let response = build_router(state_bg).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    });

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !state.live.contains(id) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "live session never appeared"
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    (id, handle)
}

#[tokio::test]
async fn permission_decision_reaches_a_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state_with(&dir, questioning_claude(&dir));
    let (id, handle) = start_live_turn(&state).await;

    // A live session must accept the decision (204, not 409); the buffered
    // channel holds it until the handler parks on the rendezvous.
    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/chats/{id}/permission"),
        Some(serde_json::json!({"allow": true})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let body = handle.await.unwrap();
    assert!(body.contains("event: user_input_required"), "body: {body}");
    assert!(body.contains("Proceed?"));
    assert!(body.contains("resolved"), "turn completes after the approval");
    assert!(!state.live.contains(id));
}

#[tokio::test]
async fn user_answer_reaches_a_live_session() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state_with(&dir, questioning_claude(&dir));
    let (id, handle) = start_live_turn(&state).await;

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/chats/{id}/input"),
        Some(serde_json::json!({"answer": "forty-two"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let body = handle.await.unwrap();
    assert!(body.contains("event: user_input_required"), "body: {body}");
    assert!(body.contains("resolved"), "turn completes after the answer");
    assert!(!state.live.contains(id));
}

#[tokio::test]
async fn streaming_turn_passes_events_through_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);
    let (_, chat) = send(&state, "POST", "/api/chats", Some(serde_json::json!({}))).await;
    let id = chat["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/chats/{id}/messages"))
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"content": "What is the answer?"}).to_string(),
        ))
        .unwrap();
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8_lossy(&bytes);

    // Verbatim passthrough: the event types and the raw frames appear.
    assert!(body.contains("event: assistant"), "body: {body}");
    assert!(body.contains("event: result"));
    assert!(body.contains(r#""thinking":"hmm""#), "raw frame preserved");

    // Done phase committed the turn.
    let (_, detail) = send(&state, "GET", &format!("/api/chats/{id}"), None).await;
    let session = &detail["session"];
    assert_eq!(session["title"], "What is the answer?");
    assert_eq!(session["sdk_session_id"], "sdk-7");
    assert_eq!(session["tokens"]["input_tokens"], 9);
    let messages = detail["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What is the answer?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "the answer");
    let blocks = messages[1]["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["type"], "thinking");
    assert_eq!(blocks[1]["type"], "text");

    // The live session is gone once the stream completed.
    assert!(!state.live.contains(id.parse().unwrap()));
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn task_validation_and_pause_resume() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    // Invalid cron expression fails validation.
    let bad = serde_json::json!({
        "name": "t", "prompt": "p",
        "schedule_type": "cron",
        "schedule_config": {"expression": "not a cron"}
    });
    let (status, _) = send(&state, "POST", "/api/tasks", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown agent reference is 404.
    let orphan = serde_json::json!({
        "name": "t", "prompt": "p", "agent_slug": "ghost",
        "schedule_type": "interval",
        "schedule_config": {"every_hours": 1}
    });
    let (status, _) = send(&state, "POST", "/api/tasks", Some(orphan)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let task = serde_json::json!({
        "name": "hourly digest", "prompt": "Summarize things",
        "schedule_type": "interval",
        "schedule_config": {"every_hours": 1}
    });
    let (status, created) = send(&state, "POST", "/api/tasks", Some(task)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();
    assert_eq!(created["status"], "active");
    assert!(created["next_run_at"].is_string());

    let (status, paused) = send(&state, "POST", &format!("/api/tasks/{id}/pause"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");
    assert!(paused["next_run_at"].is_null());

    let (status, resumed) = send(&state, "POST", &format!("/api/tasks/{id}/resume"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["status"], "active");

    let (status, history) = send(&state, "GET", &format!("/api/tasks/{id}/history"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(history.as_array().unwrap().is_empty());

    // History of an unknown task is 404, not an empty list.
    let ghost = uuid::Uuid::new_v4();
    let (status, _) = send(&state, "GET", &format!("/api/tasks/{ghost}/history"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, "DELETE", &format!("/api/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ── Settings & profiles ───────────────────────────────────────────────────────

#[tokio::test]
async fn settings_roundtrip_and_validation() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let (status, defaults) = send(&state, "GET", "/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["max_concurrent_tasks"], 3);

    let (status, _) = send(
        &state,
        "PUT",
        "/api/settings",
        Some(serde_json::json!({
            "default_model": "claude-opus-4-5",
            "default_working_directory": "/work",
            "max_concurrent_tasks": 5
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, updated) = send(&state, "GET", "/api/settings", None).await;
    assert_eq!(updated["default_model"], "claude-opus-4-5");

    let (status, _) = send(
        &state,
        "PUT",
        "/api/settings",
        Some(serde_json::json!({"max_concurrent_tasks": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn profile_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let (status, profile) = send(
        &state,
        "POST",
        "/api/settings/profiles",
        Some(serde_json::json!({"name": "work", "settings": {"model": "opus"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(profile["is_default"], true);
    let id = profile["id"].as_str().unwrap();

    let (status, listed) = send(&state, "GET", "/api/settings/profiles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/settings/profiles/{id}/activate"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &state,
        "DELETE",
        &format!("/api/settings/profiles/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

// ── Session index ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_endpoints_on_an_empty_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let (status, rows) = send(&state, "GET", "/api/claude-sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(rows.as_array().unwrap().is_empty());

    let (status, _) = send(&state, "POST", "/api/claude-sessions/refresh", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = send(&state, "GET", "/api/claude-sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Integrations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn integrations_crud_redacts_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir);

    let (status, created) = send(
        &state,
        "POST",
        "/api/integrations",
        Some(serde_json::json!({
            "type": "google_calendar",
            "enabled": true,
            "credentials": {"client_secret": "super-secret"},
            "auth": {"refresh_token": "tok"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["authenticated"], true);
    assert!(created.get("credentials").is_none(), "credentials redacted");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, listed) = send(&state, "GET", "/api/integrations", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].get("credentials").is_none());

    let (status, _) = send(&state, "DELETE", &format!("/api/integrations/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &state,
        "PUT",
        &format!("/api/integrations/{id}"),
        Some(serde_json::json!({"type": "google_calendar"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
