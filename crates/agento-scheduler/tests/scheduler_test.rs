// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! End-to-end scheduler tests against a fake Claude binary (a shell script
//! speaking just enough stream-JSON).

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use agento_claude::ClaudeClient;
use agento_config::ProfileStore;
use agento_core::AgentRunner;
use agento_scheduler::{EventBus, Scheduler};
use agento_store::{JobStatus, ScheduleType, ScheduledTask, Store, TaskStatus};

fn fake_claude(dir: &tempfile::TempDir) -> ClaudeClient {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.path().join("fake-claude");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "#!/bin/sh\nhead -n 1 >/dev/null\nprintf '%s\\n' '{}'\n",
        r#"{"type":"result","subtype":"success","is_error":false,"result":"task done","session_id":"sdk-task","usage":{"input_tokens":3,"output_tokens":4}}"#,
    )
    .unwrap();
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    ClaudeClient::with_binary(path.to_string_lossy().into_owned())
}

fn harness(dir: &tempfile::TempDir) -> (Arc<Store>, Scheduler, EventBus) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let runner = Arc::new(AgentRunner::new(fake_claude(dir)));
    let profiles = ProfileStore::new(dir.path().join("claude-home"));
    let bus = EventBus::new(16);
    let scheduler = Scheduler::new(store.clone(), runner, profiles, bus.clone(), 3);
    (store, scheduler, bus)
}

fn one_off_task(run_at: chrono::DateTime<Utc>) -> ScheduledTask {
    let now = Utc::now();
    ScheduledTask {
        id: Uuid::new_v4(),
        name: "once".to_string(),
        description: "single shot".to_string(),
        prompt: "Do the thing on {{current_date}}".to_string(),
        agent_slug: String::new(),
        working_directory: String::new(),
        model: String::new(),
        settings_profile_id: String::new(),
        timeout_minutes: 1,
        schedule_type: ScheduleType::OneOff,
        schedule_config: json!({"run_at": run_at.to_rfc3339()}),
        stop_after_count: None,
        stop_after_time: None,
        status: TaskStatus::Active,
        run_count: 0,
        last_run_at: None,
        last_run_status: None,
        next_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Poll until `predicate` is true or the timeout elapses.
async fn wait_for<F, Fut>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn one_off_task_runs_once_then_pauses() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, bus) = harness(&dir);
    let mut events = bus.subscribe();

    let task = one_off_task(Utc::now() + chrono::Duration::milliseconds(200));
    scheduler.create_task(&task).await.unwrap();

    let done = wait_for(
        || {
            let store = store.clone();
            let id = task.id;
            async move {
                store
                    .get_task(id)
                    .await
                    .map(|t| t.status == TaskStatus::Paused)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(10),
    )
    .await;
    assert!(done, "one-off task must end up paused");

    let after = store.get_task(task.id).await.unwrap();
    assert_eq!(after.run_count, 1);
    assert_eq!(after.last_run_status.as_deref(), Some("success"));
    assert!(after.next_run_at.is_none());

    // Exactly one history row, status success, linked to a chat whose
    // messages were persisted user-first.
    let history = store.list_job_history(Some(task.id), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, JobStatus::Success);
    assert_eq!(history[0].input_tokens, 3);
    assert!(history[0].prompt_preview.starts_with("Do the thing on"));

    let chat_id: Uuid = history[0].chat_session_id.parse().unwrap();
    let chat = store.get_chat(chat_id).await.unwrap();
    assert_eq!(chat.title, "[Task] once");
    assert_eq!(chat.sdk_session_id, "sdk-task");
    let messages = store.list_messages(chat_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role.as_str(), "user");
    assert_eq!(messages[1].content, "task done");

    // The lifecycle event is published and persisted.
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event must arrive")
        .unwrap();
    assert_eq!(event.event_type, "task_execution.finished");
    assert_eq!(event.payload.get("status").unwrap(), "Completed successfully");
    let notifications = store.list_notifications(10).await.unwrap();
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn met_stop_condition_pauses_without_executing() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, _bus) = harness(&dir);

    // The count limit is already reached when the tick fires, so the
    // pre-check must pause the task and skip execution entirely.
    let mut task = one_off_task(Utc::now() + chrono::Duration::milliseconds(200));
    task.stop_after_count = Some(1);
    task.run_count = 1;
    store.create_task(&task).await.unwrap();
    scheduler.resume_task(task.id).await.unwrap();

    let paused = wait_for(
        || {
            let store = store.clone();
            let id = task.id;
            async move {
                store
                    .get_task(id)
                    .await
                    .map(|t| t.status == TaskStatus::Paused)
                    .unwrap_or(false)
            }
        },
        Duration::from_secs(10),
    )
    .await;
    assert!(paused, "pre-check must pause the task");

    let after = store.get_task(task.id).await.unwrap();
    assert_eq!(after.run_count, 1, "run_count unchanged — nothing executed");
    let history = store.list_job_history(Some(task.id), 10).await.unwrap();
    assert!(history.is_empty(), "no execution may have happened");
}

#[tokio::test]
async fn pause_removes_the_schedule_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, scheduler, _bus) = harness(&dir);

    let task = one_off_task(Utc::now() + chrono::Duration::hours(1));
    scheduler.create_task(&task).await.unwrap();
    assert_eq!(scheduler.scheduled_count().await, 1);

    let paused = scheduler.pause_task(task.id).await.unwrap();
    assert_eq!(paused.status, TaskStatus::Paused);
    assert_eq!(scheduler.scheduled_count().await, 0);
    assert!(paused.next_run_at.is_none());

    let resumed = scheduler.resume_task(task.id).await.unwrap();
    assert_eq!(resumed.status, TaskStatus::Active);
    assert_eq!(scheduler.scheduled_count().await, 1);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn invalid_schedule_is_rejected_before_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, _bus) = harness(&dir);

    let mut task = one_off_task(Utc::now());
    task.schedule_type = ScheduleType::Cron;
    task.schedule_config = json!({"expression": "definitely not cron"});
    assert!(scheduler.create_task(&task).await.is_err());
    assert!(store.get_task(task.id).await.is_err(), "nothing persisted");
}

#[tokio::test]
async fn abandoned_running_rows_are_failed_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let (store, scheduler, _bus) = harness(&dir);

    let stale = agento_store::JobHistory {
        id: Uuid::new_v4(),
        task_id: Uuid::new_v4(),
        task_name: "ghost".to_string(),
        agent_slug: String::new(),
        status: JobStatus::Running,
        started_at: Utc::now(),
        finished_at: None,
        duration_ms: None,
        chat_session_id: String::new(),
        model: String::new(),
        prompt_preview: String::new(),
        error_message: None,
        input_tokens: 0,
        output_tokens: 0,
    };
    store.insert_job_running(&stale).await.unwrap();

    scheduler.start().await.unwrap();

    let row = store.get_job(stale.id).await.unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("abandoned at startup"));
    scheduler.shutdown().await;
}
