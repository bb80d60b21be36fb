// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! One scheduler tick: stop-condition gate, then the execution path that
//! creates a chat, drives the agent runner, and records the audit trail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use agento_core::{interpolate, RunOptions};
use agento_store::{
    JobHistory, JobStatus, MessageBlock, MessageRole, ScheduleType, ScheduledTask, TaskStatus,
    TokenTotals,
};

use crate::events::AppEvent;
use crate::schedule::Schedule;
use crate::scheduler::Inner;

/// Characters of the interpolated prompt kept in `job_history`.
const PROMPT_PREVIEW_CHARS: usize = 200;

/// Execute one tick of `task_id`, bounded by the concurrency semaphore.
pub(crate) async fn run_tick(
    inner: &Arc<Inner>,
    task_id: Uuid,
    schedule: &Schedule,
    cancel: &CancellationToken,
) {
    let Ok(_permit) = inner.semaphore.acquire().await else {
        return;
    };

    // Re-fetch: the task may have been deleted or paused while we slept.
    let task = match inner.store.get_task(task_id).await {
        Ok(task) => task,
        Err(_) => {
            cancel.cancel();
            return;
        }
    };
    if task.status != TaskStatus::Active {
        cancel.cancel();
        return;
    }

    // Auto-pause pre-check: stop conditions already met skip the tick
    // entirely.
    if stop_conditions_met(&task, Utc::now()) {
        info!(task = %task.id, "stop condition reached; pausing task");
        pause(inner, task.id, cancel).await;
        return;
    }

    execute(inner, task, schedule, cancel).await;
}

fn stop_conditions_met(task: &ScheduledTask, now: DateTime<Utc>) -> bool {
    let count_reached = task
        .stop_after_count
        .is_some_and(|limit| task.run_count >= limit);
    let time_passed = task.stop_after_time.is_some_and(|at| now >= at);
    count_reached || time_passed
}

async fn pause(inner: &Arc<Inner>, id: Uuid, cancel: &CancellationToken) {
    if let Err(e) = inner.store.set_task_status(id, TaskStatus::Paused).await {
        warn!(task = %id, "could not pause task: {e}");
    }
    let _ = inner.store.set_task_next_run(id, None).await;
    inner.jobs.lock().await.remove(&id);
    cancel.cancel();
}

/// The §execution path: interpolate, create chat, record history, run,
/// persist, publish, update counters, auto-pause.
async fn execute(
    inner: &Arc<Inner>,
    task: ScheduledTask,
    schedule: &Schedule,
    cancel: &CancellationToken,
) {
    let started_at = Utc::now();
    let clock = Instant::now();

    // 1. Interpolate the prompt (built-in variables only for tasks).
    let prompt = match interpolate(&task.prompt, &HashMap::new()) {
        Ok(prompt) => prompt,
        Err(e) => {
            warn!(task = %task.id, "prompt interpolation failed: {e}");
            publish_failed(inner, &task, &e.to_string()).await;
            finish_task(inner, &task, started_at, "failed", schedule, cancel).await;
            return;
        }
    };

    // Resolve settings-derived defaults.
    let settings = inner.store.get_settings().await.unwrap_or_default();

    // 4. Agent config: explicit slug, or a synthesized bare config.
    let agent = if task.agent_slug.is_empty() {
        None
    } else {
        match inner.store.get_agent(&task.agent_slug).await {
            Ok(agent) => Some(agent),
            Err(e) => {
                warn!(task = %task.id, agent = %task.agent_slug, "agent lookup failed: {e}");
                publish_failed(inner, &task, &format!("agent {:?} not found", task.agent_slug))
                    .await;
                finish_task(inner, &task, started_at, "failed", schedule, cancel).await;
                return;
            }
        }
    };

    let model = if !task.model.is_empty() {
        task.model.clone()
    } else if let Some(agent) = agent.as_ref().filter(|a| !a.model.is_empty()) {
        agent.model.clone()
    } else {
        settings.default_model.clone()
    };

    let working_directory = if task.working_directory.is_empty() {
        settings.default_working_directory.clone()
    } else {
        task.working_directory.clone()
    };

    // 2. A fresh chat records this execution's conversation.
    let chat = match inner
        .store
        .create_chat(&task.agent_slug, &working_directory, &model, &task.settings_profile_id)
        .await
    {
        Ok(chat) => chat,
        Err(e) => {
            warn!(task = %task.id, "chat creation failed: {e}");
            publish_failed(inner, &task, &e.to_string()).await;
            finish_task(inner, &task, started_at, "failed", schedule, cancel).await;
            return;
        }
    };
    let _ = inner
        .store
        .update_chat_title(chat.id, &format!("[Task] {}", task.name))
        .await;

    // 3. The transient `running` history row.
    let history_id = Uuid::new_v4();
    let history = JobHistory {
        id: history_id,
        task_id: task.id,
        task_name: task.name.clone(),
        agent_slug: task.agent_slug.clone(),
        status: JobStatus::Running,
        started_at,
        finished_at: None,
        duration_ms: None,
        chat_session_id: chat.id.to_string(),
        model: model.clone(),
        prompt_preview: prompt.chars().take(PROMPT_PREVIEW_CHARS).collect(),
        error_message: None,
        input_tokens: 0,
        output_tokens: 0,
    };
    if let Err(e) = inner.store.insert_job_running(&history).await {
        warn!(task = %task.id, "could not insert job history: {e}");
    }

    // 5-7. Compose run options and run with the task's timeout.
    let run_cancel = CancellationToken::new();
    let opts = RunOptions {
        working_directory: (!working_directory.is_empty())
            .then(|| working_directory.clone().into()),
        model: (!model.is_empty()).then(|| model.clone()),
        settings_file_path: (!task.settings_profile_id.is_empty())
            .then(|| inner.profiles.profile_path(&task.settings_profile_id)),
        cancel: run_cancel.clone(),
        ..RunOptions::default()
    };

    let timeout = std::time::Duration::from_secs(task.timeout_minutes.max(1) * 60);
    let run = inner
        .runner
        .run_to_completion(agent.as_ref(), &prompt, opts);
    let result = match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => {
            run_cancel.cancel();
            Err(agento_core::RunnerError::AgentFailed(format!(
                "task timed out after {} minutes",
                task.timeout_minutes
            )))
        }
    };
    run_cancel.cancel();

    let duration_ms = clock.elapsed().as_millis() as i64;
    let finished_at = Utc::now();

    match result {
        Ok(run) => {
            // 8. Persist the conversation, then the audit trail.
            let tokens = TokenTotals {
                input_tokens: run.usage.input_tokens,
                output_tokens: run.usage.output_tokens,
                cache_creation_tokens: run.usage.cache_creation_input_tokens,
                cache_read_tokens: run.usage.cache_read_input_tokens,
            };
            let _ = inner
                .store
                .update_chat_after_turn(chat.id, &run.sdk_session_id, &tokens)
                .await;
            let _ = inner
                .store
                .append_message(chat.id, MessageRole::User, &prompt, &[])
                .await;
            let _ = inner
                .store
                .append_message(
                    chat.id,
                    MessageRole::Assistant,
                    &run.text,
                    &[MessageBlock::Text {
                        text: run.text.clone(),
                    }],
                )
                .await;
            if let Err(e) = inner
                .store
                .finish_job(
                    history_id,
                    JobStatus::Success,
                    finished_at,
                    duration_ms,
                    None,
                    run.usage.input_tokens,
                    run.usage.output_tokens,
                )
                .await
            {
                warn!(task = %task.id, "could not finalize job history: {e}");
            }

            let event = AppEvent::new("task_execution.finished")
                .with("task_id", task.id.to_string())
                .with("task_name", task.name.clone())
                .with("description", task.description.clone())
                .with("agent", task.agent_slug.clone())
                .with("status", "Completed successfully")
                .with("duration", format!("{duration_ms}ms"))
                .with("run_count", (task.run_count + 1).to_string())
                .with("model", model.clone())
                .with("chat_session_id", chat.id.to_string());
            publish(inner, event).await;
            finish_task(inner, &task, started_at, "success", schedule, cancel).await;
            info!(task = %task.id, duration_ms, "task execution finished");
        }
        Err(e) => {
            // 9. Record the failure; assistant content is not persisted.
            let message = e.to_string();
            if let Err(err) = inner
                .store
                .finish_job(
                    history_id,
                    JobStatus::Failed,
                    finished_at,
                    duration_ms,
                    Some(&message),
                    0,
                    0,
                )
                .await
            {
                warn!(task = %task.id, "could not finalize job history: {err}");
            }
            publish_failed(inner, &task, &message).await;
            finish_task(inner, &task, started_at, "failed", schedule, cancel).await;
            warn!(task = %task.id, "task execution failed: {message}");
        }
    }
}

/// 10. Update the task's counters and auto-pause when the schedule is
/// spent.
async fn finish_task(
    inner: &Arc<Inner>,
    task: &ScheduledTask,
    run_at: DateTime<Utc>,
    run_status: &str,
    schedule: &Schedule,
    cancel: &CancellationToken,
) {
    let new_count = task.run_count + 1;
    let spent = task.schedule_type == ScheduleType::OneOff
        || task.stop_after_count.is_some_and(|limit| new_count >= limit);

    let next_run_at = if spent {
        None
    } else {
        schedule.next_fire(Utc::now())
    };

    if let Err(e) = inner
        .store
        .record_task_run(task.id, run_at, run_status, next_run_at)
        .await
    {
        warn!(task = %task.id, "could not record task run: {e}");
    }

    if spent {
        pause(inner, task.id, cancel).await;
    }
}

async fn publish_failed(inner: &Arc<Inner>, task: &ScheduledTask, error: &str) {
    let event = AppEvent::new("task_execution.failed")
        .with("task_id", task.id.to_string())
        .with("task_name", task.name.clone())
        .with("description", task.description.clone())
        .with("agent", task.agent_slug.clone())
        .with("status", "Failed")
        .with("error", error.to_string())
        .with("run_count", (task.run_count + 1).to_string())
        .with("model", task.model.clone());
    publish(inner, event).await;
}

async fn publish(inner: &Arc<Inner>, event: AppEvent) {
    if let Err(e) = inner
        .store
        .append_notification(&event.event_type, &event.payload)
        .await
    {
        warn!("could not persist notification: {e}");
    }
    inner.bus.publish(event);
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agento_store::ScheduledTask;

    fn task_with(
        run_count: u32,
        stop_after_count: Option<u32>,
        stop_after_time: Option<DateTime<Utc>>,
    ) -> ScheduledTask {
        let now = Utc::now();
        ScheduledTask {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            description: String::new(),
            prompt: "p".to_string(),
            agent_slug: String::new(),
            working_directory: String::new(),
            model: String::new(),
            settings_profile_id: String::new(),
            timeout_minutes: 30,
            schedule_type: ScheduleType::Interval,
            schedule_config: serde_json::json!({"every_minutes": 5}),
            stop_after_count,
            stop_after_time,
            status: TaskStatus::Active,
            run_count,
            last_run_at: None,
            last_run_status: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stop_condition_by_count() {
        let now = Utc::now();
        assert!(!stop_conditions_met(&task_with(2, Some(3), None), now));
        assert!(stop_conditions_met(&task_with(3, Some(3), None), now));
        assert!(stop_conditions_met(&task_with(4, Some(3), None), now));
    }

    #[test]
    fn stop_condition_by_time() {
        let now = Utc::now();
        let past = now - chrono::Duration::minutes(1);
        let future = now + chrono::Duration::minutes(1);
        assert!(stop_conditions_met(&task_with(0, None, Some(past)), now));
        assert!(!stop_conditions_met(&task_with(0, None, Some(future)), now));
    }

    #[test]
    fn no_stop_conditions_never_met() {
        assert!(!stop_conditions_met(&task_with(1000, None, None), Utc::now()));
    }
}
