// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use agento_store::{ScheduleType, ScheduledTask, TaskStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub agent_slug: String,
    #[serde(default)]
    pub working_directory: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub settings_profile_id: String,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub schedule_config: serde_json::Value,
    #[serde(default)]
    pub stop_after_count: Option<u32>,
    #[serde(default)]
    pub stop_after_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

fn default_timeout_minutes() -> u64 {
    30
}

impl TaskBody {
    async fn validate(&self, state: &AppState) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("task name must not be empty".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(ApiError::Validation("task prompt must not be empty".to_string()));
        }
        if !self.agent_slug.is_empty() {
            state.store.get_agent(&self.agent_slug).await?;
        }
        Ok(())
    }

    fn into_task(self, id: Uuid, run_count: u32) -> ScheduledTask {
        let now = Utc::now();
        ScheduledTask {
            id,
            name: self.name,
            description: self.description,
            prompt: self.prompt,
            agent_slug: self.agent_slug,
            working_directory: self.working_directory,
            model: self.model,
            settings_profile_id: self.settings_profile_id,
            timeout_minutes: self.timeout_minutes,
            schedule_type: self.schedule_type,
            schedule_config: self.schedule_config,
            stop_after_count: self.stop_after_count,
            stop_after_time: self.stop_after_time,
            status: self.status.unwrap_or(TaskStatus::Active),
            run_count,
            last_run_at: None,
            last_run_status: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub async fn list_tasks(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_tasks().await?))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_task(id).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<TaskBody>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate(&state).await?;
    let task = body.into_task(Uuid::new_v4(), 0);
    state.scheduler.create_task(&task).await?;
    let stored = state.store.get_task(task.id).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TaskBody>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate(&state).await?;
    let existing = state.store.get_task(id).await?;
    let requested_status = body.status;
    let mut task = body.into_task(id, existing.run_count);
    task.created_at = existing.created_at;
    // Omitting the status keeps the current one; flipping it goes through
    // the same reflect path as pause/resume.
    task.status = requested_status.unwrap_or(existing.status);
    state.scheduler.update_task(&task).await?;
    Ok(Json(state.store.get_task(id).await?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.scheduler.delete_task(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.pause_task(id).await?))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.scheduler.resume_task(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    50
}

pub async fn task_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    // 404 for unknown tasks rather than an empty history.
    state.store.get_task(id).await?;
    Ok(Json(
        state.store.list_job_history(Some(id), query.limit).await?,
    ))
}

pub async fn job_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_job_history(None, query.limit).await?))
}
