// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut rows = state.sessions.list().await?;

    if let Some(project) = query.project.as_deref().filter(|p| !p.is_empty()) {
        rows.retain(|row| row.project_path == project);
    }
    if let Some(needle) = query.q.as_deref().filter(|q| !q.is_empty()) {
        let needle = needle.to_lowercase();
        rows.retain(|row| {
            row.preview.to_lowercase().contains(&needle)
                || row.session_id.to_lowercase().contains(&needle)
        });
    }
    Ok(Json(rows))
}

pub async fn refresh_sessions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.invalidate().await?;
    state.sessions.warm_in_background();
    Ok(StatusCode::ACCEPTED)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.sessions.detail(&id).await? {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!("session {id:?}"))),
    }
}
