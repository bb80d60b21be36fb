// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use agento_config::AgentConfig;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_agents(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_agents().await?))
}

pub async fn get_agent(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_agent(&slug).await?))
}

pub async fn create_agent(
    State(state): State<AppState>,
    Json(agent): Json<AgentConfig>,
) -> Result<impl IntoResponse, ApiError> {
    agent.validate().map_err(ApiError::Validation)?;
    state.store.create_agent(&agent).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn update_agent(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(mut agent): Json<AgentConfig>,
) -> Result<impl IntoResponse, ApiError> {
    // The path names the identity; the body cannot rename it.
    agent.slug = slug;
    agent.validate().map_err(ApiError::Validation)?;
    state.store.update_agent(&agent).await?;
    Ok(Json(agent))
}

pub async fn delete_agent(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.delete_agent(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}
