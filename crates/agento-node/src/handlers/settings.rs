// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use agento_config::UserSettings;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_settings().await?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<UserSettings>,
) -> Result<impl IntoResponse, ApiError> {
    if settings.max_concurrent_tasks == 0 {
        return Err(ApiError::Validation(
            "max_concurrent_tasks must be at least 1".to_string(),
        ));
    }
    state.store.put_settings(&settings).await?;
    Ok(Json(settings))
}

// ── Settings profiles ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateProfileBody {
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

pub async fn list_profiles(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.profiles.metadata()?.profiles))
}

pub async fn create_profile(
    State(state): State<AppState>,
    Json(body): Json<CreateProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.profiles.create(&body.name, &body.settings)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProfileBody>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .profiles
        .update(&id, body.name.as_deref(), body.settings.as_ref())?;
    Ok(Json(profile))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.profiles.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.profiles.activate(&id)?;
    Ok(Json(state.profiles.metadata()?.profiles))
}
