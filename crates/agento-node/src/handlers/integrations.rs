// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use agento_config::{Integration, IntegrationService};

use crate::error::ApiError;
use crate::state::AppState;

/// Listing view: credentials and auth stay server-side; clients only see
/// whether authentication happened.
#[derive(Debug, Serialize)]
pub struct IntegrationView {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub authenticated: bool,
    pub services: std::collections::BTreeMap<String, IntegrationService>,
}

impl From<Integration> for IntegrationView {
    fn from(integration: Integration) -> Self {
        Self {
            id: integration.id.clone(),
            kind: integration.kind.clone(),
            enabled: integration.enabled,
            authenticated: integration.is_authenticated(),
            services: integration.services,
        }
    }
}

pub async fn list_integrations(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let integrations = state.store.list_integrations().await?;
    let views: Vec<IntegrationView> = integrations.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

pub async fn create_integration(
    State(state): State<AppState>,
    Json(mut integration): Json<Integration>,
) -> Result<impl IntoResponse, ApiError> {
    if integration.kind.trim().is_empty() {
        return Err(ApiError::Validation("integration type must not be empty".to_string()));
    }
    if integration.id.is_empty() {
        integration.id = Uuid::new_v4().to_string();
    }
    state.store.upsert_integration(&integration).await?;
    reload(&state, &integration.id).await;
    Ok((StatusCode::CREATED, Json(IntegrationView::from(integration))))
}

pub async fn update_integration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut integration): Json<Integration>,
) -> Result<impl IntoResponse, ApiError> {
    // Updating a record that does not exist is a 404, not an upsert.
    state.store.get_integration(&id).await?;
    integration.id = id;
    state.store.upsert_integration(&integration).await?;
    reload(&state, &integration.id).await;
    Ok(Json(IntegrationView::from(integration)))
}

pub async fn delete_integration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Stop the running server before the record disappears.
    state.integrations.stop(&id).await;
    state.store.delete_integration(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload(state: &AppState, id: &str) {
    if let Err(e) = state.integrations.reload(id).await {
        // Config was saved; a broken provider start must not fail the API
        // call.  The registry will retry on the next reload.
        warn!(id, "integration reload failed: {e}");
    }
}
