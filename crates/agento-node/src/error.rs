// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

/// The single error type the HTTP layer maps to statuses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error")]
    Internal(anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Internal details stay in the log, not the response body.
            ApiError::Internal(source) => {
                error!("internal error: {source:#}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<agento_store::StoreError> for ApiError {
    fn from(err: agento_store::StoreError) -> Self {
        use agento_store::StoreError;
        match err {
            StoreError::NotFound(message) => ApiError::NotFound(message),
            StoreError::Conflict(message) => ApiError::Conflict(message),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<agento_scheduler::SchedulerError> for ApiError {
    fn from(err: agento_scheduler::SchedulerError) -> Self {
        use agento_scheduler::SchedulerError;
        match err {
            SchedulerError::InvalidSchedule(message) => ApiError::Validation(message),
            SchedulerError::Store(store) => store.into(),
        }
    }
}

impl From<agento_core::RunnerError> for ApiError {
    fn from(err: agento_core::RunnerError) -> Self {
        use agento_core::RunnerError;
        match err {
            RunnerError::MissingVariable { name } => {
                ApiError::Validation(format!("missing template variable: {name}"))
            }
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<agento_config::profiles::ProfileError> for ApiError {
    fn from(err: agento_config::profiles::ProfileError) -> Self {
        use agento_config::profiles::ProfileError;
        match err {
            ProfileError::NotFound(id) => ApiError::NotFound(format!("profile {id:?}")),
            ProfileError::EmptyName => ApiError::Validation("profile name must not be empty".to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<agento_sessions::IndexError> for ApiError {
    fn from(err: agento_sessions::IndexError) -> Self {
        ApiError::Internal(err.into())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_error_kinds() {
        assert_eq!(
            ApiError::Validation("x".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".to_string()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_map_through() {
        let err: ApiError = agento_store::StoreError::NotFound("agent \"x\"".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err: ApiError = agento_store::StoreError::Conflict("dup".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn missing_variable_is_a_validation_error() {
        let err: ApiError = agento_core::RunnerError::MissingVariable {
            name: "topic".to_string(),
        }
        .into();
        match err {
            ApiError::Validation(message) => assert!(message.contains("topic")),
            other => panic!("expected validation, got {other:?}"),
        }
    }
}
