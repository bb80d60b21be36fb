// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! HTTP node — the REST + SSE surface of agento.
//!
//! All paths live under `/api`.  The load-bearing endpoint is
//! `POST /api/chats/{id}/messages`: it starts a Claude subprocess turn and
//! streams its events to the client as SSE, while
//! `POST /api/chats/{id}/input` and `POST /api/chats/{id}/permission`
//! funnel user responses into the blocked subprocess through the
//! live-session registry (see [`live`] and [`handlers::chats`]).
//!
//! Everything else is a thin CRUD layer over the store, the scheduler, the
//! integration registry, and the session index, with one error enum
//! ([`ApiError`]) mapping domain errors to HTTP statuses.

pub mod error;
pub mod handlers;
pub mod live;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;

use std::future::Future;

use tracing::info;

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "agento node listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
