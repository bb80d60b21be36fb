// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers::{agents, chats, events, integrations, sessions, settings, tasks};
use crate::state::AppState;

/// Assemble the `/api` router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // ── Agents ────────────────────────────────────────────────────────────
        .route("/agents", get(agents::list_agents).post(agents::create_agent))
        .route(
            "/agents/:slug",
            get(agents::get_agent)
                .put(agents::update_agent)
                .delete(agents::delete_agent),
        )
        // ── Chats ─────────────────────────────────────────────────────────────
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .route(
            "/chats/:id",
            get(chats::get_chat).delete(chats::delete_chat),
        )
        .route("/chats/:id/messages", post(chats::post_message))
        .route("/chats/:id/input", post(chats::post_input))
        .route("/chats/:id/permission", post(chats::post_permission))
        // ── Claude session index ──────────────────────────────────────────────
        .route("/claude-sessions", get(sessions::list_sessions))
        .route("/claude-sessions/refresh", post(sessions::refresh_sessions))
        .route("/claude-sessions/:id", get(sessions::get_session))
        // ── Scheduled tasks ───────────────────────────────────────────────────
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/:id/pause", post(tasks::pause_task))
        .route("/tasks/:id/resume", post(tasks::resume_task))
        .route("/tasks/:id/history", get(tasks::task_history))
        .route("/job-history", get(tasks::job_history))
        // ── Integrations ──────────────────────────────────────────────────────
        .route(
            "/integrations",
            get(integrations::list_integrations).post(integrations::create_integration),
        )
        .route(
            "/integrations/:id",
            put(integrations::update_integration).delete(integrations::delete_integration),
        )
        // ── Settings & profiles ───────────────────────────────────────────────
        .route(
            "/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route(
            "/settings/profiles",
            get(settings::list_profiles).post(settings::create_profile),
        )
        .route(
            "/settings/profiles/:id",
            put(settings::update_profile).delete(settings::delete_profile),
        )
        .route(
            "/settings/profiles/:id/activate",
            post(settings::activate_profile),
        )
        // ── Events, notifications, health ─────────────────────────────────────
        .route("/events", get(events::event_stream))
        .route("/notifications", get(events::list_notifications))
        .route("/health", get(events::health));

    Router::new()
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
