// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Configuration for the agento service.
//!
//! Three layers, lowest to highest specificity:
//!
//! 1. [`Config`] — process environment (`DATA_DIR`, `PORT`, `ANTHROPIC_API_KEY`)
//!    plus derived filesystem paths.  Read once at startup.
//! 2. [`UserSettings`] — a singleton record persisted by the store and edited
//!    over the REST API (default model, default working directory, scheduler
//!    concurrency).
//! 3. [`profiles`] — named Claude settings bundles mirrored into the Claude
//!    CLI's own configuration directory.
//!
//! Domain records that are configuration rather than runtime state also live
//! here ([`AgentConfig`], [`Capabilities`], [`Integration`]) so that every
//! other crate can share them without depending on the persistence layer.

mod env;
pub mod profiles;
mod schema;

pub use env::{claude_home, default_data_dir, Config};
pub use profiles::{ProfileMetadata, ProfileStore, SettingsProfile};
pub use schema::{
    is_valid_slug, AgentConfig, Capabilities, Integration, IntegrationService, McpCapability,
    PermissionMode, ThinkingMode, UserSettings,
};
