// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! SQLite persistence façade.
//!
//! One [`Store`] owns one open connection (SQLite is a single-writer
//! database; serializing through one connection avoids `SQLITE_BUSY` under
//! concurrent handlers).  All public methods are `async` and take the
//! connection mutex for the duration of one statement or transaction.
//!
//! The schema is managed by forward-only migrations (see [`migrations`]):
//! each migration runs in its own transaction and records its version in
//! `schema_migrations`.  Editing an existing migration is never allowed —
//! a column rename is a new migration that copies and drops.

mod agents;
mod chats;
mod db;
mod integrations;
mod legacy;
mod migrations;
mod notifications;
mod session_cache;
mod settings;
mod tasks;
mod types;


pub use chats::derive_title;
pub use db::Store;
pub use legacy::{migrate_legacy_layout, LegacyReport};
pub use types::{
    ChatMessage, ChatSession, JobHistory, JobStatus, MessageBlock, MessageRole, NotificationEntry,
    ScheduleType, ScheduledTask, SessionCacheRow, TaskStatus, TokenTotals, NEW_CHAT_TITLE,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("migration {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
