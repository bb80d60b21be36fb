// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::migrations;
use crate::StoreError;

/// The persistence façade: one open SQLite connection, mutex-serialized.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`, apply pragmas and run all
    /// pending migrations.  The only fatal startup errors in agento come
    /// from here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let applied = migrations::apply_all(&conn)?;
        if applied > 0 {
            info!(applied, "database migrations applied");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current schema version (0 when no migration has run).
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }
}

/// UTC timestamp in the canonical column format (RFC 3339, second
/// precision).
pub(crate) fn now_utc() -> String {
    format_utc(chrono::Utc::now())
}

pub(crate) fn format_utc(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse a stored timestamp; tolerates full RFC 3339 with fractions for
/// rows written by older builds.
pub(crate) fn parse_utc(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
