// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Forward-only schema migrations.
//!
//! Append new entries to [`MIGRATIONS`]; never edit an applied one.  Each
//! migration runs inside its own transaction together with the
//! `schema_migrations` bookkeeping row, so a failure leaves the database at
//! the previous version.

use rusqlite::Connection;

use crate::StoreError;

/// `(version, sql)` pairs, ascending and contiguous from 1.
const MIGRATIONS: &[(i64, &str)] = &[
    // Core entities: agents, chats, integrations, user settings.
    (
        1,
        r#"
        CREATE TABLE agents (
            slug            TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            description     TEXT NOT NULL DEFAULT '',
            model           TEXT NOT NULL DEFAULT '',
            thinking_mode   TEXT NOT NULL DEFAULT 'adaptive',
            permission_mode TEXT NOT NULL DEFAULT 'default',
            system_prompt   TEXT NOT NULL DEFAULT '',
            capabilities    TEXT NOT NULL DEFAULT '{}',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE chat_sessions (
            id                    TEXT PRIMARY KEY,
            title                 TEXT NOT NULL DEFAULT 'New Chat',
            agent_slug            TEXT NOT NULL DEFAULT '',
            sdk_session_id        TEXT NOT NULL DEFAULT '',
            working_directory     TEXT NOT NULL DEFAULT '',
            model                 TEXT NOT NULL DEFAULT '',
            settings_profile_id   TEXT NOT NULL DEFAULT '',
            input_tokens          INTEGER NOT NULL DEFAULT 0,
            output_tokens         INTEGER NOT NULL DEFAULT 0,
            cache_creation_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens     INTEGER NOT NULL DEFAULT 0,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        CREATE TABLE chat_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL DEFAULT '',
            blocks     TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_chat_messages_session ON chat_messages(session_id);

        CREATE TABLE integrations (
            id          TEXT PRIMARY KEY,
            type        TEXT NOT NULL,
            enabled     INTEGER NOT NULL DEFAULT 0,
            credentials TEXT NOT NULL DEFAULT '{}',
            auth        TEXT,
            services    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE user_settings (
            id                        INTEGER PRIMARY KEY CHECK (id = 1),
            default_model             TEXT NOT NULL DEFAULT '',
            default_working_directory TEXT NOT NULL DEFAULT '',
            max_concurrent_tasks      INTEGER NOT NULL DEFAULT 3
        );
        "#,
    ),
    // Scheduler: task definitions and the per-execution audit log.
    (
        2,
        r#"
        CREATE TABLE scheduled_tasks (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            prompt              TEXT NOT NULL,
            agent_slug          TEXT NOT NULL DEFAULT '',
            working_directory   TEXT NOT NULL DEFAULT '',
            model               TEXT NOT NULL DEFAULT '',
            settings_profile_id TEXT NOT NULL DEFAULT '',
            timeout_minutes     INTEGER NOT NULL DEFAULT 30,
            schedule_type       TEXT NOT NULL,
            schedule_config     TEXT NOT NULL DEFAULT '{}',
            stop_after_count    INTEGER,
            stop_after_time     TEXT,
            status              TEXT NOT NULL DEFAULT 'active',
            run_count           INTEGER NOT NULL DEFAULT 0,
            last_run_at         TEXT,
            last_run_status     TEXT,
            next_run_at         TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE job_history (
            id              TEXT PRIMARY KEY,
            task_id         TEXT NOT NULL,
            task_name       TEXT NOT NULL,
            agent_slug      TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            finished_at     TEXT,
            duration_ms     INTEGER,
            chat_session_id TEXT NOT NULL DEFAULT '',
            model           TEXT NOT NULL DEFAULT '',
            prompt_preview  TEXT NOT NULL DEFAULT '',
            error_message   TEXT,
            input_tokens    INTEGER NOT NULL DEFAULT 0,
            output_tokens   INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_job_history_task ON job_history(task_id);
        "#,
    ),
    // Session index cache and the notification log.
    (
        3,
        r#"
        CREATE TABLE claude_session_cache (
            session_id            TEXT NOT NULL,
            project_path          TEXT NOT NULL,
            file_path             TEXT NOT NULL,
            file_mtime            INTEGER NOT NULL,
            preview               TEXT NOT NULL DEFAULT '',
            start_time            TEXT NOT NULL,
            last_activity         TEXT NOT NULL,
            message_count         INTEGER NOT NULL DEFAULT 0,
            input_tokens          INTEGER NOT NULL DEFAULT 0,
            output_tokens         INTEGER NOT NULL DEFAULT 0,
            cache_creation_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens     INTEGER NOT NULL DEFAULT 0,
            model                 TEXT NOT NULL DEFAULT '',
            cwd                   TEXT NOT NULL DEFAULT '',
            git_branch            TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (session_id, project_path)
        );
        CREATE INDEX idx_session_cache_file ON claude_session_cache(file_path);

        CREATE TABLE claude_cache_metadata (
            id              INTEGER PRIMARY KEY CHECK (id = 1),
            last_scanned_at TEXT NOT NULL
        );

        CREATE TABLE notification_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            payload    TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );
        "#,
    ),
];

/// Apply every pending migration; returns how many ran.
pub(crate) fn apply_all(conn: &Connection) -> Result<usize, StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    let mut applied = 0;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        // The DDL and its bookkeeping row commit atomically: a crash
        // mid-migration rolls both back, so a restart re-runs the whole
        // migration instead of tripping over half-applied DDL.
        let batch = format!(
            "BEGIN;\n{sql}\n\
             INSERT INTO schema_migrations (version, applied_at) VALUES ({version}, '{applied_at}');\n\
             COMMIT;",
            applied_at = crate::db::now_utc(),
        );
        conn.execute_batch(&batch)
            .map_err(|source| StoreError::Migration {
                version: *version,
                source,
            })?;
        applied += 1;
    }
    Ok(applied)
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_contiguous_from_one() {
        for (i, (version, _)) in MIGRATIONS.iter().enumerate() {
            assert_eq!(*version, i as i64 + 1);
        }
    }

    #[test]
    fn apply_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_all(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(apply_all(&conn).unwrap(), 0);
    }

    #[test]
    fn every_migration_records_its_bookkeeping_row() {
        let conn = Connection::open_in_memory().unwrap();
        apply_all(&conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT version, applied_at FROM schema_migrations ORDER BY version")
            .unwrap();
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), MIGRATIONS.len());
        for (i, (version, applied_at)) in rows.iter().enumerate() {
            assert_eq!(*version, i as i64 + 1);
            assert!(!applied_at.is_empty());
        }
    }

    #[test]
    fn all_expected_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        apply_all(&conn).unwrap();
        for table in [
            "agents",
            "chat_sessions",
            "chat_messages",
            "integrations",
            "user_settings",
            "scheduled_tasks",
            "job_history",
            "claude_session_cache",
            "claude_cache_metadata",
            "notification_log",
            "schema_migrations",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
