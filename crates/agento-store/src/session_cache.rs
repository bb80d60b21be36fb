// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{format_utc, parse_utc, Store};
use crate::types::{SessionCacheRow, TokenTotals};
use crate::StoreError;

fn cache_row(row: &Row<'_>) -> rusqlite::Result<SessionCacheRow> {
    let start: String = row.get("start_time")?;
    let last: String = row.get("last_activity")?;
    Ok(SessionCacheRow {
        session_id: row.get("session_id")?,
        project_path: row.get("project_path")?,
        file_path: row.get("file_path")?,
        file_mtime: row.get("file_mtime")?,
        preview: row.get("preview")?,
        start_time: parse_utc(&start).unwrap_or_default(),
        last_activity: parse_utc(&last).unwrap_or_default(),
        message_count: row.get::<_, i64>("message_count")? as u64,
        tokens: TokenTotals {
            input_tokens: row.get::<_, i64>("input_tokens")? as u64,
            output_tokens: row.get::<_, i64>("output_tokens")? as u64,
            cache_creation_tokens: row.get::<_, i64>("cache_creation_tokens")? as u64,
            cache_read_tokens: row.get::<_, i64>("cache_read_tokens")? as u64,
        },
        model: row.get("model")?,
        cwd: row.get("cwd")?,
        git_branch: row.get("git_branch")?,
    })
}

impl Store {
    /// All cached summaries, most recent activity first.
    pub async fn cache_list(&self) -> Result<Vec<SessionCacheRow>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM claude_session_cache ORDER BY last_activity DESC")?;
        let rows = stmt
            .query_map([], cache_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `file_path → mtime` index used for the incremental diff.
    pub async fn cache_file_index(&self) -> Result<HashMap<String, i64>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT file_path, file_mtime FROM claude_session_cache")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    /// Upsert one summary by its `(session_id, project_path)` key.
    pub async fn cache_upsert(&self, row: &SessionCacheRow) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO claude_session_cache
                 (session_id, project_path, file_path, file_mtime, preview,
                  start_time, last_activity, message_count, input_tokens,
                  output_tokens, cache_creation_tokens, cache_read_tokens,
                  model, cwd, git_branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(session_id, project_path) DO UPDATE SET
                 file_path = excluded.file_path,
                 file_mtime = excluded.file_mtime,
                 preview = excluded.preview,
                 start_time = excluded.start_time,
                 last_activity = excluded.last_activity,
                 message_count = excluded.message_count,
                 input_tokens = excluded.input_tokens,
                 output_tokens = excluded.output_tokens,
                 cache_creation_tokens = excluded.cache_creation_tokens,
                 cache_read_tokens = excluded.cache_read_tokens,
                 model = excluded.model,
                 cwd = excluded.cwd,
                 git_branch = excluded.git_branch",
            params![
                row.session_id,
                row.project_path,
                row.file_path,
                row.file_mtime,
                row.preview,
                format_utc(row.start_time),
                format_utc(row.last_activity),
                row.message_count as i64,
                row.tokens.input_tokens as i64,
                row.tokens.output_tokens as i64,
                row.tokens.cache_creation_tokens as i64,
                row.tokens.cache_read_tokens as i64,
                row.model,
                row.cwd,
                row.git_branch,
            ],
        )?;
        Ok(())
    }

    /// Remove rows whose backing file disappeared.
    pub async fn cache_delete_by_file(&self, file_path: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM claude_session_cache WHERE file_path = ?1",
            [file_path],
        )?;
        Ok(())
    }

    /// Drop every cached summary (corpus root vanished).
    pub async fn cache_clear(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM claude_session_cache", [])?;
        conn.execute("DELETE FROM claude_cache_metadata", [])?;
        Ok(())
    }

    pub async fn cache_get(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionCacheRow>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT * FROM claude_session_cache WHERE session_id = ?1",
                [session_id],
                cache_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Forget the last scan time so the next read rescans, keeping the
    /// cached rows as the stale fallback.
    pub async fn cache_invalidate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM claude_cache_metadata", [])?;
        Ok(())
    }

    pub async fn cache_last_scanned_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock().await;
        let text: Option<String> = conn
            .query_row(
                "SELECT last_scanned_at FROM claude_cache_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text.as_deref().and_then(parse_utc))
    }

    /// Written as the final step of a rescan so readers see either complete
    /// new state or the previous one.
    pub async fn cache_set_last_scanned_at(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO claude_cache_metadata (id, last_scanned_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET last_scanned_at = excluded.last_scanned_at",
            [format_utc(at)],
        )?;
        Ok(())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
