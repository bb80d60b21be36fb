// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Job history and the notification log.
//!
//! History rows are written in two steps: a `running` row at execution start
//! and a terminal update at the end.  Rows still `running` when the service
//! boots belong to a previous process and are marked failed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{format_utc, now_utc, parse_utc, Store};
use crate::types::{JobHistory, JobStatus, NotificationEntry};
use crate::StoreError;

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<JobHistory> {
    let id: String = row.get("id")?;
    let task_id: String = row.get("task_id")?;
    let status: String = row.get("status")?;
    let started: String = row.get("started_at")?;
    let finished: Option<String> = row.get("finished_at")?;
    Ok(JobHistory {
        id: id.parse().unwrap_or_else(|_| Uuid::nil()),
        task_id: task_id.parse().unwrap_or_else(|_| Uuid::nil()),
        task_name: row.get("task_name")?,
        agent_slug: row.get("agent_slug")?,
        status: status.parse().unwrap_or(JobStatus::Failed),
        started_at: parse_utc(&started).unwrap_or_default(),
        finished_at: finished.as_deref().and_then(parse_utc),
        duration_ms: row.get("duration_ms")?,
        chat_session_id: row.get("chat_session_id")?,
        model: row.get("model")?,
        prompt_preview: row.get("prompt_preview")?,
        error_message: row.get("error_message")?,
        input_tokens: row.get::<_, i64>("input_tokens")? as u64,
        output_tokens: row.get::<_, i64>("output_tokens")? as u64,
    })
}

impl Store {
    /// Insert the transient `running` row for a starting execution.
    pub async fn insert_job_running(&self, job: &JobHistory) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO job_history
                 (id, task_id, task_name, agent_slug, status, started_at,
                  chat_session_id, model, prompt_preview)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.id.to_string(),
                job.task_id.to_string(),
                job.task_name,
                job.agent_slug,
                JobStatus::Running.as_str(),
                format_utc(job.started_at),
                job.chat_session_id,
                job.model,
                job.prompt_preview,
            ],
        )?;
        Ok(())
    }

    /// Finalize an execution row with its terminal status.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_job(
        &self,
        id: Uuid,
        status: JobStatus,
        finished_at: DateTime<Utc>,
        duration_ms: i64,
        error_message: Option<&str>,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE job_history
             SET status = ?2, finished_at = ?3, duration_ms = ?4,
                 error_message = ?5, input_tokens = ?6, output_tokens = ?7
             WHERE id = ?1",
            params![
                id.to_string(),
                status.as_str(),
                format_utc(finished_at),
                duration_ms,
                error_message,
                input_tokens as i64,
                output_tokens as i64,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("job history {id}")));
        }
        Ok(())
    }

    /// Mark all rows still `running` as failed.  Called once at startup:
    /// a running row with no live process is an abandoned execution.
    pub async fn fail_abandoned_jobs(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE job_history
             SET status = 'failed', finished_at = ?1,
                 error_message = 'abandoned at startup'
             WHERE status = 'running'",
            [now_utc()],
        )?;
        Ok(changed)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<JobHistory, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM job_history WHERE id = ?1",
            [id.to_string()],
            history_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("job history {id}")))
    }

    /// Newest-first execution log, optionally scoped to one task.
    pub async fn list_job_history(
        &self,
        task_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<JobHistory>, StoreError> {
        let conn = self.conn.lock().await;
        let rows = match task_id {
            Some(task_id) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM job_history WHERE task_id = ?1
                     ORDER BY started_at DESC LIMIT ?2",
                )?;
                let result = stmt
                    .query_map(params![task_id.to_string(), limit as i64], history_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM job_history ORDER BY started_at DESC LIMIT ?1",
                )?;
                let result = stmt
                    .query_map([limit as i64], history_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        Ok(rows)
    }

    // ── Notification log ──────────────────────────────────────────────────────

    /// Append one event-bus entry to the durable log.
    pub async fn append_notification(
        &self,
        event_type: &str,
        payload: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notification_log (event_type, payload, created_at)
             VALUES (?1, ?2, ?3)",
            params![event_type, serde_json::to_string(payload)?, now_utc()],
        )?;
        Ok(())
    }

    /// Newest-first notification entries.
    pub async fn list_notifications(
        &self,
        limit: usize,
    ) -> Result<Vec<NotificationEntry>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, event_type, payload, created_at FROM notification_log
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                let payload: String = row.get("payload")?;
                let created: String = row.get("created_at")?;
                Ok(NotificationEntry {
                    id: row.get("id")?,
                    event_type: row.get("event_type")?,
                    payload: serde_json::from_str(&payload).unwrap_or_default(),
                    created_at: parse_utc(&created).unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
