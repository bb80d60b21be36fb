// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{format_utc, now_utc, parse_utc, Store};
use crate::types::{ScheduleType, ScheduledTask, TaskStatus};
use crate::StoreError;

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTask> {
    let id: String = row.get("id")?;
    let schedule_type: String = row.get("schedule_type")?;
    let schedule_config: String = row.get("schedule_config")?;
    let status: String = row.get("status")?;
    let stop_after_time: Option<String> = row.get("stop_after_time")?;
    let last_run_at: Option<String> = row.get("last_run_at")?;
    let next_run_at: Option<String> = row.get("next_run_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(ScheduledTask {
        id: id.parse().unwrap_or_else(|_| Uuid::nil()),
        name: row.get("name")?,
        description: row.get("description")?,
        prompt: row.get("prompt")?,
        agent_slug: row.get("agent_slug")?,
        working_directory: row.get("working_directory")?,
        model: row.get("model")?,
        settings_profile_id: row.get("settings_profile_id")?,
        timeout_minutes: row.get::<_, i64>("timeout_minutes")? as u64,
        schedule_type: schedule_type.parse().unwrap_or(ScheduleType::Interval),
        schedule_config: serde_json::from_str(&schedule_config)
            .unwrap_or(serde_json::Value::Null),
        stop_after_count: row
            .get::<_, Option<i64>>("stop_after_count")?
            .map(|n| n as u32),
        stop_after_time: stop_after_time.as_deref().and_then(parse_utc),
        status: status.parse().unwrap_or(TaskStatus::Paused),
        run_count: row.get::<_, i64>("run_count")? as u32,
        last_run_at: last_run_at.as_deref().and_then(parse_utc),
        last_run_status: row.get("last_run_status")?,
        next_run_at: next_run_at.as_deref().and_then(parse_utc),
        created_at: parse_utc(&created_at).unwrap_or_default(),
        updated_at: parse_utc(&updated_at).unwrap_or_default(),
    })
}

impl Store {
    pub async fn create_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM scheduled_tasks WHERE id = ?1",
                [task.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!("task {} already exists", task.id)));
        }
        conn.execute(
            "INSERT INTO scheduled_tasks
                 (id, name, description, prompt, agent_slug, working_directory,
                  model, settings_profile_id, timeout_minutes, schedule_type,
                  schedule_config, stop_after_count, stop_after_time, status,
                  run_count, last_run_at, last_run_status, next_run_at,
                  created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17, ?18, ?19, ?19)",
            params![
                task.id.to_string(),
                task.name,
                task.description,
                task.prompt,
                task.agent_slug,
                task.working_directory,
                task.model,
                task.settings_profile_id,
                task.timeout_minutes as i64,
                task.schedule_type.as_str(),
                serde_json::to_string(&task.schedule_config)?,
                task.stop_after_count.map(|n| n as i64),
                task.stop_after_time.map(format_utc),
                task.status.as_str(),
                task.run_count as i64,
                task.last_run_at.map(format_utc),
                task.last_run_status,
                task.next_run_at.map(format_utc),
                now_utc(),
            ],
        )?;
        Ok(())
    }

    pub async fn update_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE scheduled_tasks
             SET name = ?2, description = ?3, prompt = ?4, agent_slug = ?5,
                 working_directory = ?6, model = ?7, settings_profile_id = ?8,
                 timeout_minutes = ?9, schedule_type = ?10, schedule_config = ?11,
                 stop_after_count = ?12, stop_after_time = ?13, status = ?14,
                 updated_at = ?15
             WHERE id = ?1",
            params![
                task.id.to_string(),
                task.name,
                task.description,
                task.prompt,
                task.agent_slug,
                task.working_directory,
                task.model,
                task.settings_profile_id,
                task.timeout_minutes as i64,
                task.schedule_type.as_str(),
                serde_json::to_string(&task.schedule_config)?,
                task.stop_after_count.map(|n| n as i64),
                task.stop_after_time.map(format_utc),
                task.status.as_str(),
                now_utc(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    pub async fn get_task(&self, id: Uuid) -> Result<ScheduledTask, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM scheduled_tasks WHERE id = ?1",
            [id.to_string()],
            task_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM scheduled_tasks ORDER BY created_at DESC")?;
        let rows = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn list_active_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM scheduled_tasks WHERE status = 'active' ORDER BY created_at")?;
        let rows = stmt
            .query_map([], task_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM scheduled_tasks WHERE id = ?1",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Flip only the status (pause/resume).
    pub async fn set_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE scheduled_tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), now_utc()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Update the projected next fire time (scheduler bookkeeping).
    pub async fn set_task_next_run(
        &self,
        id: Uuid,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE scheduled_tasks SET next_run_at = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), next_run_at.map(format_utc), now_utc()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Record one completed execution: bump `run_count` (never decreases),
    /// stamp `last_run_at`/`last_run_status`, and update the projection of
    /// the next fire time.
    pub async fn record_task_run(
        &self,
        id: Uuid,
        run_at: DateTime<Utc>,
        run_status: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE scheduled_tasks
             SET run_count = run_count + 1, last_run_at = ?2, last_run_status = ?3,
                 next_run_at = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                format_utc(run_at),
                run_status,
                next_run_at.map(format_utc),
                now_utc(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
