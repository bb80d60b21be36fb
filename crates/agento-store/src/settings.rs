// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use agento_config::UserSettings;
use rusqlite::{params, OptionalExtension};

use crate::db::Store;
use crate::StoreError;

impl Store {
    /// The singleton settings row; defaults when never written.
    pub async fn get_settings(&self) -> Result<UserSettings, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT default_model, default_working_directory, max_concurrent_tasks
                 FROM user_settings WHERE id = 1",
                [],
                |row| {
                    Ok(UserSettings {
                        default_model: row.get(0)?,
                        default_working_directory: row.get(1)?,
                        max_concurrent_tasks: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    pub async fn put_settings(&self, settings: &UserSettings) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_settings (id, default_model, default_working_directory,
                                        max_concurrent_tasks)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 default_model = excluded.default_model,
                 default_working_directory = excluded.default_working_directory,
                 max_concurrent_tasks = excluded.max_concurrent_tasks",
            params![
                settings.default_model,
                settings.default_working_directory,
                settings.max_concurrent_tasks as i64,
            ],
        )?;
        Ok(())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
