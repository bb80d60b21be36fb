// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use agento_config::Integration;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{now_utc, Store};
use crate::StoreError;

fn integration_from_row(row: &Row<'_>) -> rusqlite::Result<Integration> {
    let credentials: String = row.get("credentials")?;
    let auth: Option<String> = row.get("auth")?;
    let services: String = row.get("services")?;
    Ok(Integration {
        id: row.get("id")?,
        kind: row.get("type")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        credentials: serde_json::from_str(&credentials).unwrap_or(serde_json::Value::Null),
        auth: auth.and_then(|a| serde_json::from_str(&a).ok()),
        services: serde_json::from_str(&services).unwrap_or_default(),
    })
}

impl Store {
    pub async fn upsert_integration(&self, integration: &Integration) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let now = now_utc();
        conn.execute(
            "INSERT INTO integrations (id, type, enabled, credentials, auth, services,
                                       created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 type = excluded.type,
                 enabled = excluded.enabled,
                 credentials = excluded.credentials,
                 auth = excluded.auth,
                 services = excluded.services,
                 updated_at = excluded.updated_at",
            params![
                integration.id,
                integration.kind,
                integration.enabled as i64,
                serde_json::to_string(&integration.credentials)?,
                integration
                    .auth
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&integration.services)?,
                now,
            ],
        )?;
        Ok(())
    }

    pub async fn get_integration(&self, id: &str) -> Result<Integration, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM integrations WHERE id = ?1",
            [id],
            integration_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("integration {id:?}")))
    }

    pub async fn list_integrations(&self) -> Result<Vec<Integration>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM integrations ORDER BY id")?;
        let rows = stmt
            .query_map([], integration_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn delete_integration(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM integrations WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("integration {id:?}")));
        }
        Ok(())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
