// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use agento_config::{AgentConfig, Capabilities};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{now_utc, Store};
use crate::StoreError;

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<AgentConfig> {
    let capabilities_json: String = row.get("capabilities")?;
    let thinking: String = row.get("thinking_mode")?;
    let permission: String = row.get("permission_mode")?;
    Ok(AgentConfig {
        slug: row.get("slug")?,
        name: row.get("name")?,
        description: row.get("description")?,
        model: row.get("model")?,
        thinking_mode: thinking.parse().unwrap_or_default(),
        permission_mode: permission.parse().unwrap_or_default(),
        system_prompt: row.get("system_prompt")?,
        capabilities: serde_json::from_str::<Capabilities>(&capabilities_json)
            .unwrap_or_default(),
    })
}

impl Store {
    /// Insert a new agent; the slug must be unused.
    pub async fn create_agent(&self, agent: &AgentConfig) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let exists: Option<String> = conn
            .query_row(
                "SELECT slug FROM agents WHERE slug = ?1",
                [&agent.slug],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!(
                "agent slug {:?} already exists",
                agent.slug
            )));
        }
        let now = now_utc();
        conn.execute(
            "INSERT INTO agents (slug, name, description, model, thinking_mode,
                                 permission_mode, system_prompt, capabilities,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                agent.slug,
                agent.name,
                agent.description,
                agent.model,
                agent.thinking_mode.as_str(),
                agent.permission_mode.as_str(),
                agent.system_prompt,
                serde_json::to_string(&agent.capabilities)?,
                now,
            ],
        )?;
        Ok(())
    }

    /// Replace every mutable field of an existing agent.  The slug itself is
    /// the immutable identity.
    pub async fn update_agent(&self, agent: &AgentConfig) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE agents
             SET name = ?2, description = ?3, model = ?4, thinking_mode = ?5,
                 permission_mode = ?6, system_prompt = ?7, capabilities = ?8,
                 updated_at = ?9
             WHERE slug = ?1",
            params![
                agent.slug,
                agent.name,
                agent.description,
                agent.model,
                agent.thinking_mode.as_str(),
                agent.permission_mode.as_str(),
                agent.system_prompt,
                serde_json::to_string(&agent.capabilities)?,
                now_utc(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("agent {:?}", agent.slug)));
        }
        Ok(())
    }

    pub async fn get_agent(&self, slug: &str) -> Result<AgentConfig, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM agents WHERE slug = ?1", [slug], |row| {
            agent_from_row(row)
        })
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("agent {slug:?}")))
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentConfig>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM agents ORDER BY slug")?;
        let rows = stmt
            .query_map([], agent_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn delete_agent(&self, slug: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM agents WHERE slug = ?1", [slug])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("agent {slug:?}")));
        }
        Ok(())
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
