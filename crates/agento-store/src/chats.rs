// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{format_utc, now_utc, parse_utc, Store};
use crate::types::{ChatMessage, ChatSession, MessageBlock, MessageRole, TokenTotals, NEW_CHAT_TITLE};
use crate::StoreError;

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    let id: String = row.get("id")?;
    let created: String = row.get("created_at")?;
    let updated: String = row.get("updated_at")?;
    Ok(ChatSession {
        id: id.parse().unwrap_or_else(|_| Uuid::nil()),
        title: row.get("title")?,
        agent_slug: row.get("agent_slug")?,
        sdk_session_id: row.get("sdk_session_id")?,
        working_directory: row.get("working_directory")?,
        model: row.get("model")?,
        settings_profile_id: row.get("settings_profile_id")?,
        tokens: TokenTotals {
            input_tokens: row.get::<_, i64>("input_tokens")? as u64,
            output_tokens: row.get::<_, i64>("output_tokens")? as u64,
            cache_creation_tokens: row.get::<_, i64>("cache_creation_tokens")? as u64,
            cache_read_tokens: row.get::<_, i64>("cache_read_tokens")? as u64,
        },
        created_at: parse_utc(&created).unwrap_or_default(),
        updated_at: parse_utc(&updated).unwrap_or_default(),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    let session_id: String = row.get("session_id")?;
    let role: String = row.get("role")?;
    let blocks_json: String = row.get("blocks")?;
    let created: String = row.get("created_at")?;
    Ok(ChatMessage {
        id: row.get("id")?,
        session_id: session_id.parse().unwrap_or_else(|_| Uuid::nil()),
        role: role.parse().unwrap_or(MessageRole::User),
        content: row.get("content")?,
        blocks: serde_json::from_str(&blocks_json).unwrap_or_default(),
        created_at: parse_utc(&created).unwrap_or_default(),
    })
}

impl Store {
    /// Create a chat session with the sentinel title.
    pub async fn create_chat(
        &self,
        agent_slug: &str,
        working_directory: &str,
        model: &str,
        settings_profile_id: &str,
    ) -> Result<ChatSession, StoreError> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            title: NEW_CHAT_TITLE.to_string(),
            agent_slug: agent_slug.to_string(),
            sdk_session_id: String::new(),
            working_directory: working_directory.to_string(),
            model: model.to_string(),
            settings_profile_id: settings_profile_id.to_string(),
            tokens: TokenTotals::default(),
            created_at: now,
            updated_at: now,
        };
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_sessions (id, title, agent_slug, sdk_session_id,
                                        working_directory, model, settings_profile_id,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, '', ?4, ?5, ?6, ?7, ?7)",
            params![
                session.id.to_string(),
                session.title,
                session.agent_slug,
                session.working_directory,
                session.model,
                session.settings_profile_id,
                format_utc(now),
            ],
        )?;
        Ok(session)
    }

    pub async fn get_chat(&self, id: Uuid) -> Result<ChatSession, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM chat_sessions WHERE id = ?1",
            [id.to_string()],
            session_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("chat {id}")))
    }

    pub async fn list_chats(&self) -> Result<Vec<ChatSession>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM chat_sessions ORDER BY updated_at DESC")?;
        let rows = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete a chat; messages cascade.
    pub async fn delete_chat(&self, id: Uuid) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM chat_sessions WHERE id = ?1",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("chat {id}")));
        }
        Ok(())
    }

    /// Set the title (used once, when it is still the sentinel).
    pub async fn update_chat_title(&self, id: Uuid, title: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE chat_sessions SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), title, now_utc()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("chat {id}")));
        }
        Ok(())
    }

    /// Commit a completed turn: capture the resume id and add this turn's
    /// token usage to the cumulative counters.  `updated_at` moves forward,
    /// never back.
    pub async fn update_chat_after_turn(
        &self,
        id: Uuid,
        sdk_session_id: &str,
        turn_tokens: &TokenTotals,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE chat_sessions
             SET sdk_session_id = CASE WHEN ?2 = '' THEN sdk_session_id ELSE ?2 END,
                 input_tokens          = input_tokens + ?3,
                 output_tokens         = output_tokens + ?4,
                 cache_creation_tokens = cache_creation_tokens + ?5,
                 cache_read_tokens     = cache_read_tokens + ?6,
                 updated_at = MAX(updated_at, ?7)
             WHERE id = ?1",
            params![
                id.to_string(),
                sdk_session_id,
                turn_tokens.input_tokens as i64,
                turn_tokens.output_tokens as i64,
                turn_tokens.cache_creation_tokens as i64,
                turn_tokens.cache_read_tokens as i64,
                now_utc(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("chat {id}")));
        }
        Ok(())
    }

    /// Append one message; returns the insertion id that fixes its order.
    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
        blocks: &[MessageBlock],
    ) -> Result<i64, StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, blocks, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id.to_string(),
                role.as_str(),
                content,
                serde_json::to_string(blocks)?,
                now_utc(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM chat_messages WHERE session_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map([session_id.to_string()], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Derive a chat title from the first user message: up to 60 runes, with an
/// ellipsis when truncated.  Counting is by code point, not byte.
pub fn derive_title(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(60).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
