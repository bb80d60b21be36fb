// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! One-time import of the legacy filesystem layout into SQLite.
//!
//! Pre-SQLite versions kept state as files under the data directory:
//!
//! ```text
//! <data_dir>/agents/<slug>.yaml      one agent per YAML file
//! <data_dir>/chats/<uuid>.jsonl      one chat per file, one message per line
//! <data_dir>/integrations.json       array of integration records
//! <data_dir>/settings.json           user settings
//! ```
//!
//! The import is idempotent: every insert is conflict-ignore on the primary
//! key, so re-running it (e.g. after a crash mid-import) produces the same
//! rows.  Legacy files are removed only after the whole import succeeded.

use std::path::Path;

use agento_config::{AgentConfig, Integration, UserSettings};
use rusqlite::params;
use serde::Deserialize;
use tracing::{info, warn};

use crate::db::now_utc;
use crate::types::MessageBlock;
use crate::{Store, StoreError};

/// What the import found and inserted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LegacyReport {
    pub agents: usize,
    pub chats: usize,
    pub messages: usize,
    pub integrations: usize,
    pub settings: bool,
}

impl LegacyReport {
    fn is_empty(&self) -> bool {
        *self == LegacyReport::default()
    }
}

#[derive(Debug, Deserialize)]
struct LegacyMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    blocks: Vec<MessageBlock>,
}

/// Import the legacy layout under `data_dir`, then delete it.
///
/// A missing layout is a no-op.  Unreadable individual files are skipped
/// with a warning so one corrupt agent does not block the rest.
pub async fn migrate_legacy_layout(
    store: &Store,
    data_dir: &Path,
) -> Result<LegacyReport, StoreError> {
    let agents_dir = data_dir.join("agents");
    let chats_dir = data_dir.join("chats");
    let integrations_file = data_dir.join("integrations.json");
    let settings_file = data_dir.join("settings.json");

    if !agents_dir.is_dir()
        && !chats_dir.is_dir()
        && !integrations_file.is_file()
        && !settings_file.is_file()
    {
        return Ok(LegacyReport::default());
    }

    let mut report = LegacyReport::default();
    let conn = store.conn.lock().await;

    // ── Agents ────────────────────────────────────────────────────────────────
    if agents_dir.is_dir() {
        for entry in std::fs::read_dir(&agents_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let agent: AgentConfig = match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_yaml::from_str(&text).map_err(Into::into))
            {
                Ok(agent) => agent,
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable legacy agent: {e}");
                    continue;
                }
            };
            let now = now_utc();
            let changed = conn.execute(
                "INSERT OR IGNORE INTO agents
                     (slug, name, description, model, thinking_mode, permission_mode,
                      system_prompt, capabilities, created_at, updated_at)
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
            report.agents += changed;
        }
    }

    // ── Chats ─────────────────────────────────────────────────────────────────
    if chats_dir.is_dir() {
        for entry in std::fs::read_dir(&chats_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<uuid::Uuid>().ok())
            else {
                warn!(path = %path.display(), "skipping legacy chat with non-uuid name");
                continue;
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), "skipping unreadable legacy chat: {e}");
                    continue;
                }
            };
            let messages: Vec<LegacyMessage> = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter_map(|l| serde_json::from_str(l).ok())
                .collect();

            let title = messages
                .iter()
                .find(|m| m.role == "user")
                .map(|m| crate::chats::derive_title(&m.content))
                .unwrap_or_else(|| crate::types::NEW_CHAT_TITLE.to_string());

            let now = now_utc();
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_sessions (id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), title, now],
            )?;
            if inserted == 0 {
                // Session already imported; do not duplicate its messages.
                continue;
            }
            report.chats += 1;
            for message in messages {
                conn.execute(
                    "INSERT INTO chat_messages (session_id, role, content, blocks, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        id.to_string(),
                        message.role,
                        message.content,
                        serde_json::to_string(&message.blocks)?,
                        now,
                    ],
                )?;
                report.messages += 1;
            }
        }
    }

    // ── Integrations ──────────────────────────────────────────────────────────
    if integrations_file.is_file() {
        match std::fs::read_to_string(&integrations_file)
            .map_err(anyhow::Error::from)
            .and_then(|text| {
                serde_json::from_str::<Vec<Integration>>(&text).map_err(Into::into)
            }) {
            Ok(integrations) => {
                for integration in integrations {
                    let now = now_utc();
                    let changed = conn.execute(
                        "INSERT OR IGNORE INTO integrations
                             (id, type, enabled, credentials, auth, services,
                              created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
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
                    report.integrations += changed;
                }
            }
            Err(e) => warn!("skipping unreadable legacy integrations.json: {e}"),
        }
    }

    // ── Settings ──────────────────────────────────────────────────────────────
    if settings_file.is_file() {
        match std::fs::read_to_string(&settings_file)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str::<UserSettings>(&text).map_err(Into::into))
        {
            Ok(settings) => {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO user_settings
                         (id, default_model, default_working_directory, max_concurrent_tasks)
                     VALUES (1, ?1, ?2, ?3)",
                    params![
                        settings.default_model,
                        settings.default_working_directory,
                        settings.max_concurrent_tasks as i64,
                    ],
                )?;
                report.settings = changed > 0;
            }
            Err(e) => warn!("skipping unreadable legacy settings.json: {e}"),
        }
    }

    drop(conn);

    // Only after everything imported cleanly: remove the legacy layout.
    if agents_dir.is_dir() {
        let _ = std::fs::remove_dir_all(&agents_dir);
    }
    if chats_dir.is_dir() {
        let _ = std::fs::remove_dir_all(&chats_dir);
    }
    let _ = std::fs::remove_file(&integrations_file);
    let _ = std::fs::remove_file(&settings_file);

    if !report.is_empty() {
        info!(
            agents = report.agents,
            chats = report.chats,
            messages = report.messages,
            integrations = report.integrations,
            "legacy data imported into SQLite"
        );
    }
    Ok(report)
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_legacy_layout(dir: &Path) {
        std::fs::create_dir_all(dir.join("agents")).unwrap();
        std::fs::write(
            dir.join("agents/researcher.yaml"),
            "slug: researcher\nname: Researcher\nsystem_prompt: 'dig into {{topic}}'\n",
        )
        .unwrap();

        std::fs::create_dir_all(dir.join("chats")).unwrap();
        let chat_id = "4f9f24fd-8bd1-4c1e-9f07-7f3b2a1d0e55";
        std::fs::write(
            dir.join(format!("chats/{chat_id}.jsonl")),
            concat!(
                r#"{"role":"user","content":"What is Rust?"}"#,
                "\n",
                r#"{"role":"assistant","content":"A systems language.","blocks":[{"type":"text","text":"A systems language."}]}"#,
                "\n",
            ),
        )
        .unwrap();

        std::fs::write(
            dir.join("integrations.json"),
            r#"[{"id":"cal","type":"google_calendar","enabled":true,"credentials":{},"auth":null,"services":{}}]"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("settings.json"),
            r#"{"default_model":"claude-sonnet-4-5","default_working_directory":"","max_concurrent_tasks":4}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn imports_all_sections_and_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy_layout(dir.path());
        let store = Store::open_in_memory().unwrap();

        let report = migrate_legacy_layout(&store, dir.path()).await.unwrap();
        assert_eq!(report.agents, 1);
        assert_eq!(report.chats, 1);
        assert_eq!(report.messages, 2);
        assert_eq!(report.integrations, 1);
        assert!(report.settings);

        assert!(!dir.path().join("agents").exists());
        assert!(!dir.path().join("chats").exists());
        assert!(!dir.path().join("integrations.json").exists());
        assert!(!dir.path().join("settings.json").exists());

        let agent = store.get_agent("researcher").await.unwrap();
        assert_eq!(agent.name, "Researcher");
        let chats = store.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].title, "What is Rust?");
        let messages = store.list_messages(chats[0].id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            store.get_settings().await.unwrap().default_model,
            "claude-sonnet-4-5"
        );
    }

    #[tokio::test]
    async fn rerunning_after_restore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_legacy_layout(dir.path());
        let store = Store::open_in_memory().unwrap();

        migrate_legacy_layout(&store, dir.path()).await.unwrap();
        // Recreate the legacy files (simulating a partially-cleaned layout)
        // and import again: conflict-ignore must keep counts stable.
        write_legacy_layout(dir.path());
        let second = migrate_legacy_layout(&store, dir.path()).await.unwrap();
        assert_eq!(second.agents, 0);
        assert_eq!(second.chats, 0);
        assert_eq!(second.messages, 0);
        assert_eq!(second.integrations, 0);
        assert!(!second.settings);

        assert_eq!(store.list_agents().await.unwrap().len(), 1);
        let chats = store.list_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(store.list_messages(chats[0].id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_layout_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let report = migrate_legacy_layout(&store, dir.path()).await.unwrap();
        assert_eq!(report, LegacyReport::default());
    }

    #[tokio::test]
    async fn corrupt_agent_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("agents")).unwrap();
        std::fs::write(dir.path().join("agents/bad.yaml"), ": not yaml [").unwrap();
        std::fs::write(
            dir.path().join("agents/good.yaml"),
            "slug: good\nname: Good\n",
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();
        let report = migrate_legacy_layout(&store, dir.path()).await.unwrap();
        assert_eq!(report.agents, 1);
        assert!(store.get_agent("good").await.is_ok());
    }
}
