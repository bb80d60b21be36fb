// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use tracing::debug;

/// Process-level configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for all persistent agento state (`DATA_DIR`).
    pub data_dir: PathBuf,
    /// HTTP listen port (`PORT`).
    pub port: u16,
    /// Anthropic API key (`ANTHROPIC_API_KEY`).  When unset the Claude CLI
    /// falls back to its own stored credentials.
    pub anthropic_api_key: Option<String>,
}

impl Config {
    /// Build a [`Config`] from the process environment, applying defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8181);

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        debug!(data_dir = %data_dir.display(), port, "configuration resolved");

        Self {
            data_dir,
            port,
            anthropic_api_key,
        }
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("agento.db")
    }

    /// Root of the Claude CLI's per-project JSONL session corpus.
    pub fn claude_projects_dir(&self) -> PathBuf {
        claude_home().join("projects")
    }
}

/// `~/.agento`, falling back to the current directory when no home exists.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agento")
}

/// The Claude CLI's configuration directory (`~/.claude`).
pub fn claude_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
