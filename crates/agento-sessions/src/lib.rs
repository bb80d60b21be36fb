// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Session index: summaries over the Claude CLI's append-only JSONL
//! transcript corpus (`~/.claude/projects/<encoded-path>/<session>.jsonl`).
//!
//! Reads are served from a SQLite cache with a 1-hour TTL.  Outside the
//! TTL, [`SessionIndex::list`] performs an incremental rescan keyed on file
//! mtimes: only new or changed files are re-parsed, vanished files are
//! evicted, and `last_scanned_at` is written last so concurrent observers
//! see either the complete new state or the old one.
//!
//! Parse errors are never fatal here: a bad line is skipped, a bad file is
//! skipped with a warning, and a failed rescan falls back to stale rows.

mod detail;
mod index;
mod project_path;
mod scanner;
mod summary;

pub use detail::{DetailMessage, SessionDetail};
pub use index::SessionIndex;
pub use project_path::decode_project_path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] agento_store::StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
