// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use agento_store::{SessionCacheRow, Store};

use crate::detail::{build_detail, SessionDetail};
use crate::scanner;
use crate::IndexError;

/// How long cached rows are served without touching the filesystem.
const CACHE_TTL_MINUTES: i64 = 60;

/// TTL-gated reader over the session corpus.
///
/// One internal mutex serializes list/invalidate/rescan: a `list()` during
/// a rescan simply waits for it — readers tolerate the latency, and in
/// exchange they never observe a half-applied diff.
pub struct SessionIndex {
    store: Arc<Store>,
    root: PathBuf,
    ttl: Duration,
    lock: Mutex<()>,
}

impl SessionIndex {
    pub fn new(store: Arc<Store>, root: PathBuf) -> Self {
        Self {
            store,
            root,
            ttl: Duration::minutes(CACHE_TTL_MINUTES),
            lock: Mutex::new(()),
        }
    }

    /// All session summaries, newest activity first.
    ///
    /// Within the TTL the cache answers directly.  Outside it, the corpus
    /// is rescanned synchronously; when the rescan fails, stale rows are
    /// returned instead of an error.
    pub async fn list(&self) -> Result<Vec<SessionCacheRow>, IndexError> {
        let _guard = self.lock.lock().await;

        let fresh = self
            .store
            .cache_last_scanned_at()
            .await?
            .map(|at| Utc::now() - at < self.ttl)
            .unwrap_or(false);
        if fresh {
            return Ok(self.store.cache_list().await?);
        }

        match scanner::rescan(&self.store, &self.root).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!("session rescan failed; serving stale cache: {e}");
                Ok(self.store.cache_list().await?)
            }
        }
    }

    /// Drop the TTL so the next [`list`](Self::list) rescans.
    pub async fn invalidate(&self) -> Result<(), IndexError> {
        let _guard = self.lock.lock().await;
        self.store.cache_invalidate().await?;
        Ok(())
    }

    /// Pre-warm the cache without blocking the caller (startup path).
    pub fn warm_in_background(self: &Arc<Self>) {
        let index = self.clone();
        tokio::spawn(async move {
            match index.list().await {
                Ok(rows) => info!(sessions = rows.len(), "session cache warmed"),
                Err(e) => warn!("session cache warm-up failed: {e}"),
            }
        });
    }

    /// Full detail for one session, or `None` when it is unknown.
    ///
    /// The cache row locates the backing file; an expired cache is
    /// refreshed first so recently created sessions are found.
    pub async fn detail(&self, session_id: &str) -> Result<Option<SessionDetail>, IndexError> {
        let row = match self.store.cache_get(session_id).await? {
            Some(row) => Some(row),
            None => {
                // Unknown session: one rescan may discover it.
                self.list().await?;
                self.store.cache_get(session_id).await?
            }
        };
        let Some(row) = row else {
            return Ok(None);
        };

        let path = std::path::Path::new(&row.file_path);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(build_detail(path, &row.session_id, &row.project_path)?))
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn corpus_with_session(root: &std::path::Path) -> String {
        let project = root.join("-proj");
        std::fs::create_dir_all(&project).unwrap();
        let path = project.join("abc123.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"type":"user","uuid":"u1","timestamp":"2026-03-01T10:00:00Z","message":{{"content":"hello"}}}}"#
        )
        .unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn list_scans_once_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        corpus_with_session(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let index = SessionIndex::new(store.clone(), dir.path().to_path_buf());

        let rows = index.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        let scanned_at = store.cache_last_scanned_at().await.unwrap().unwrap();

        // A second list within the TTL does not bump the scan time.
        index.list().await.unwrap();
        assert_eq!(
            store.cache_last_scanned_at().await.unwrap().unwrap(),
            scanned_at
        );
    }

    #[tokio::test]
    async fn invalidate_forces_a_rescan() {
        let dir = tempfile::tempdir().unwrap();
        corpus_with_session(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let index = SessionIndex::new(store.clone(), dir.path().to_path_buf());

        index.list().await.unwrap();
        let first = store.cache_last_scanned_at().await.unwrap().unwrap();

        index.invalidate().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        index.list().await.unwrap();
        let second = store.cache_last_scanned_at().await.unwrap().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn detail_finds_sessions_and_reports_unknown_ones() {
        let dir = tempfile::tempdir().unwrap();
        corpus_with_session(dir.path());
        let store = Arc::new(Store::open_in_memory().unwrap());
        let index = SessionIndex::new(store, dir.path().to_path_buf());

        // Never listed: detail triggers the discovery rescan itself.
        let detail = index.detail("abc123").await.unwrap().unwrap();
        assert_eq!(detail.session_id, "abc123");
        assert_eq!(detail.messages.len(), 1);

        assert!(index.detail("missing").await.unwrap().is_none());
    }
}
