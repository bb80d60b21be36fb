// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Incremental corpus rescan.
//!
//! The corpus layout is one directory per project under the root, one
//! `.jsonl` file per session inside it.  The diff is keyed on file paths
//! and mtimes (unix seconds, UTC): only changed files are re-parsed.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use agento_store::{SessionCacheRow, Store};

use crate::project_path::decode_project_path;
use crate::summary::build_summary;
use crate::IndexError;

struct OnDiskFile {
    session_id: String,
    project_path: String,
    mtime: i64,
}

/// Walk the corpus and rebuild the cache incrementally, returning the full
/// row set ordered by last activity.
pub(crate) async fn rescan(
    store: &Store,
    root: &Path,
) -> Result<Vec<SessionCacheRow>, IndexError> {
    // A vanished corpus clears the cache outright.
    if !root.is_dir() {
        store.cache_clear().await?;
        return Ok(Vec::new());
    }

    // 1. Everything on disk right now.
    let on_disk = walk_corpus(root);

    // 2-3. Diff against the cached file index.
    let cached = store.cache_file_index().await?;
    let mut parsed = 0usize;
    for (file_path, info) in &on_disk {
        let unchanged = cached.get(file_path) == Some(&info.mtime);
        if unchanged {
            continue;
        }
        // 4. New or modified: re-parse and upsert.
        match build_summary(Path::new(file_path)) {
            Ok(Some(summary)) => {
                parsed += 1;
                store
                    .cache_upsert(&SessionCacheRow {
                        session_id: info.session_id.clone(),
                        project_path: info.project_path.clone(),
                        file_path: file_path.clone(),
                        file_mtime: info.mtime,
                        preview: summary.preview,
                        start_time: summary.start_time,
                        last_activity: summary.last_activity,
                        message_count: summary.message_count,
                        tokens: summary.tokens,
                        model: summary.model,
                        cwd: summary.cwd,
                        git_branch: summary.git_branch,
                    })
                    .await?;
            }
            Ok(None) => {
                // Empty or snapshot-only session: drop any previous row.
                store.cache_delete_by_file(file_path).await?;
            }
            Err(e) => {
                warn!(file = %file_path, "skipping unreadable session file: {e}");
            }
        }
    }

    // 5. Evict rows whose files are gone.
    for file_path in cached.keys() {
        if !on_disk.contains_key(file_path) {
            store.cache_delete_by_file(file_path).await?;
        }
    }

    // 6. The freshness witness is written last.
    store.cache_set_last_scanned_at(Utc::now()).await?;
    debug!(
        files = on_disk.len(),
        reparsed = parsed,
        "session corpus rescan complete"
    );

    // 7. Full result set, newest activity first.
    Ok(store.cache_list().await?)
}

fn walk_corpus(root: &Path) -> HashMap<String, OnDiskFile> {
    let mut on_disk = HashMap::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some("jsonl")
        {
            continue;
        }
        let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(encoded_project) = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
        else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        on_disk.insert(
            path.to_string_lossy().into_owned(),
            OnDiskFile {
                session_id: session_id.to_string(),
                project_path: decode_project_path(encoded_project),
                mtime,
            },
        );
    }
    on_disk
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_session_file(dir: &Path, project: &str, session: &str, text: &str) -> String {
        let project_dir = dir.join(project);
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join(format!("{session}.jsonl"));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"type":"user","timestamp":"2026-03-01T10:00:00Z","message":{{"content":"{text}"}}}}"#
        )
        .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn set_mtime(path: &str, unix_secs: i64) {
        let time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(unix_secs as u64);
        let file = std::fs::File::options().append(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[tokio::test]
    async fn scan_modify_delete_cycle() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let s1 = write_session_file(root, "-proj-a", "s1", "first question");
        let s2 = write_session_file(root, "-proj-a", "s2", "second question");
        set_mtime(&s1, 1_700_000_100);
        set_mtime(&s2, 1_700_000_200);

        // First scan: both sessions cached.
        let rows = rescan(&store, root).await.unwrap();
        assert_eq!(rows.len(), 2);
        let index = store.cache_file_index().await.unwrap();
        assert_eq!(index.get(&s1), Some(&1_700_000_100));

        // Rewrite s1 with a newer mtime: its row updates, s2 stays.
        {
            let mut file = std::fs::File::create(&s1).unwrap();
            writeln!(
                file,
                r#"{{"type":"user","timestamp":"2026-03-02T10:00:00Z","message":{{"content":"rewritten"}}}}"#
            )
            .unwrap();
        }
        set_mtime(&s1, 1_700_000_300);
        let rows = rescan(&store, root).await.unwrap();
        assert_eq!(rows.len(), 2);
        let index = store.cache_file_index().await.unwrap();
        assert_eq!(index.get(&s1), Some(&1_700_000_300));
        assert_eq!(index.get(&s2), Some(&1_700_000_200));
        let updated = rows.iter().find(|r| r.session_id == "s1").unwrap();
        assert_eq!(updated.preview, "rewritten");

        // Delete s2: its row is evicted.
        std::fs::remove_file(&s2).unwrap();
        let rows = rescan(&store, root).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].session_id, "s1");

        // After any rescan the cache mtimes match the disk exactly.
        let index = store.cache_file_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&s1), Some(&1_700_000_300));
    }

    #[tokio::test]
    async fn unchanged_files_are_not_reparsed() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let s1 = write_session_file(dir.path(), "-proj", "s1", "q");
        set_mtime(&s1, 1_700_000_000);

        rescan(&store, dir.path()).await.unwrap();
        // Corrupt the file without touching its mtime: a second scan must
        // keep serving the cached summary because the mtime is unchanged.
        std::fs::write(&s1, "no longer json").unwrap();
        set_mtime(&s1, 1_700_000_000);

        let rows = rescan(&store, dir.path()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].preview, "q");
    }

    #[tokio::test]
    async fn missing_root_clears_the_cache() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        write_session_file(dir.path(), "-proj", "s1", "q");
        rescan(&store, dir.path()).await.unwrap();
        assert_eq!(store.cache_list().await.unwrap().len(), 1);

        let rows = rescan(&store, Path::new("/nonexistent/corpus/root"))
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert!(store.cache_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_are_ordered_by_last_activity_desc() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let old = root.join("-proj/old.jsonl");
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(
            &old,
            r#"{"type":"user","timestamp":"2026-01-01T10:00:00Z","message":{"content":"old"}}"#,
        )
        .unwrap();
        let new = root.join("-proj/new.jsonl");
        std::fs::write(
            &new,
            r#"{"type":"user","timestamp":"2026-06-01T10:00:00Z","message":{"content":"new"}}"#,
        )
        .unwrap();

        let rows = rescan(&store, root).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].session_id, "new");
        assert_eq!(rows[1].session_id, "old");
    }
}
