// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

/// Decode a project directory name back into the filesystem path it
/// encodes.
///
/// The CLI encodes a project path by replacing both `/` and `.` with `-`
/// and prepending `-`, which is ambiguous for names that contain literal
/// hyphens.  The decoder resolves the ambiguity by probing the live
/// filesystem: tokens are greedily accumulated into a segment, and after
/// each token the candidate `<current>/<segment>` (or its dot-prefixed
/// variant) is tested for existence.  When no full decode exists, the raw
/// encoded name is returned so callers always have a display string.
pub fn decode_project_path(encoded: &str) -> String {
    let stripped = match encoded.strip_prefix('-') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => return encoded.to_string(),
    };

    let mut current = PathBuf::from("/");
    let mut segment = String::new();

    for token in stripped.split('-') {
        if !segment.is_empty() {
            segment.push('-');
        }
        segment.push_str(token);
        if segment.is_empty() {
            continue;
        }

        let plain = current.join(&segment);
        if plain.is_dir() {
            current = plain;
            segment.clear();
            continue;
        }
        let hidden = current.join(format!(".{segment}"));
        if hidden.is_dir() {
            current = hidden;
            segment.clear();
        }
    }

    if segment.is_empty() && current != Path::new("/") {
        current.to_string_lossy().into_owned()
    } else {
        encoded.to_string()
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
