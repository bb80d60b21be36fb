// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use crate::RunnerError;

/// Substitute `{{key}}` placeholders in `template`.
///
/// Lookup order: caller-supplied `vars` first, then the built-in fallbacks
/// `current_date` (local `YYYY-MM-DD`) and `current_time` (local
/// `HH:MM:SS`).  A placeholder found in neither is a
/// [`RunnerError::MissingVariable`].
///
/// Substitution is literal and non-recursive: replacement values are never
/// rescanned.  Whitespace inside the braces is trimmed (`{{ name }}` equals
/// `{{name}}`), and an opening `{{` without a closing `}}` ends scanning
/// silently, leaving the tail as-is.
pub fn interpolate(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, RunnerError> {
    if !template.contains("{{") {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let Some(open) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            // Unterminated placeholder: stop scanning, keep the tail.
            out.push_str(&rest[open..]);
            break;
        };

        let name = after_open[..close].trim();
        match lookup(name, vars) {
            Some(value) => out.push_str(&value),
            None => {
                return Err(RunnerError::MissingVariable {
                    name: name.to_string(),
                })
            }
        }
        rest = &after_open[close + 2..];
    }

    Ok(out)
}

fn lookup(name: &str, vars: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = vars.get(name) {
        return Some(value.clone());
    }
    match name {
        "current_date" => Some(chrono::Local::now().format("%Y-%m-%d").to_string()),
        "current_time" => Some(chrono::Local::now().format("%H:%M:%S").to_string()),
        _ => None,
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
