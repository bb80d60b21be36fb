// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Settings profiles — named bundles of Claude CLI settings.
//!
//! Each profile is one JSON file `settings_<id>.json` inside the Claude
//! configuration directory, with a sidecar `settings_profiles.json` listing
//! all profiles and flagging the default.  Activating a profile copies its
//! contents over the CLI's canonical `settings.json` so plain `claude`
//! invocations pick it up too; agento itself passes the profile file path
//! straight to the subprocess via `--settings`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("profile name must not be empty")]
    EmptyName,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid profile metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// One entry in the sidecar metadata file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// The sidecar file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileMetadata {
    #[serde(default)]
    pub profiles: Vec<SettingsProfile>,
}

/// Filesystem-backed profile manager rooted at a Claude configuration
/// directory (normally `~/.claude`).
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the settings file for `id` — handed to the subprocess as
    /// `--settings`.
    pub fn profile_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("settings_{id}.json"))
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join("settings_profiles.json")
    }

    fn canonical_settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Load the sidecar; a missing file is an empty profile list.
    pub fn metadata(&self) -> Result<ProfileMetadata, ProfileError> {
        let path = self.metadata_path();
        if !path.is_file() {
            return Ok(ProfileMetadata::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write_metadata(&self, meta: &ProfileMetadata) -> Result<(), ProfileError> {
        std::fs::create_dir_all(&self.root)?;
        let text = serde_json::to_string_pretty(meta)?;
        std::fs::write(self.metadata_path(), text)?;
        Ok(())
    }

    /// Create a profile with the given display name and settings body.
    /// The first profile ever created becomes the default.
    pub fn create(
        &self,
        name: &str,
        settings: &serde_json::Value,
    ) -> Result<SettingsProfile, ProfileError> {
        if name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        let mut meta = self.metadata()?;
        let profile = SettingsProfile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            is_default: meta.profiles.is_empty(),
        };
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(
            self.profile_path(&profile.id),
            serde_json::to_string_pretty(settings)?,
        )?;
        meta.profiles.push(profile.clone());
        self.write_metadata(&meta)?;
        Ok(profile)
    }

    /// Read a profile's settings body.
    pub fn read(&self, id: &str) -> Result<serde_json::Value, ProfileError> {
        let path = self.profile_path(id);
        if !path.is_file() {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Update a profile's name and/or settings body.
    pub fn update(
        &self,
        id: &str,
        name: Option<&str>,
        settings: Option<&serde_json::Value>,
    ) -> Result<SettingsProfile, ProfileError> {
        let mut meta = self.metadata()?;
        let entry = meta
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))?;
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(ProfileError::EmptyName);
            }
            entry.name = name.trim().to_string();
        }
        let updated = entry.clone();
        if let Some(settings) = settings {
            std::fs::write(
                self.profile_path(id),
                serde_json::to_string_pretty(settings)?,
            )?;
        }
        self.write_metadata(&meta)?;
        Ok(updated)
    }

    /// Delete a profile and its settings file.  Deleting the default
    /// promotes the first remaining profile, if any.
    pub fn delete(&self, id: &str) -> Result<(), ProfileError> {
        let mut meta = self.metadata()?;
        let before = meta.profiles.len();
        let was_default = meta
            .profiles
            .iter()
            .any(|p| p.id == id && p.is_default);
        meta.profiles.retain(|p| p.id != id);
        if meta.profiles.len() == before {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        if was_default {
            if let Some(first) = meta.profiles.first_mut() {
                first.is_default = true;
            }
        }
        let _ = std::fs::remove_file(self.profile_path(id));
        self.write_metadata(&meta)
    }

    /// Mark `id` as the default and mirror its contents into the canonical
    /// `settings.json` so the plain Claude CLI uses it as well.
    pub fn activate(&self, id: &str) -> Result<(), ProfileError> {
        let body = self.read(id)?;
        let mut meta = self.metadata()?;
        if !meta.profiles.iter().any(|p| p.id == id) {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        for p in &mut meta.profiles {
            p.is_default = p.id == id;
        }
        std::fs::write(
            self.canonical_settings_path(),
            serde_json::to_string_pretty(&body)?,
        )?;
        self.write_metadata(&meta)?;
        info!(profile = id, "settings profile activated");
        Ok(())
    }

    /// Path of the default profile's settings file, if a default exists on
    /// disk.
    pub fn default_profile_path(&self) -> Option<PathBuf> {
        let meta = self.metadata().ok()?;
        let default = meta.profiles.iter().find(|p| p.is_default)?;
        let path = self.profile_path(&default.id);
        path.is_file().then_some(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, ProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn first_profile_becomes_default() {
        let (_dir, store) = store();
        let p = store.create("work", &json!({"env": {}})).unwrap();
        assert!(p.is_default);
        let q = store.create("home", &json!({})).unwrap();
        assert!(!q.is_default);
    }

    #[test]
    fn create_then_read_roundtrips_settings() {
        let (_dir, store) = store();
        let body = json!({"env": {"FOO": "bar"}, "model": "opus"});
        let p = store.create("work", &body).unwrap();
        assert_eq!(store.read(&p.id).unwrap(), body);
    }

    #[test]
    fn activate_mirrors_to_canonical_settings() {
        let (dir, store) = store();
        let body = json!({"model": "sonnet"});
        let a = store.create("a", &json!({"model": "opus"})).unwrap();
        let b = store.create("b", &body).unwrap();
        store.activate(&b.id).unwrap();

        let canonical: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(canonical, body);

        let meta = store.metadata().unwrap();
        assert!(!meta.profiles.iter().find(|p| p.id == a.id).unwrap().is_default);
        assert!(meta.profiles.iter().find(|p| p.id == b.id).unwrap().is_default);
    }

    #[test]
    fn delete_default_promotes_next() {
        let (_dir, store) = store();
        let a = store.create("a", &json!({})).unwrap();
        let b = store.create("b", &json!({})).unwrap();
        store.delete(&a.id).unwrap();
        let meta = store.metadata().unwrap();
        assert_eq!(meta.profiles.len(), 1);
        assert_eq!(meta.profiles[0].id, b.id);
        assert!(meta.profiles[0].is_default);
    }

    #[test]
    fn delete_unknown_profile_errors() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete("nope"),
            Err(ProfileError::NotFound(_))
        ));
    }

    #[test]
    fn default_profile_path_requires_file_on_disk() {
        let (_dir, store) = store();
        assert!(store.default_profile_path().is_none());
        let p = store.create("work", &json!({})).unwrap();
        let path = store.default_profile_path().unwrap();
        assert!(path.ends_with(format!("settings_{}.json", p.id)));
    }
}
