//! Scalar user preferences kept in a small JSON file.
//!
//! Reads and writes are best-effort: a missing or corrupt file yields defaults, and a
//! failed save is logged and forgotten.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: ThemeMode,
    pub model: Option<ModelKind>,
    pub changelog_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Preferences {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Preferences::default(),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "preferences unreadable");
                return Preferences::default();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = ?self.path, error = %e, "preferences corrupt, using defaults");
            Preferences::default()
        })
    }

    pub async fn save(&self, preferences: &Preferences) {
        if let Err(e) = self.try_save(preferences).await {
            tracing::warn!(path = ?self.path, error = %e, "preferences not saved");
        }
    }

    async fn try_save(&self, preferences: &Preferences) -> crate::errors::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(preferences)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Load, apply `change`, and save.
    pub async fn update(&self, change: impl FnOnce(&mut Preferences)) -> Preferences {
        let mut preferences = self.load().await;
        change(&mut preferences);
        self.save(&preferences).await;
        preferences
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(temp_dir.path().join("prefs.json"));
        assert_eq!(store.load().await, Preferences::default());
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = PreferenceStore::new(temp_dir.path().join("nested/prefs.json"));

        store
            .update(|prefs| {
                prefs.model = Some(ModelKind::Modnet);
                prefs.theme = ThemeMode::Dark;
            })
            .await;

        let loaded = store.load().await;
        assert_eq!(loaded.model, Some(ModelKind::Modnet));
        assert_eq!(loaded.theme, ThemeMode::Dark);
        assert_eq!(loaded.changelog_version, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert_eq!(PreferenceStore::new(path).load().await, Preferences::default());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        std::fs::write(&path, br#"{"model":"rmbg"}"#).unwrap();

        let loaded = PreferenceStore::new(path).load().await;
        assert_eq!(loaded.model, Some(ModelKind::Rmbg));
        assert_eq!(loaded.theme, ThemeMode::System);
    }
}
