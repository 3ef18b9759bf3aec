//! TOML-backed settings store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use airmenu_core::{Error, SettingKey, SettingsStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct StoredSettings {
    client_id: Option<String>,
    client_secret: Option<String>,
    selected_sensor: Option<String>,
}

impl StoredSettings {
    fn slot(&mut self, key: SettingKey) -> &mut Option<String> {
        match key {
            SettingKey::ClientId => &mut self.client_id,
            SettingKey::ClientSecret => &mut self.client_secret,
            SettingKey::SelectedMetric => &mut self.selected_sensor,
        }
    }
}

/// Settings kept in a TOML file, rewritten on every change.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    values: Mutex<StoredSettings>,
}

impl FileSettingsStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse settings: {}", path.display()))?
        } else {
            StoredSettings::default()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, values: &StoredSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(values).context("Failed to serialize settings")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings: {}", self.path.display()))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: SettingKey) -> Option<String> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.slot(key).clone()
    }

    fn set(&self, key: SettingKey, value: &str) -> airmenu_core::Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = values.clone();
        *updated.slot(key) = Some(value.to_string());

        self.write(&updated)
            .map_err(|e| Error::Settings(format!("{:#}", e)))?;
        *values = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSettingsStore::open(dir.path().join("settings.toml")).unwrap();
        assert!(store.get(SettingKey::ClientId).is_none());
        assert!(store.get(SettingKey::SelectedMetric).is_none());
    }

    #[test]
    fn test_set_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let store = FileSettingsStore::open(&path).unwrap();
        store.set(SettingKey::ClientId, "id-1").unwrap();
        store.set(SettingKey::ClientSecret, "secret-1").unwrap();
        store.set(SettingKey::SelectedMetric, "co2").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("client_id = \"id-1\""));
        assert!(content.contains("selected_sensor = \"co2\""));

        let reopened = FileSettingsStore::open(&path).unwrap();
        assert_eq!(reopened.get(SettingKey::ClientId).as_deref(), Some("id-1"));
        assert_eq!(
            reopened.get(SettingKey::ClientSecret).as_deref(),
            Some("secret-1")
        );
        assert_eq!(
            reopened.get(SettingKey::SelectedMetric).as_deref(),
            Some("co2")
        );
    }

    #[test]
    fn test_empty_value_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = FileSettingsStore::open(&path).unwrap();
        store.set(SettingKey::SelectedMetric, "").unwrap();
        assert_eq!(store.get(SettingKey::SelectedMetric).as_deref(), Some(""));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "client_id = [").unwrap();
        let err = FileSettingsStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("settings.toml");
        fs::create_dir(&path).unwrap();
        let store = FileSettingsStore {
            path,
            values: Mutex::new(StoredSettings::default()),
        };

        let result = store.set(SettingKey::ClientId, "id");
        assert!(matches!(result, Err(Error::Settings(_))));
        assert!(store.get(SettingKey::ClientId).is_none());
    }
}
