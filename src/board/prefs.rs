//! Client-local display preferences (group order). Never sent to the store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::warn;

use super::grouping::GroupingMode;
use super::BoardKind;
use crate::config::LocalConfig;

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Key/value store for per-device preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<String>>;
    fn set(&self, key: &str, value: &[String]) -> Result<(), PrefsError>;
}

/// Preference key for the group order of one board under one mode.
pub fn group_order_key(kind: BoardKind, mode: GroupingMode) -> String {
    format!("{kind}:{mode}")
}

/// Preferences that live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, Vec<String>>>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<Vec<String>> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &[String]) -> Result<(), PrefsError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Preferences kept in `.rangeboard/local.toml`.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    board_dir: PathBuf,
}

impl FilePreferences {
    pub fn new(board_dir: impl Into<PathBuf>) -> Self {
        Self {
            board_dir: board_dir.into(),
        }
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<Vec<String>> {
        match load_local_config(&self.board_dir) {
            Ok(mut config) => config.group_order.remove(key),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable local.toml");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[String]) -> Result<(), PrefsError> {
        let mut config = load_local_config(&self.board_dir)?;
        config.group_order.insert(key.to_string(), value.to_vec());
        save_local_config(&self.board_dir, &config)
    }
}

/// Load per-user local preferences from `.rangeboard/local.toml`.
/// Returns `Ok(default)` if the file is absent; surfaces an error if the
/// file exists but cannot be parsed.
pub fn load_local_config(board_dir: &Path) -> Result<LocalConfig, PrefsError> {
    let path = board_dir.join("local.toml");
    if !path.exists() {
        return Ok(LocalConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(toml::from_str(&content)?)
}

/// Persist per-user local preferences to `.rangeboard/local.toml`.
/// A best-effort attempt is made to add `local.toml` to `.rangeboard/.gitignore`.
pub fn save_local_config(board_dir: &Path, config: &LocalConfig) -> Result<(), PrefsError> {
    let content = toml::to_string_pretty(config)?;
    fs::write(board_dir.join("local.toml"), content)?;
    if let Err(e) = ensure_local_gitignore(board_dir) {
        warn!(error = %e, "could not add local.toml to .gitignore");
    }
    Ok(())
}

/// Ensure `.rangeboard/.gitignore` contains a `local.toml` entry.
pub(crate) fn ensure_local_gitignore(board_dir: &Path) -> Result<(), PrefsError> {
    use std::io::{Read, Seek, Write};
    let path = board_dir.join(".gitignore");
    let entry = "local.toml";
    let mut file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    if content.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    file.seek(std::io::SeekFrom::End(0))?;
    if !content.is_empty() && !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{entry}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_order_key_format() {
        assert_eq!(
            group_order_key(BoardKind::Range, GroupingMode::DeliveryDrop),
            "range:delivery-drop"
        );
        assert_eq!(group_order_key(BoardKind::Samples, GroupingMode::Status), "samples:status");
    }

    #[test]
    fn test_memory_preferences_roundtrip() {
        let prefs = MemoryPreferences::default();
        assert_eq!(prefs.get("range:category"), None);
        prefs.set("range:category", &keys(&["Tops", "Bottoms"])).unwrap();
        assert_eq!(prefs.get("range:category"), Some(keys(&["Tops", "Bottoms"])));
    }

    #[test]
    fn test_load_local_config_absent_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_local_config(dir.path()).unwrap();
        assert_eq!(config, LocalConfig::default());
    }

    #[test]
    fn test_load_local_config_invalid_toml_returns_err() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("local.toml"), "group_order = [[[").unwrap();
        assert!(load_local_config(dir.path()).is_err());
    }

    #[test]
    fn test_file_preferences_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::new(dir.path());
        prefs.set("range:category", &keys(&["Dresses", "Tops"])).unwrap();
        prefs.set("range:delivery-drop", &keys(&["Drop 2", "Drop 1"])).unwrap();

        let reopened = FilePreferences::new(dir.path());
        assert_eq!(reopened.get("range:category"), Some(keys(&["Dresses", "Tops"])));
        assert_eq!(reopened.get("range:delivery-drop"), Some(keys(&["Drop 2", "Drop 1"])));
        assert_eq!(reopened.get("range:status"), None);
    }

    #[test]
    fn test_file_preferences_unreadable_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("local.toml"), "not = [valid").unwrap();
        let prefs = FilePreferences::new(dir.path());
        assert_eq!(prefs.get("range:category"), None);
        assert!(prefs.set("range:category", &keys(&["Tops"])).is_err());
    }

    #[test]
    fn test_save_local_config_creates_gitignore_with_entry() {
        let dir = tempfile::tempdir().unwrap();
        save_local_config(dir.path(), &LocalConfig::default()).unwrap();
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, "local.toml\n");
    }

    #[test]
    fn test_save_local_config_gitignore_entry_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        save_local_config(dir.path(), &LocalConfig::default()).unwrap();
        save_local_config(dir.path(), &LocalConfig::default()).unwrap();
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches("local.toml").count(), 1);
    }

    #[test]
    fn test_save_local_config_gitignore_separator_added_when_no_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.bak").unwrap();
        save_local_config(dir.path(), &LocalConfig::default()).unwrap();
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore, "*.bak\nlocal.toml\n");
    }
}
