//! Persistent storage for session data.
//!
//! Values are JSON files in one directory, by default the platform config
//! directory:
//!   - Linux: `~/.config/classroom/`
//!   - macOS: `~/Library/Application Support/classroom/`
//!   - Windows: `%APPDATA%\classroom\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const APP_DIR: &str = "classroom";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key/value store backed by one JSON file per key.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    dir: PathBuf,
}

impl SessionStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage under the platform config directory.
    pub fn default_location() -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoConfigDir)?;
        Ok(Self::new(config_dir.join(APP_DIR)))
    }

    /// `dir` if given, the platform location otherwise.
    pub fn at(dir: Option<&Path>) -> Result<Self, StorageError> {
        match dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Self::default_location(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }

    /// Save a value, creating the directory if needed.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.file_path(key), json)?;
        Ok(())
    }

    /// Load a value. Returns `None` if the key doesn't exist or the stored data
    /// no longer deserializes.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable stored value");
                None
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = std::fs::remove_file(self.file_path(key)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(key, error = %e, "failed to remove stored value");
            }
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_load_remove() {
        let dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(dir.path().join("nested"));

        storage.save("token", &"abc".to_string()).unwrap();
        assert!(storage.exists("token"));
        assert_eq!(storage.load::<String>("token").as_deref(), Some("abc"));

        storage.remove("token");
        assert!(!storage.exists("token"));
        assert_eq!(storage.load::<String>("token"), None);
        // removing twice is fine
        storage.remove("token");
    }

    #[test]
    fn keys_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(dir.path());
        storage.save("a/b:c", &1u32).unwrap();
        assert!(dir.path().join("a_b_c.json").exists());
    }

    #[test]
    fn corrupt_values_load_as_none() {
        let dir = TempDir::new().unwrap();
        let storage = SessionStorage::new(dir.path());
        std::fs::write(dir.path().join("session.json"), "{oops").unwrap();
        assert_eq!(storage.load::<u32>("session"), None);
    }
}
