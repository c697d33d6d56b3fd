//! Preference stores.
//!
//! A datastore exposes a small key/value preference store alongside the
//! document records; the tag index lives there. `set` stages a value in
//! memory and `commit` makes the staged state durable.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::DatastoreError;

#[async_trait]
pub trait PrefsProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    /// Makes the staged state durable.
    async fn commit(&self) -> Result<(), DatastoreError>;
}

/// Preference store backed by process memory. Commit is a no-op.
pub struct MemoryPrefs {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPrefs {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryPrefs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrefsProvider for MemoryPrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    async fn commit(&self) -> Result<(), DatastoreError> {
        Ok(())
    }
}

/// Preference store persisted as a single JSON file.
pub struct DiskPrefs {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl DiskPrefs {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Loads the persisted state. An absent file means an empty store.
    pub fn load(&self) -> Result<(), DatastoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DatastoreError::Io(self.path.clone(), e)),
        };

        let loaded: BTreeMap<String, String> = serde_json::from_str(&contents)
            .map_err(|e| DatastoreError::Corrupt(self.path.clone(), e.to_string()))?;

        *self.values.write() = loaded;
        Ok(())
    }
}

#[async_trait]
impl PrefsProvider for DiskPrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    async fn commit(&self) -> Result<(), DatastoreError> {
        let serialized = {
            let values = self.values.read();
            serde_json::to_string_pretty(&*values)
                .map_err(|e| DatastoreError::Prefs(e.to_string()))?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| DatastoreError::Io(parent.to_path_buf(), e))?;
        }
        fs::write(&self.path, serialized).map_err(|e| DatastoreError::Io(self.path.clone(), e))
    }
}

/// Arc alias used at the datastore boundary.
pub type SharedPrefs = Arc<dyn PrefsProvider>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_prefs_roundtrip() {
        let prefs = MemoryPrefs::new();
        assert!(prefs.get("tags").is_none());

        prefs.set("tags", "{}".to_string());
        prefs.commit().await.unwrap();
        assert_eq!(prefs.get("tags").as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_disk_prefs_persist_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");

        let prefs = DiskPrefs::new(path.clone());
        prefs.set("created", "2026-01-01T00:00:00Z".to_string());
        prefs.commit().await.unwrap();

        let reloaded = DiskPrefs::new(path);
        reloaded.load().unwrap();
        assert_eq!(
            reloaded.get("created").as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_disk_prefs_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let prefs = DiskPrefs::new(temp_dir.path().join("prefs.json"));
        prefs.load().unwrap();
        assert!(prefs.get("anything").is_none());
    }

    #[tokio::test]
    async fn test_disk_prefs_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();

        let prefs = DiskPrefs::new(path);
        assert!(matches!(prefs.load(), Err(DatastoreError::Corrupt(_, _))));
    }
}
