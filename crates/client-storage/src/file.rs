//! JSON file storage backend.

use crate::{KeyValueStore, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage persisted as a single JSON object on disk.
///
/// Every mutation rewrites the file through a sibling temp file and a rename,
/// so readers never observe a half-written document.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Encoding(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>) -> T,
    ) -> StorageResult<T> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        let result = apply(&mut map);
        self.write_map(&map)?;
        Ok(result)
    }
}

impl KeyValueStore for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_map(&map)?;
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.into_keys().collect())
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Storage file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage").join("local.json");

        let storage = FileStorage::new(&path);
        storage.set("app_has_logged_in_before", "true").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(
            reopened.get("app_has_logged_in_before").unwrap(),
            Some("true".to_string())
        );
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));

        assert_eq!(storage.get("anything").unwrap(), None);
        assert!(storage.keys().unwrap().is_empty());
        assert!(!storage.delete("anything").unwrap());
    }

    #[test]
    fn test_file_storage_clear_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = FileStorage::new(&path);
        storage.set("auth_init_complete", "true").unwrap();
        assert!(path.exists());

        storage.clear().unwrap();
        assert!(!path.exists());
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(storage.get("key"), Err(StorageError::Encoding(_))));
    }
}
