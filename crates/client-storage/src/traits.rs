//! Storage trait definitions.

use crate::StorageResult;

/// A string-to-string store with browser storage semantics.
pub trait KeyValueStore: Send + Sync {
    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// All keys currently stored
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove every key
    fn clear(&self) -> StorageResult<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}
