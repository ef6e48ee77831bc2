//! High-level API over the two storage areas.

use crate::{FileStorage, KeyValueStore, MemoryStorage, StorageResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Which of the two areas a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Survives restarts (browser localStorage).
    Local,
    /// Scoped to one login session (browser sessionStorage).
    Session,
}

/// The client's persisted state: a long-lived area and a session area.
#[derive(Clone)]
pub struct ClientStorage {
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

impl ClientStorage {
    pub fn new(local: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { local, session }
    }

    /// Both areas in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// Both areas as JSON files.
    pub fn with_files(local_path: impl AsRef<Path>, session_path: impl AsRef<Path>) -> Self {
        Self::new(
            Arc::new(FileStorage::new(local_path.as_ref())),
            Arc::new(FileStorage::new(session_path.as_ref())),
        )
    }

    pub fn area(&self, area: StorageArea) -> &dyn KeyValueStore {
        match area {
            StorageArea::Local => self.local.as_ref(),
            StorageArea::Session => self.session.as_ref(),
        }
    }

    pub fn local(&self) -> &dyn KeyValueStore {
        self.local.as_ref()
    }

    pub fn session(&self) -> &dyn KeyValueStore {
        self.session.as_ref()
    }

    // ==========================================
    // Flags
    // ==========================================

    pub fn set_flag(&self, area: StorageArea, key: &str) -> StorageResult<()> {
        self.area(area).set(key, "true")
    }

    /// A flag is set when its key exists with any value other than "false".
    pub fn flag(&self, area: StorageArea, key: &str) -> StorageResult<bool> {
        Ok(self
            .area(area)
            .get(key)?
            .is_some_and(|value| value != "false"))
    }

    /// Remove several keys from one area, returning how many existed.
    pub fn remove_keys(&self, area: StorageArea, keys: &[&str]) -> StorageResult<usize> {
        let store = self.area(area);
        let mut removed = 0;
        for key in keys {
            if store.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ==========================================
    // Timestamps and TTL markers
    // ==========================================

    pub fn set_timestamp(
        &self,
        area: StorageArea,
        key: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.area(area).set(key, &at.to_rfc3339())
    }

    /// Read a timestamp; unparsable values are treated as absent.
    pub fn timestamp(&self, area: StorageArea, key: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.area(area).get(key)? else {
            return Ok(None);
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Ok(Some(parsed.with_timezone(&Utc))),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring malformed timestamp");
                Ok(None)
            }
        }
    }

    /// Whether a marker was set less than `ttl` before `now`.
    pub fn is_fresh(
        &self,
        area: StorageArea,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let Some(at) = self.timestamp(area, key)? else {
            return Ok(false);
        };
        let age = now.signed_duration_since(at);
        Ok(age >= chrono::Duration::zero()
            && age.to_std().map(|age| age < ttl).unwrap_or(false))
    }

    // ==========================================
    // Structured records
    // ==========================================

    pub fn write_json<T: Serialize>(
        &self,
        area: StorageArea,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        self.area(area).set(key, &serde_json::to_string(value)?)
    }

    pub fn read_json<T: DeserializeOwned>(
        &self,
        area: StorageArea,
        key: &str,
    ) -> StorageResult<Option<T>> {
        match self.area(area).get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // ==========================================
    // Clear
    // ==========================================

    /// Wipe both areas.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.local.clear()?;
        self.session.clear()?;
        Ok(())
    }
}

impl std::fmt::Debug for ClientStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStorage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        attempts: u32,
    }

    #[test]
    fn test_flags_are_scoped_to_their_area() {
        let storage = ClientStorage::in_memory();

        storage
            .set_flag(StorageArea::Local, "app_has_logged_in_before")
            .unwrap();

        assert!(storage
            .flag(StorageArea::Local, "app_has_logged_in_before")
            .unwrap());
        assert!(!storage
            .flag(StorageArea::Session, "app_has_logged_in_before")
            .unwrap());
    }

    #[test]
    fn test_flag_false_string_is_unset() {
        let storage = ClientStorage::in_memory();
        storage.local().set("auth_loop_detected", "false").unwrap();
        assert!(!storage.flag(StorageArea::Local, "auth_loop_detected").unwrap());
    }

    #[test]
    fn test_remove_keys_counts_existing() {
        let storage = ClientStorage::in_memory();
        storage.set_flag(StorageArea::Local, "a").unwrap();
        storage.set_flag(StorageArea::Local, "b").unwrap();

        let removed = storage
            .remove_keys(StorageArea::Local, &["a", "b", "c"])
            .unwrap();
        assert_eq!(removed, 2);
        assert!(storage.local().keys().unwrap().is_empty());
    }

    #[test]
    fn test_ttl_marker_freshness() {
        let storage = ClientStorage::in_memory();
        let set_at = Utc::now();
        storage
            .set_timestamp(StorageArea::Session, "recent_auth_recovery", set_at)
            .unwrap();

        let ttl = Duration::from_secs(60);
        let fresh = set_at + chrono::Duration::seconds(30);
        let stale = set_at + chrono::Duration::seconds(61);

        assert!(storage
            .is_fresh(StorageArea::Session, "recent_auth_recovery", ttl, fresh)
            .unwrap());
        assert!(!storage
            .is_fresh(StorageArea::Session, "recent_auth_recovery", ttl, stale)
            .unwrap());
        assert!(!storage
            .is_fresh(StorageArea::Session, "missing", ttl, fresh)
            .unwrap());
    }

    #[test]
    fn test_malformed_timestamp_reads_as_absent() {
        let storage = ClientStorage::in_memory();
        storage.session().set("auth_init_start", "yesterday").unwrap();

        assert!(storage
            .timestamp(StorageArea::Session, "auth_init_start")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_json_records() {
        let storage = ClientStorage::in_memory();
        assert!(storage
            .read_json::<Record>(StorageArea::Session, "record")
            .unwrap()
            .is_none());

        storage
            .write_json(StorageArea::Session, "record", &Record { attempts: 2 })
            .unwrap();
        assert_eq!(
            storage.read_json(StorageArea::Session, "record").unwrap(),
            Some(Record { attempts: 2 })
        );
    }

    #[test]
    fn test_clear_all_with_files() {
        let dir = tempdir().unwrap();
        let storage = ClientStorage::with_files(
            dir.path().join("local.json"),
            dir.path().join("session.json"),
        );
        storage.set_flag(StorageArea::Local, "x").unwrap();
        storage.set_flag(StorageArea::Session, "y").unwrap();

        storage.clear_all().unwrap();

        assert!(!storage.flag(StorageArea::Local, "x").unwrap());
        assert!(!storage.flag(StorageArea::Session, "y").unwrap());
    }
}
