//! File system layout of the client's state directory.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Name of the state directory under the user's home.
const STATE_DIR_NAME: &str = ".summarizer";

/// Resolves every file the client reads or writes.
///
/// ```text
/// ~/.summarizer/
///   config.json
///   storage/local.json     persisted across runs
///   storage/session.json   scoped to one login session
///   logs/client.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Paths rooted at `~/.summarizer`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(STATE_DIR_NAME),
        })
    }

    /// Paths rooted at a custom directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("storage")
    }

    /// Long-lived key/value area (the browser's localStorage equivalent).
    pub fn local_storage_file(&self) -> PathBuf {
        self.storage_dir().join("local.json")
    }

    /// Session-scoped key/value area (the browser's sessionStorage equivalent).
    pub fn session_storage_file(&self) -> PathBuf {
        self.storage_dir().join("session.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.storage_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-summarizer");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.local_storage_file(), base.join("storage/local.json"));
        assert_eq!(paths.session_storage_file(), base.join("storage/session.json"));
        assert_eq!(paths.log_file(), base.join("logs/client.jsonl"));
    }

    #[test]
    fn test_paths_default_uses_home() {
        if let (Ok(paths), Some(home)) = (Paths::new(), dirs::home_dir()) {
            assert_eq!(paths.base_dir(), &home.join(".summarizer"));
        }
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("summarizer");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.storage_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
