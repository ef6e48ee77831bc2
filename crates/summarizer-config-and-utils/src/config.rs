//! Client configuration.

use crate::{AuthTimings, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Supabase project URL (override at compile time via SUPABASE_URL).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://summarizer.supabase.co",
};

/// Default Supabase anon key (override at compile time via SUPABASE_ANON_KEY).
pub const DEFAULT_SUPABASE_ANON_KEY: &str = match option_env!("SUPABASE_ANON_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Default summarizer backend (override at compile time via SUMMARIZER_API_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("SUMMARIZER_API_URL") {
    Some(url) => url,
    None => "http://localhost:5000",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "SUMMARIZER_LOG_LEVEL";
const ENV_SUPABASE_URL: &str = "SUMMARIZER_SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "SUMMARIZER_SUPABASE_ANON_KEY";
const ENV_API_BASE_URL: &str = "SUMMARIZER_API_URL";

/// Main client configuration, stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase anon key (public, safe to ship).
    #[serde(default = "default_supabase_anon_key")]
    pub supabase_anon_key: String,
    /// Summarizer backend base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Auth core timers.
    #[serde(default)]
    pub auth: AuthTimings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_anon_key() -> String {
    DEFAULT_SUPABASE_ANON_KEY.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_anon_key: default_supabase_anon_key(),
            api_base_url: default_api_base_url(),
            auth: AuthTimings::default(),
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load `config.json` from the state directory, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the state directory.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `SUMMARIZER_*` overrides from an arbitrary lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = non_empty(ENV_SUPABASE_URL) {
            self.supabase_url = url;
        }
        if let Some(key) = non_empty(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = key;
        }
        if let Some(url) = non_empty(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Get the backend base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_base_url).map_err(CoreError::from)
    }

    /// Supabase project reference: the first DNS label of the project host.
    ///
    /// `https://abcd1234.supabase.co` yields `abcd1234`.
    pub fn supabase_project_ref(&self) -> CoreResult<String> {
        let url = self.supabase_url()?;
        url.host_str()
            .and_then(|host| host.split('.').next())
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Config(format!("No host in {}", self.supabase_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
        assert_eq!(config.supabase_anon_key, DEFAULT_SUPABASE_ANON_KEY);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.auth, AuthTimings::default());
    }

    #[test]
    fn test_config_load_from_file_with_partial_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "auth": { "watchdog_interval_ms": 1000 } }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.auth.watchdog_interval_ms, 1000);
        assert_eq!(config.auth.init_timeout_ms, 8_000);
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.api_base_url = "https://summaries.example.com".to_string();
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.auth, AuthTimings::default());
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let env: HashMap<&str, &str> = [
            (ENV_LOG_LEVEL, "trace"),
            (ENV_API_BASE_URL, "https://api.example.com"),
            (ENV_SUPABASE_URL, "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.supabase_url, DEFAULT_SUPABASE_URL);
    }

    #[test]
    fn test_supabase_project_ref() {
        let mut config = Config::default();
        config.supabase_url = "https://abcd1234.supabase.co".to_string();
        assert_eq!(config.supabase_project_ref().unwrap(), "abcd1234");
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.supabase_url = "not a valid url".to_string();

        assert!(config.supabase_url().is_err());
        assert!(config.supabase_project_ref().is_err());
    }
}
