use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{JoytaskError, Result};

/// Returns the path of `config.toml`.
///
/// 1. `JOYTASK_CONFIG` environment variable.
/// 2. `~/.config/joytask/config.toml` (on Linux).
/// 3. `./joytask.toml` (fallback).
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("JOYTASK_CONFIG") {
        return PathBuf::from(path);
    }
    match dirs::config_dir() {
        Some(dir) => dir.join("joytask").join("config.toml"),
        None => PathBuf::from("joytask.toml"),
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("joytask")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub data: DataConfig,
    /// `tracing` filter directive, e.g. `info` or `joytask=debug`.
    pub log_level: Option<String>,
}

/// Hosted backend credentials.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig { dir: default_data_dir() }
    }
}

impl Config {
    /// Loads the config file (if any) and applies environment overrides.
    pub fn load() -> Config {
        let mut config = Config::load_from(&config_path());
        config.apply_env();
        config
    }

    /// Reads a config file. Missing or malformed files give the defaults.
    pub fn load_from(path: &Path) -> Config {
        let Ok(content) = fs::read_to_string(path) else {
            return Config::default();
        };
        toml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
            Config::default()
        })
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.backend.anon_key = key;
        }
        if let Some(dir) = std::env::var_os("JOYTASK_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }
    }

    pub fn session_path(&self) -> PathBuf {
        self.data.dir.join("session.json")
    }
}

impl BackendConfig {
    /// Ensures both the endpoint and the key are set.
    pub fn require(&self) -> Result<&BackendConfig> {
        if self.url.trim().is_empty() {
            return Err(JoytaskError::Config(
                "backend url missing: set [backend] url or SUPABASE_URL".to_string(),
            ));
        }
        if self.anon_key.trim().is_empty() {
            return Err(JoytaskError::Config(
                "backend key missing: set [backend] anon_key or SUPABASE_ANON_KEY".to_string(),
            ));
        }
        Ok(self)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "log_level = \"debug\"\n[backend]\nurl = \"https://demo.supabase.co/\"\nanon_key = \"k\"\n[data]\ndir = \"/tmp/joy\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.backend.require().unwrap().base_url(), "https://demo.supabase.co");
        assert_eq!(config.data.dir, PathBuf::from("/tmp/joy"));
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[backend\nurl=").unwrap();
        let config = Config::load_from(&path);
        assert!(config.backend.url.is_empty());
    }

    #[test]
    fn test_missing_backend_is_an_error() {
        let err = BackendConfig::default().require().unwrap_err();
        assert!(matches!(err, JoytaskError::Config(_)));
        let half = BackendConfig { url: "https://x".into(), anon_key: " ".into() };
        assert!(half.require().is_err());
    }
}
