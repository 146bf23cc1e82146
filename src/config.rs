//! Configuration loading and persistence.
//!
//! Reads and writes `config.json` in the mate config directory, then
//! layers `MATE_*` environment overrides on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::constants::{DEFAULT_SERVER_URL, RESPONSE_TIMEOUT};
use crate::sprite::SpriteMapper;
use crate::transport::ReconnectPolicy;

const CONFIG_FILE: &str = "config.json";

/// Configuration for the mate client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Backend WebSocket endpoint. `http(s)://` is rewritten to `ws(s)://`.
    pub server_url: String,
    /// Directory holding decoded atlas images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_dir: Option<PathBuf>,
    /// Reconnection behaviour.
    pub reconnect: ReconnectPolicy,
    /// How long CLI commands wait for a response, in seconds.
    pub response_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            asset_dir: None,
            reconnect: ReconnectPolicy::default(),
            response_timeout_secs: RESPONSE_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `MATE_CONFIG_DIR` env var: explicit override
    /// 2. `MATE_ENV=test`: `tmp/mate-test` in the repo
    /// 3. Default: platform config dir (Linux: ~/.config/mate)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("MATE_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_test_mode() {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/mate-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("mate")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of `config.json` inside [`Self::config_dir`].
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields the defaults; a broken one is an error.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Apply `MATE_*` overrides looked up through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = lookup("MATE_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(asset_dir) = lookup("MATE_ASSET_DIR") {
            self.asset_dir = Some(PathBuf::from(asset_dir));
        }

        if let Some(max_retries) = lookup("MATE_MAX_RETRIES") {
            match max_retries.parse::<u32>() {
                Ok(max) => self.reconnect.max_retries = max,
                Err(_) => log::warn!("Ignoring MATE_MAX_RETRIES={}", max_retries),
            }
        }

        if let Some(timeout) = lookup("MATE_RESPONSE_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.response_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring MATE_RESPONSE_TIMEOUT={}", timeout),
            }
        }
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Writes pretty JSON to `path`, readable by the owner only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Endpoint with a WebSocket scheme.
    #[must_use]
    pub fn ws_url(&self) -> String {
        crate::ws::http_to_ws_scheme(&self.server_url)
    }

    /// Response wait as a [`Duration`].
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Sprite mapper rooted at `asset_dir`.
    #[must_use]
    pub fn sprite_mapper(&self) -> SpriteMapper {
        SpriteMapper::new(self.asset_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "ws://localhost:3000/ws");
        assert_eq!(config.response_timeout_secs, 30);
        assert!(config.reconnect.enabled);
        assert!(config.asset_dir.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("config.json")).expect("load");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.server_url = "wss://mate.example/ws".to_string();
        config.asset_dir = Some(PathBuf::from("/srv/assets"));
        config.reconnect.max_retries = 2;
        config.save_to(&path).expect("save");

        assert_eq!(Config::load_from(&path).expect("load"), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_save_lands_in_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::env::set_var("MATE_CONFIG_DIR", dir.path());

        let mut config = Config::default();
        config.response_timeout_secs = 5;
        config.save().expect("save");

        assert_eq!(
            Config::config_path().expect("path"),
            dir.path().join("config.json")
        );
        assert_eq!(
            Config::load_from(&dir.path().join("config.json")).expect("load"),
            config
        );
        std::env::remove_var("MATE_CONFIG_DIR");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"reconnect":{"max_retries":1}}"#).expect("write");

        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.reconnect.max_retries, 1);
        assert!(config.reconnect.enabled);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").expect("write");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MATE_SERVER_URL", "https://mate.example/ws"),
            ("MATE_ASSET_DIR", "/tmp/assets"),
            ("MATE_MAX_RETRIES", "3"),
            ("MATE_RESPONSE_TIMEOUT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.ws_url(), "wss://mate.example/ws");
        assert_eq!(config.asset_dir, Some(PathBuf::from("/tmp/assets")));
        assert_eq!(config.reconnect.max_retries, 3);
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
    }
}
