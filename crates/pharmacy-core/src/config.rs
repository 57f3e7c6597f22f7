//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, request timeout, where the session token is
//! kept, and the last email used to log in.
//!
//! Configuration is stored at `~/.config/pharmacy-client/config.json`.
//! `PHARMACY_API_URL` and `PHARMACY_STORAGE` override the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::client::{DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
use crate::auth::{FileTokenStorage, KeyringTokenStorage, MemoryTokenStorage, TokenStorage};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "pharmacy-client";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "PHARMACY_API_URL";
const ENV_STORAGE: &str = "PHARMACY_STORAGE";

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "keyring" => Ok(StorageKind::Keyring),
            "memory" => Ok(StorageKind::Memory),
            other => Err(anyhow::anyhow!("Unknown token storage '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub storage: StorageKind,
    pub log_dir: Option<PathBuf>,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            storage: StorageKind::default(),
            log_dir: None,
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        debug!(base_url = %config.api_base_url, storage = ?config.storage, "Config loaded");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(kind) = var(ENV_STORAGE) {
            self.storage = kind
                .parse()
                .with_context(|| format!("Invalid {}", ENV_STORAGE))?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the token storage selected by `storage`.
    pub fn token_storage(&self) -> Result<Arc<dyn TokenStorage>> {
        let storage: Arc<dyn TokenStorage> = match self.storage {
            StorageKind::File => Arc::new(FileTokenStorage::new(self.cache_dir()?)),
            StorageKind::Keyring => Arc::new(KeyringTokenStorage::new()),
            StorageKind::Memory => Arc::new(MemoryTokenStorage::new()),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage, StorageKind::File);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage":"keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageKind::Keyring);
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|key| match key {
                ENV_API_URL => Some("https://pharmacy.example/api".to_string()),
                ENV_STORAGE => Some("Memory".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.api_base_url, "https://pharmacy.example/api");
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn test_invalid_storage_env_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_STORAGE).then(|| "cloud".to_string()));
        assert!(result.is_err());
    }
}
