//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, where session tokens are kept, and how concurrent
//! token refreshes are handled.
//!
//! Configuration is stored at `~/.config/cloudvault/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiClient, RefreshPolicy, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::auth::{
    FileTokenStorage, KeyringTokenStorage, MemoryTokenStorage, Session, TokenStorage,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "cloudvault";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "CLOUDVAULT_API_URL";

/// Environment variable overriding the token storage backend
pub const TOKEN_STORAGE_ENV: &str = "CLOUDVAULT_TOKEN_STORAGE";

/// Where session tokens are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown token storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    /// Origin used when printing share page links; defaults to `api_url`
    pub share_origin: Option<String>,
    pub last_username: Option<String>,
    pub token_storage: StorageBackend,
    pub refresh_policy: RefreshPolicy,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            share_origin: None,
            last_username: None,
            token_storage: StorageBackend::default(),
            refresh_policy: RefreshPolicy::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the stored configuration with environment overrides applied
    pub fn load() -> Result<Self> {
        let mut config = Self::load_stored()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_stored() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    /// Persist the last used username without saving any overrides
    pub fn remember_username(&mut self, username: &str) -> Result<()> {
        self.last_username = Some(username.to_string());
        let mut stored = Self::load_stored()?;
        stored.last_username = Some(username.to_string());
        stored.save()
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

    /// Apply `CLOUDVAULT_*` overrides read through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.is_empty()) {
            debug!(api_url = %url, "API URL overridden from environment");
            self.api_url = url;
        }
        if let Some(backend) = lookup(TOKEN_STORAGE_ENV).filter(|v| !v.is_empty()) {
            self.token_storage = backend.parse()?;
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

    pub fn share_origin(&self) -> &str {
        self.share_origin.as_deref().unwrap_or(&self.api_url)
    }

    /// Build the configured token storage backend
    pub fn token_storage(&self) -> Result<Box<dyn TokenStorage>> {
        Ok(match self.token_storage {
            StorageBackend::File => Box::new(FileTokenStorage::new(self.cache_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringTokenStorage::default()),
            StorageBackend::Memory => Box::new(MemoryTokenStorage::new()),
        })
    }

    /// Restore the session and build an API client from this configuration
    pub fn connect(&self) -> Result<ApiClient> {
        let session = Session::load(self.token_storage()?)?;
        ApiClient::configured(
            &self.api_url,
            session,
            self.request_timeout(),
            self.refresh_policy,
        )
    }
}
