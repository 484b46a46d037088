use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Session file name in the cache directory
const SESSION_FILE: &str = "session.json";

/// The access/refresh token pair as persisted between runs.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "access_token", default)]
    pub access: Option<String>,
    #[serde(rename = "refresh_token", default)]
    pub refresh: Option<String>,
}

impl Credentials {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    /// Empty strings count as absent.
    pub fn normalized(self) -> Self {
        Self {
            access: self.access.filter(|t| !t.is_empty()),
            refresh: self.refresh.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

// Never print token values
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access", &self.access.as_ref().map(|_| "<redacted>"))
            .field("refresh", &self.refresh.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Durable home for the token pair.
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Result<Credentials>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Stores tokens as JSON in the cache directory.
pub struct FileTokenStorage {
    cache_dir: PathBuf,
}

impl FileTokenStorage {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenStorage for FileTokenStorage {
    fn load(&self) -> Result<Credentials> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(Credentials::default());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let credentials: Credentials =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(credentials.normalized())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&path, contents).context("Failed to write session file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Keeps tokens for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryTokenStorage {
    credentials: Mutex<Credentials>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(credentials),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Credentials> {
        self.credentials.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn load(&self) -> Result<Credentials> {
        Ok(self.lock().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.lock() = credentials.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.lock() = Credentials::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_uses_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().to_path_buf());

        storage.save(&Credentials::new("acc", "ref")).unwrap();
        let raw = std::fs::read_to_string(dir.path().join(SESSION_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["access_token"], "acc");
        assert_eq!(value["refresh_token"], "ref");

        assert_eq!(storage.load().unwrap(), Credentials::new("acc", "ref"));
    }

    #[test]
    fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("nested"));
        assert!(storage.load().unwrap().is_empty());
        // Clearing a session that was never saved is fine
        storage.clear().unwrap();
    }

    #[test]
    fn test_file_storage_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().to_path_buf());
        storage.save(&Credentials::new("acc", "ref")).unwrap();
        storage.clear().unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_empty_tokens_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SESSION_FILE),
            r#"{"access_token": "", "refresh_token": "ref"}"#,
        )
        .unwrap();
        let storage = FileTokenStorage::new(dir.path().to_path_buf());
        let loaded = storage.load().unwrap();
        assert_eq!(loaded.access, None);
        assert_eq!(loaded.refresh.as_deref(), Some("ref"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", Credentials::new("secret-access", "secret-refresh"));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
