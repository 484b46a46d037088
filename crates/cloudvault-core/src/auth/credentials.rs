use anyhow::{Context, Result};
use keyring::Entry;

use super::storage::{Credentials, TokenStorage};

const SERVICE_NAME: &str = "cloudvault";

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Token storage in the OS keychain, one entry per token.
pub struct KeyringTokenStorage {
    service: String,
}

impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringTokenStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(token) => self
                .entry(key)?
                .set_password(token)
                .context("Failed to store token in keychain"),
            None => self.delete(key),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

impl TokenStorage for KeyringTokenStorage {
    fn load(&self) -> Result<Credentials> {
        Ok(Credentials {
            access: self.read(ACCESS_TOKEN_KEY)?,
            refresh: self.read(REFRESH_TOKEN_KEY)?,
        }
        .normalized())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        self.write(ACCESS_TOKEN_KEY, credentials.access.as_deref())?;
        self.write(REFRESH_TOKEN_KEY, credentials.refresh.as_deref())
    }

    fn clear(&self) -> Result<()> {
        // Attempt both deletes even if the first fails
        let access = self.delete(ACCESS_TOKEN_KEY);
        let refresh = self.delete(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }
}
