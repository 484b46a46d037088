use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::storage::{Credentials, MemoryTokenStorage, TokenStorage};
use crate::models::TokenPair;

/// Coarse session state, published to subscribers on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    LoggedOut,
    /// Tokens were cleared because a refresh failed; the user must log in again.
    ForcedLogout,
}

/// What happened to a freshly refreshed access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenUpdate {
    Stored,
    /// A concurrent refresh rotated the refresh token first; its access
    /// token is kept.
    Superseded(String),
    /// The session was cleared while the refresh was in flight.
    Cleared,
}

struct SessionInner {
    credentials: RwLock<Credentials>,
    storage: Box<dyn TokenStorage>,
    state: watch::Sender<SessionState>,
}

/// Shared handle to the current token pair and its persistent storage.
/// Clone is cheap - all clones see the same credentials.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a session over `storage`, restoring any persisted tokens.
    pub fn load(storage: Box<dyn TokenStorage>) -> Result<Self> {
        let credentials = storage
            .load()
            .context("Failed to load stored credentials")?
            .normalized();
        debug!(
            has_access = credentials.access.is_some(),
            has_refresh = credentials.refresh.is_some(),
            "Session loaded"
        );
        Ok(Self::with_credentials(storage, credentials))
    }

    /// A session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_credentials(Box::new(MemoryTokenStorage::new()), Credentials::default())
    }

    fn with_credentials(storage: Box<dyn TokenStorage>, credentials: Credentials) -> Self {
        let initial = if credentials.access.is_some() || credentials.refresh.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::LoggedOut
        };
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(SessionInner {
                credentials: RwLock::new(credentials),
                storage,
                state,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.inner.credentials.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.inner.credentials.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh.clone()
    }

    pub fn credentials(&self) -> Credentials {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access.is_some()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Watch for logins, logouts and forced logouts.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Replace both tokens after a login.
    pub fn establish(&self, tokens: TokenPair) -> Result<()> {
        let credentials = Credentials::new(tokens.access, tokens.refresh).normalized();
        let persisted = {
            let mut current = self.write();
            *current = credentials;
            self.inner.storage.save(&current)
        };
        self.inner.state.send_replace(SessionState::Authenticated);
        info!("Session established");
        persisted.context("Failed to persist credentials")
    }

    /// Store an access token minted from the refresh token `minted_from`,
    /// plus the rotated refresh token when the server sent one.
    ///
    /// Nothing is written unless `minted_from` is still the stored refresh
    /// token, so a refresh that finishes after the session was cleared cannot
    /// bring back half a token pair.
    pub fn update_tokens(
        &self,
        minted_from: &str,
        access: String,
        refresh: Option<String>,
    ) -> TokenUpdate {
        let mut current = self.write();
        match (current.refresh.as_deref(), current.access.as_ref()) {
            (None, _) => return TokenUpdate::Cleared,
            (Some(stored), Some(newer)) if stored != minted_from => {
                return TokenUpdate::Superseded(newer.clone());
            }
            _ => {}
        }

        current.access = Some(access).filter(|t| !t.is_empty());
        if let Some(refresh) = refresh.filter(|t| !t.is_empty()) {
            current.refresh = Some(refresh);
        }
        if let Err(e) = self.inner.storage.save(&current) {
            warn!(error = %e, "Refreshed credentials could not be persisted");
        }
        TokenUpdate::Stored
    }

    /// Drop both tokens after an explicit logout.
    pub fn logout(&self) {
        self.clear(SessionState::LoggedOut);
        info!("Logged out");
    }

    /// Drop both tokens because they can no longer be refreshed.
    pub fn force_logout(&self) {
        self.clear(SessionState::ForcedLogout);
        warn!("Session expired, credentials cleared");
    }

    fn clear(&self, next: SessionState) {
        {
            let mut current = self.write();
            *current = Credentials::default();
            if let Err(e) = self.inner.storage.clear() {
                warn!(error = %e, "Failed to clear stored credentials");
            }
        }
        self.inner.state.send_replace(next);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &*self.read())
            .field("state", &self.state())
            .finish()
    }
}
