//! Per-owner OAuth credential store with single-flight refresh.
//!
//! Tokens live behind a [`TokenStore`] (OS keyring in production, in-memory
//! in tests). `get_valid_token` refreshes transparently when less than the
//! safety margin remains; concurrent callers for the same owner wait on a
//! per-owner lock instead of issuing duplicate refresh requests -- some
//! providers invalidate the first token when a second refresh lands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::OAuthError;
use crate::sync::oauth::{self, OAuthConfig, OAuthTokens};
use crate::sync::types::SyncError;

const KEYRING_SERVICE: &str = "taskshoot";

/// Token persistence seam.
pub trait TokenStore: Send + Sync {
    fn load(&self, owner: &str) -> Result<Option<OAuthTokens>, OAuthError>;
    fn store(&self, owner: &str, tokens: &OAuthTokens) -> Result<(), OAuthError>;
    fn clear(&self, owner: &str) -> Result<(), OAuthError>;
}

/// OS-keyring-backed token store, one entry per owner.
pub struct KeyringTokenStore;

impl KeyringTokenStore {
    fn entry(owner: &str) -> Result<keyring::Entry, OAuthError> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("gcal_tokens:{owner}"))
            .map_err(|e| OAuthError::Store(e.to_string()))
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self, owner: &str) -> Result<Option<OAuthTokens>, OAuthError> {
        let entry = Self::entry(owner)?;
        match entry.get_password() {
            Ok(json) => {
                let tokens = serde_json::from_str(&json)
                    .map_err(|e| OAuthError::Store(e.to_string()))?;
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(OAuthError::Store(e.to_string())),
        }
    }

    fn store(&self, owner: &str, tokens: &OAuthTokens) -> Result<(), OAuthError> {
        let json = serde_json::to_string(tokens).map_err(|e| OAuthError::Store(e.to_string()))?;
        Self::entry(owner)?
            .set_password(&json)
            .map_err(|e| OAuthError::Store(e.to_string()))
    }

    fn clear(&self, owner: &str) -> Result<(), OAuthError> {
        match Self::entry(owner)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(OAuthError::Store(e.to_string())),
        }
    }
}

/// In-memory token store for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: StdMutex<HashMap<String, OAuthTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an owner with a token that never needs refreshing.
    pub fn with_static_token(owner: &str, access_token: &str) -> Self {
        let store = Self::new();
        store
            .store(
                owner,
                &OAuthTokens {
                    access_token: access_token.to_string(),
                    refresh_token: Some("refresh".to_string()),
                    expires_at: Some(chrono::Utc::now().timestamp() + 86_400),
                    token_type: "Bearer".to_string(),
                    scope: None,
                },
            )
            .unwrap();
        store
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, owner: &str) -> Result<Option<OAuthTokens>, OAuthError> {
        Ok(self.tokens.lock().unwrap().get(owner).cloned())
    }

    fn store(&self, owner: &str, tokens: &OAuthTokens) -> Result<(), OAuthError> {
        self.tokens
            .lock()
            .unwrap()
            .insert(owner.to_string(), tokens.clone());
        Ok(())
    }

    fn clear(&self, owner: &str) -> Result<(), OAuthError> {
        self.tokens.lock().unwrap().remove(owner);
        Ok(())
    }
}

/// Persist the OAuth client id/secret pair to the OS keyring.
pub fn store_client_credentials(client_id: &str, client_secret: &str) -> Result<(), OAuthError> {
    let set = |key: &str, value: &str| -> Result<(), OAuthError> {
        keyring::Entry::new(KEYRING_SERVICE, key)
            .and_then(|entry| entry.set_password(value))
            .map_err(|e| OAuthError::Store(e.to_string()))
    };
    set("google_client_id", client_id)?;
    set("google_client_secret", client_secret)
}

/// Load the stored OAuth client id/secret pair, if any.
pub fn load_client_credentials() -> Result<Option<(String, String)>, OAuthError> {
    let get = |key: &str| -> Result<Option<String>, OAuthError> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, key)
            .map_err(|e| OAuthError::Store(e.to_string()))?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(OAuthError::Store(e.to_string())),
        }
    };
    match (get("google_client_id")?, get("google_client_secret")?) {
        (Some(id), Some(secret)) => Ok(Some((id, secret))),
        _ => Ok(None),
    }
}

/// Holds OAuth tokens per owner and hands out valid access tokens.
pub struct CredentialStore {
    config: OAuthConfig,
    store: Arc<dyn TokenStore>,
    http: reqwest::Client,
    /// One refresh lock per owner; created lazily, never dropped.
    refresh_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(config: OAuthConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::new(),
            refresh_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Persist freshly obtained tokens for an owner.
    pub fn store_tokens(&self, owner: &str, tokens: &OAuthTokens) -> Result<(), OAuthError> {
        self.store.store(owner, tokens)
    }

    /// Drop stored tokens for an owner.
    pub fn clear_tokens(&self, owner: &str) -> Result<(), OAuthError> {
        self.store.clear(owner)
    }

    /// Whether any tokens are stored for an owner.
    pub fn is_authenticated(&self, owner: &str) -> bool {
        matches!(self.store.load(owner), Ok(Some(_)))
    }

    /// Return a valid access token, refreshing behind the per-owner lock
    /// when less than the safety margin remains.
    pub async fn get_valid_token(&self, owner: &str) -> Result<String, SyncError> {
        let tokens = self
            .store
            .load(owner)
            .map_err(|e| SyncError::Storage(e.to_string()))?
            .ok_or(SyncError::AuthExpired)?;

        if !oauth::is_expired(&tokens) {
            return Ok(tokens.access_token);
        }

        debug!(owner, "access token near expiry, refreshing");
        let refreshed = self.refresh(owner).await?;
        Ok(refreshed.access_token)
    }

    /// Refresh the owner's tokens. Concurrent callers wait for the in-flight
    /// refresh and then re-read the store rather than refreshing again.
    pub async fn refresh(&self, owner: &str) -> Result<OAuthTokens, SyncError> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        let current = self
            .store
            .load(owner)
            .map_err(|e| SyncError::Storage(e.to_string()))?
            .ok_or(SyncError::AuthExpired)?;
        if !oauth::is_expired(&current) {
            debug!(owner, "refresh already done by concurrent caller");
            return Ok(current);
        }

        let refresh = current.refresh_token.as_deref().ok_or_else(|| {
            warn!(owner, "no refresh token stored");
            SyncError::AuthExpired
        })?;

        match oauth::refresh_access_token(&self.http, &self.config, refresh).await {
            Ok(tokens) => {
                self.store
                    .store(owner, &tokens)
                    .map_err(|e| SyncError::Storage(e.to_string()))?;
                info!(owner, "access token refreshed");
                Ok(tokens)
            }
            Err(OAuthError::RefreshRejected(reason)) => {
                warn!(owner, %reason, "refresh token rejected; reconnect required");
                Err(SyncError::AuthExpired)
            }
            Err(e) => Err(SyncError::Storage(e.to_string())),
        }
    }

    fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap();
        locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
