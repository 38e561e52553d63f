//! Auth token store.
//!
//! Holds the signed-in user, access token and refresh token, persists them
//! under [`keys::AUTH`], and broadcasts the authenticated flag on a
//! `tokio::sync::watch` channel. The cart store reacts to that flag but does
//! not own it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use cartsync_core::{PhoneNumber, UserId};

use crate::storage::{SharedStore, StorageError, keys, load_json, save_json};

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens and user for an authenticated session.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone)]
pub struct AuthSession {
    /// Account the tokens belong to.
    pub user: Option<AuthUser>,
    /// Bearer token for API requests.
    pub access_token: SecretString,
    /// Token used to obtain a new access token.
    pub refresh_token: Option<SecretString>,
    /// Access token lifetime in seconds, if the server reported one.
    pub expires_in: Option<i64>,
    /// Unix timestamp when the access token was obtained.
    pub obtained_at: i64,
}

impl AuthSession {
    /// A session obtained now.
    #[must_use]
    pub fn new(
        user: Option<AuthUser>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            user,
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
            expires_in: None,
            obtained_at: Utc::now().timestamp(),
        }
    }

    /// Set the access token lifetime.
    #[must_use]
    pub const fn with_expires_in(mut self, expires_in: i64) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Check if the access token is expired (with 60s buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_in.is_some_and(|expires_in| {
            let now = Utc::now().timestamp();
            let expires_at = self.obtained_at + expires_in;
            now >= (expires_at - EXPIRY_BUFFER_SECS)
        })
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user", &self.user)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// On-disk layout of the auth key.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedAuth {
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    is_authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    obtained_at: Option<i64>,
}

impl PersistedAuth {
    fn from_session(session: &AuthSession) -> Self {
        Self {
            user: session.user.clone(),
            token: Some(session.access_token.expose_secret().to_string()),
            refresh_token: session
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            is_authenticated: true,
            expires_in: session.expires_in,
            obtained_at: Some(session.obtained_at),
        }
    }

    fn into_session(self) -> Option<AuthSession> {
        if !self.is_authenticated {
            return None;
        }
        let token = self.token.filter(|t| !t.is_empty())?;
        Some(AuthSession {
            user: self.user,
            access_token: SecretString::from(token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_in: self.expires_in,
            obtained_at: self.obtained_at.unwrap_or_else(|| Utc::now().timestamp()),
        })
    }
}

/// Holds the current auth session and notifies subscribers when the
/// authenticated flag flips.
///
/// Cheaply cloneable via `Arc`; all clones share one session.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<AuthStoreInner>,
}

struct AuthStoreInner {
    storage: SharedStore,
    session: Mutex<Option<AuthSession>>,
    changes: watch::Sender<bool>,
}

impl AuthStore {
    /// Create an unauthenticated store without reading storage.
    #[must_use]
    pub fn new(storage: SharedStore) -> Self {
        Self::with_session(storage, None)
    }

    /// Create a store from whatever session was persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn restore(storage: SharedStore) -> Result<Self, StorageError> {
        let session = load_json::<PersistedAuth>(storage.as_ref(), keys::AUTH)?
            .and_then(PersistedAuth::into_session);
        debug!(authenticated = session.is_some(), "Restored auth session");
        Ok(Self::with_session(storage, session))
    }

    fn with_session(storage: SharedStore, session: Option<AuthSession>) -> Self {
        let (changes, _) = watch::channel(session.is_some());
        Self {
            inner: Arc::new(AuthStoreInner {
                storage,
                session: Mutex::new(session),
                changes,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if a session with an access token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    /// A copy of the current session.
    #[must_use]
    pub fn session(&self) -> Option<AuthSession> {
        self.lock().clone()
    }

    /// The signed-in user, if known.
    #[must_use]
    pub fn user(&self) -> Option<AuthUser> {
        self.lock().as_ref().and_then(|s| s.user.clone())
    }

    /// The current access token.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.lock().as_ref().map(|s| s.access_token.clone())
    }

    /// The current refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.lock().as_ref().and_then(|s| s.refresh_token.clone())
    }

    /// Returns `true` if the held access token is past (or near) expiry.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.lock().as_ref().is_some_and(AuthSession::is_expired)
    }

    /// Subscribe to changes of the authenticated flag.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.changes.subscribe()
    }

    /// Store a new session and announce authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted. The in-memory
    /// session is set regardless.
    pub fn login(&self, session: AuthSession) -> Result<(), StorageError> {
        let persisted = PersistedAuth::from_session(&session);
        let user_id = session.user.as_ref().map(|u| u.id.to_string());
        *self.lock() = Some(session);
        info!(user_id = user_id.as_deref().unwrap_or("unknown"), "Logged in");
        self.notify(true);
        save_json(self.inner.storage.as_ref(), keys::AUTH, &persisted)
    }

    /// Replace the tokens after a refresh, keeping the user.
    ///
    /// A `None` refresh token keeps the previous one. Does nothing if the
    /// session was cleared while the refresh was in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    pub fn update_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
    ) -> Result<(), StorageError> {
        let persisted = {
            let mut guard = self.lock();
            let Some(session) = guard.as_mut() else {
                debug!("Session cleared during refresh; dropping new tokens");
                return Ok(());
            };
            session.access_token = SecretString::from(access_token);
            if let Some(refresh) = refresh_token {
                session.refresh_token = Some(SecretString::from(refresh));
            }
            session.expires_in = expires_in;
            session.obtained_at = Utc::now().timestamp();
            PersistedAuth::from_session(session)
        };
        save_json(self.inner.storage.as_ref(), keys::AUTH, &persisted)
    }

    /// Clear the session, purge it from storage and announce logout.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted session cannot be removed. The
    /// in-memory session is cleared regardless.
    pub fn logout(&self) -> Result<(), StorageError> {
        let was_authenticated = self.lock().take().is_some();
        if was_authenticated {
            info!("Logged out");
        }
        self.notify(false);
        self.inner.storage.remove(keys::AUTH)
    }

    fn notify(&self, authenticated: bool) {
        self.inner.changes.send_if_modified(|current| {
            if *current == authenticated {
                false
            } else {
                *current = authenticated;
                true
            }
        });
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::new("u1"),
            name: Some("Ada".to_string()),
            phone: Some(PhoneNumber::parse("+2348035550100").unwrap()),
            email: None,
        }
    }

    #[test]
    fn test_login_persists_and_notifies() {
        let storage = Arc::new(MemoryStore::new());
        let auth = AuthStore::new(storage.clone());
        let rx = auth.subscribe();
        assert!(!*rx.borrow());

        auth.login(AuthSession::new(Some(user()), "tok", Some("ref".to_string())))
            .unwrap();

        assert!(auth.is_authenticated());
        assert!(*rx.borrow());
        let raw = storage.get(keys::AUTH).unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["token"], "tok");
        assert_eq!(json["refreshToken"], "ref");
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["user"]["id"], "u1");
    }

    #[test]
    fn test_restore_roundtrip() {
        let storage: SharedStore = Arc::new(MemoryStore::new());
        AuthStore::new(storage.clone())
            .login(AuthSession::new(Some(user()), "tok", Some("ref".to_string())))
            .unwrap();

        let restored = AuthStore::restore(storage).unwrap();
        assert!(restored.is_authenticated());
        assert_eq!(restored.access_token().unwrap().expose_secret(), "tok");
        assert_eq!(restored.user(), Some(user()));
    }

    #[test]
    fn test_restore_ignores_unauthenticated_record() {
        let storage: SharedStore = Arc::new(MemoryStore::new());
        storage
            .set(
                keys::AUTH,
                r#"{"user":null,"token":"tok","refreshToken":null,"isAuthenticated":false}"#,
            )
            .unwrap();

        assert!(!AuthStore::restore(storage).unwrap().is_authenticated());
    }

    #[test]
    fn test_logout_purges_and_notifies() {
        let storage = Arc::new(MemoryStore::new());
        let auth = AuthStore::new(storage.clone());
        auth.login(AuthSession::new(None, "tok", None)).unwrap();
        let rx = auth.subscribe();

        auth.logout().unwrap();

        assert!(!auth.is_authenticated());
        assert!(!*rx.borrow());
        assert!(!storage.contains(keys::AUTH));
    }

    #[test]
    fn test_update_tokens_keeps_refresh_token_when_absent() {
        let storage = Arc::new(MemoryStore::new());
        let auth = AuthStore::new(storage);
        auth.login(AuthSession::new(None, "old", Some("ref".to_string())))
            .unwrap();

        auth.update_tokens("new".to_string(), None, Some(3600))
            .unwrap();

        assert_eq!(auth.access_token().unwrap().expose_secret(), "new");
        assert_eq!(auth.refresh_token().unwrap().expose_secret(), "ref");
        assert!(!auth.is_token_expired());
    }

    #[test]
    fn test_update_tokens_after_logout_is_dropped() {
        let auth = AuthStore::new(Arc::new(MemoryStore::new()));
        auth.update_tokens("new".to_string(), None, None).unwrap();
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_session_expiry() {
        let mut session = AuthSession::new(None, "tok", None).with_expires_in(30);
        assert!(session.is_expired());

        session.expires_in = Some(3600);
        assert!(!session.is_expired());

        session.expires_in = None;
        assert!(!session.is_expired());
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = AuthSession::new(None, "super_secret_access", Some("super_secret_refresh".into()));
        let debug_output = format!("{session:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_access"));
        assert!(!debug_output.contains("super_secret_refresh"));
    }
}
