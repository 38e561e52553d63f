//! Single-flight token refresh.
//!
//! When several requests hit a 401 at once, only the first starts a refresh;
//! the rest await the same shared future. The slot is emptied as soon as the
//! attempt settles (success or failure) so a later expiry can refresh again.
//!
//! The slot only holds a weak handle. Waiters keep an attempt alive; once all
//! of them are dropped the attempt is dropped too, and the next caller starts
//! a fresh one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use secrecy::SecretString;
use thiserror::Error;

/// Why a refresh attempt failed.
///
/// `Clone` so every waiter on a shared attempt gets the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is held.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// The refresh endpoint rejected the token.
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    /// The refresh request did not complete.
    #[error("refresh request failed: {0}")]
    Network(String),

    /// The refresh response could not be parsed.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// Returns `true` if the session itself is unusable (as opposed to a
    /// transient failure reaching the endpoint).
    #[must_use]
    pub const fn invalidates_session(&self) -> bool {
        matches!(self, Self::NoRefreshToken | Self::Rejected(_))
    }
}

/// Outcome of a refresh: the new access token.
pub type RefreshResult = Result<SecretString, RefreshError>;

/// A single refresh attempt before it is shared.
pub type Attempt = BoxFuture<'static, RefreshResult>;

/// An in-flight refresh that any number of callers can await.
pub type RefreshFuture = Shared<Attempt>;

/// Holds at most one in-flight refresh.
#[derive(Clone, Default)]
pub struct RefreshGate {
    slot: Arc<Mutex<Option<WeakShared<Attempt>>>>,
    started: Arc<AtomicU64>,
}

impl RefreshGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight refresh, or start one with `start`.
    ///
    /// `start` is only called when no refresh is outstanding.
    pub fn get_or_start<F>(&self, start: F) -> RefreshFuture
    where
        F: FnOnce() -> Attempt,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = slot.as_ref().and_then(WeakShared::upgrade) {
            tracing::debug!("Joining in-flight token refresh");
            return in_flight;
        }

        let attempt = start();
        let release = Arc::clone(&self.slot);
        let shared = async move {
            let result = attempt.await;
            release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            result
        }
        .boxed()
        .shared();

        *slot = shared.downgrade();
        self.started.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Started token refresh");
        shared
    }

    /// Returns `true` while a refresh is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|weak| weak.upgrade().is_some())
    }

    /// Number of refresh attempts started over the gate's lifetime.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RefreshGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGate")
            .field("refreshing", &self.is_refreshing())
            .field("attempts", &self.attempts())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use futures::future::join_all;
    use secrecy::ExposeSecret;
    use tokio::sync::Notify;

    fn starter(
        calls: &Arc<AtomicUsize>,
        release: &Arc<Notify>,
        result: RefreshResult,
    ) -> impl FnOnce() -> BoxFuture<'static, RefreshResult> + use<> {
        let calls = Arc::clone(calls);
        let release = Arc::clone(release);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                release.notified().await;
                result
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let gate = RefreshGate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let waiters = (0..5).map(|_| {
            let gate = gate.clone();
            let start = starter(&calls, &release, Ok(SecretString::from("fresh")));
            async move { gate.get_or_start(start).await }
        });
        let all = tokio::spawn(join_all(waiters));

        tokio::task::yield_now().await;
        while !gate.is_refreshing() {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        let results = all.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gate.attempts(), 1);
        for result in results {
            assert_eq!(result.unwrap().expose_secret(), "fresh");
        }
        assert!(!gate.is_refreshing());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_slot_released() {
        let gate = RefreshGate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        release.notify_one();

        let first = gate.get_or_start(starter(&calls, &release, Err(RefreshError::Rejected(401))));
        let second = gate.get_or_start(starter(&calls, &release, Ok(SecretString::from("x"))));

        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap_err(), RefreshError::Rejected(401));
        assert_eq!(b.unwrap_err(), RefreshError::Rejected(401));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!gate.is_refreshing());
    }

    #[tokio::test]
    async fn test_new_refresh_after_settle() {
        let gate = RefreshGate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        release.notify_one();
        gate.get_or_start(starter(&calls, &release, Ok(SecretString::from("a"))))
            .await
            .unwrap();
        release.notify_one();
        let token = gate
            .get_or_start(starter(&calls, &release, Ok(SecretString::from("b"))))
            .await
            .unwrap();

        assert_eq!(token.expose_secret(), "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.attempts(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_is_not_resumed() {
        let gate = RefreshGate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let abandoned = gate.get_or_start(starter(&calls, &release, Ok(SecretString::from("old"))));
        assert!(gate.is_refreshing());
        drop(abandoned);
        assert!(!gate.is_refreshing());

        release.notify_one();
        let token = gate
            .get_or_start(starter(&calls, &release, Ok(SecretString::from("new"))))
            .await
            .unwrap();

        assert_eq!(token.expose_secret(), "new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gate.attempts(), 2);
    }

    #[test]
    fn test_refresh_error_classification() {
        assert!(RefreshError::NoRefreshToken.invalidates_session());
        assert!(RefreshError::Rejected(401).invalidates_session());
        assert!(!RefreshError::Network("timeout".into()).invalidates_session());
    }
}
