//! Explicit session state, injected into the transport client.
//!
//! One `Session` exists per process. It owns the bearer credential, the
//! anti-forgery token, the cached current user, and the refresh-coordination
//! state: an epoch counter that advances whenever a new credential is
//! installed, plus an async gate that keeps at most one refresh call in
//! flight process-wide. Lifecycle: created at app start, `install`ed on
//! login/registration/refresh, `clear`ed on logout or terminal refresh
//! failure.

mod broadcast;

pub use broadcast::{SessionBroadcast, SessionEvent, SessionEventKind, SessionEvents, SessionHandle};

use std::sync::{Mutex, PoisonError};

use secrecy::SecretString;

use crate::models::{AuthPayload, CurrentUser};

/// What a 401-recovery caller should do, given the epoch it observed when
/// its request was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshDisposition {
    /// A newer credential was installed since; retry with it.
    Refreshed,
    /// The refresh at this epoch already failed terminally.
    Expired,
    /// Nobody has resolved this epoch yet; the caller is the leader and
    /// should attempt the refresh.
    Attempt,
}

#[derive(Default)]
struct SessionState {
    access_token: Option<SecretString>,
    csrf_token: Option<String>,
    user: Option<CurrentUser>,
    epoch: u64,
    refresh_failed_epoch: Option<u64>,
}

/// Process-wide session state holder.
#[derive(Default)]
pub struct Session {
    state: Mutex<SessionState>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl Session {
    /// Create an empty (anonymous) session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The bearer credential, if one is held.
    #[must_use]
    pub fn bearer_token(&self) -> Option<SecretString> {
        self.state().access_token.clone()
    }

    /// The anti-forgery token, if one is held.
    #[must_use]
    pub fn csrf_token(&self) -> Option<String> {
        self.state().csrf_token.clone()
    }

    /// The cached current user, if the session is authenticated.
    #[must_use]
    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state().user.clone()
    }

    /// Whether a user is currently logged in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().user.is_some()
    }

    /// The current credential epoch. Captured before a request is sent so a
    /// 401 can tell whether another call already refreshed in the meantime.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// Install a fresh credential set from login, registration, or refresh.
    /// Advances the epoch and forgets any recorded refresh failure.
    pub fn install(&self, payload: &AuthPayload) {
        let mut state = self.state();
        state.access_token = Some(SecretString::from(payload.access_token.clone()));
        state.csrf_token = Some(payload.csrf_token.clone());
        state.user = Some(payload.user.clone());
        state.epoch += 1;
        state.refresh_failed_epoch = None;
    }

    /// Update the cached current user without touching credentials.
    pub fn set_user(&self, user: CurrentUser) {
        self.state().user = Some(user);
    }

    /// Drop credentials and user. Advances the epoch so queued 401
    /// recoveries re-evaluate instead of assuming nothing changed.
    pub fn clear(&self) {
        let mut state = self.state();
        state.access_token = None;
        state.csrf_token = None;
        state.user = None;
        state.epoch += 1;
    }

    /// Record a terminal refresh failure at the current epoch and drop the
    /// session in the same critical section, so the clear happens exactly
    /// once no matter how many callers were queued behind the refresh.
    pub(crate) fn mark_refresh_failed(&self) {
        let mut state = self.state();
        state.refresh_failed_epoch = Some(state.epoch);
        state.access_token = None;
        state.csrf_token = None;
        state.user = None;
    }

    /// Decide what a 401-recovery caller should do. Must be called while
    /// holding the [`Self::refresh_gate`].
    pub(crate) fn refresh_disposition(&self, seen_epoch: u64) -> RefreshDisposition {
        let state = self.state();
        if state.epoch != seen_epoch {
            RefreshDisposition::Refreshed
        } else if state.refresh_failed_epoch == Some(state.epoch) {
            RefreshDisposition::Expired
        } else {
            RefreshDisposition::Attempt
        }
    }

    /// Gate serializing refresh attempts: the first 401 takes the lock and
    /// refreshes; everyone else queues here and reads the disposition.
    pub(crate) const fn refresh_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.refresh_gate
    }

    /// Debug-formatted view that never exposes the credential.
    #[must_use]
    pub fn describe(&self) -> String {
        let state = self.state();
        format!(
            "Session {{ authenticated: {}, epoch: {} }}",
            state.user.is_some(),
            state.epoch
        )
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use golden_papaya_core::{Email, UserId};
    use secrecy::ExposeSecret;

    fn payload(token: &str) -> AuthPayload {
        AuthPayload {
            user: CurrentUser {
                id: UserId::new(1),
                email: Email::parse("user@example.com").unwrap(),
                first_name: None,
                last_name: None,
            },
            access_token: token.to_owned(),
            csrf_token: format!("csrf-{token}"),
        }
    }

    #[test]
    fn test_install_advances_epoch() {
        let session = Session::new();
        assert_eq!(session.epoch(), 0);
        assert!(!session.is_authenticated());

        session.install(&payload("t1"));
        assert_eq!(session.epoch(), 1);
        assert!(session.is_authenticated());
        assert_eq!(session.bearer_token().unwrap().expose_secret(), "t1");
        assert_eq!(session.csrf_token().as_deref(), Some("csrf-t1"));
    }

    #[test]
    fn test_clear_drops_credentials_and_advances_epoch() {
        let session = Session::new();
        session.install(&payload("t1"));
        session.clear();
        assert!(session.bearer_token().is_none());
        assert!(session.csrf_token().is_none());
        assert!(!session.is_authenticated());
        assert_eq!(session.epoch(), 2);
    }

    #[test]
    fn test_disposition_refreshed_when_epoch_moved() {
        let session = Session::new();
        session.install(&payload("t1"));
        // caller saw epoch 0, another call installed a credential since
        assert_eq!(session.refresh_disposition(0), RefreshDisposition::Refreshed);
        assert_eq!(session.refresh_disposition(1), RefreshDisposition::Attempt);
    }

    #[test]
    fn test_disposition_expired_after_failed_refresh() {
        let session = Session::new();
        session.install(&payload("t1"));
        session.mark_refresh_failed();
        assert_eq!(session.refresh_disposition(1), RefreshDisposition::Expired);
        // session was cleared exactly once, in the same critical section
        assert!(session.bearer_token().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_login_after_expiry_recovers() {
        let session = Session::new();
        session.install(&payload("t1"));
        session.mark_refresh_failed();
        session.install(&payload("t2"));
        assert_eq!(session.refresh_disposition(2), RefreshDisposition::Attempt);
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_debug_redacts_credential() {
        let session = Session::new();
        session.install(&payload("super-secret"));
        let debug = format!("{session:?}");
        assert!(!debug.contains("super-secret"));
    }
}
