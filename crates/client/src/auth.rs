//! Session operations: login, registration, logout, current-user fetch.
//!
//! Each operation goes through the transport client and keeps the injected
//! [`Session`] and the broadcast markers in step with the outcome.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use crate::envelope::ApiEnvelope;
use crate::error::Result;
use crate::models::{AuthPayload, Credentials, CurrentUser, Registration};
use crate::session::{Session, SessionHandle};
use crate::transport::ApiClient;

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const LOGOUT_PATH: &str = "/auth/logout";
const ME_PATH: &str = "/auth/me";

/// Client for the session endpoints.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    api: ApiClient,
    session: Arc<Session>,
    events: SessionHandle,
}

impl AuthClient {
    /// Create a new auth client sharing the transport's session.
    #[must_use]
    pub fn new(api: ApiClient, session: Arc<Session>, events: SessionHandle) -> Self {
        Self {
            inner: Arc::new(AuthClientInner {
                api,
                session,
                events,
            }),
        }
    }

    /// Log in with email and password. Installs the returned credentials and
    /// publishes a login marker for other views.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ClientError`] if the request fails; invalid
    /// credentials surface as a structured API error.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<CurrentUser> {
        let envelope: ApiEnvelope<AuthPayload> =
            self.inner.api.post(LOGIN_PATH, credentials).await?;
        let payload = envelope.require_data()?;
        self.inner.session.install(&payload);
        self.inner.events.publish_login();
        debug!(user = %payload.user.id, "logged in");
        Ok(payload.user)
    }

    /// Register a new account. On success the account is immediately logged
    /// in, exactly like [`Self::login`].
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ClientError`] if the request fails; validation
    /// problems surface as a structured API error with field errors.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<CurrentUser> {
        let envelope: ApiEnvelope<AuthPayload> =
            self.inner.api.post(REGISTER_PATH, registration).await?;
        let payload = envelope.require_data()?;
        self.inner.session.install(&payload);
        self.inner.events.publish_login();
        debug!(user = %payload.user.id, "registered");
        Ok(payload.user)
    }

    /// Log out. The local session is torn down and the logout marker
    /// published even if the server call fails.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ClientError`] if the server call failed; local
    /// state is already cleared by then.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let result: Result<ApiEnvelope<()>> = self.inner.api.post(LOGOUT_PATH, &json!({})).await;
        self.inner.session.clear();
        self.inner.events.publish_logout();
        result?;
        Ok(())
    }

    /// Fetch the current user and cache it on the session. Used at app
    /// start and when a login marker arrives from another view.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::ClientError`] if the request fails (for an
    /// anonymous visitor this is the expected 401 API error).
    #[instrument(skip(self))]
    pub async fn fetch_current_user(&self) -> Result<CurrentUser> {
        let envelope: ApiEnvelope<CurrentUser> = self.inner.api.get(ME_PATH).await?;
        let user = envelope.require_data()?;
        self.inner.session.set_user(user.clone());
        Ok(user)
    }
}
