//! Envelope-aware HTTP transport with transparent credential recovery.
//!
//! Every call goes through one dispatch primitive that attaches the bearer
//! credential and, for mutating verbs, the anti-forgery header; parses the
//! `{success, message?, data?, pagination?, errors?}` envelope; and maps
//! failures into the closed [`ClientError`] taxonomy.
//!
//! # Credential recovery
//!
//! A 401 on any non-auth path enters the recovery path: the caller that
//! arrives first at the session's refresh gate performs one refresh call;
//! everyone else queues behind the gate and reads the outcome. Success makes
//! the dispatch report an internal retry signal and the wrapper re-issues
//! the original request exactly once - a second 401 is terminal. A failed
//! refresh clears the session once, publishes a logout marker, and every
//! queued caller observes [`ClientError::SessionExpired`].

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::envelope::ApiEnvelope;
use crate::error::{ClientError, Result};
use crate::models::AuthPayload;
use crate::session::{RefreshDisposition, Session, SessionHandle};

const CSRF_HEADER: &str = "X-CSRF-Token";
const AUTH_PATH_PREFIX: &str = "/auth/";
const REFRESH_PATH: &str = "/auth/refresh";

/// Outcome of a single dispatch: either a finished envelope, or a request to
/// retry after a successful credential refresh. Distinct from an error so
/// the at-most-one-retry rule is enforced in exactly one place.
enum Attempt<T> {
    Done(ApiEnvelope<T>),
    Retry,
}

/// Client for the remote storefront API.
///
/// Cheap to clone; all clones share one HTTP connection pool, cookie store,
/// and session.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
    events: SessionHandle,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed.
    #[must_use]
    pub fn new(config: &ClientConfig, session: Arc<Session>, events: SessionHandle) -> Self {
        // Cookie store carries the refresh cookie, the moral equivalent of
        // sending the request with cross-origin credentials included.
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(&config.user_agent)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            inner: Arc::new(ApiClientInner {
                http,
                base_url: config.base_url.clone(),
                session,
                events,
            }),
        }
    }

    /// The session this client attaches credentials from.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// `GET` a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport, parse, or API failure.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiEnvelope<T>> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// `POST` a JSON body to a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport, parse, or API failure.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// `PUT` a JSON body to a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport, parse, or API failure.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// `PATCH` a JSON body to a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport, parse, or API failure.
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// `DELETE` a path.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on transport, parse, or API failure.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<ApiEnvelope<T>> {
        self.request(Method::DELETE, path, None::<&()>).await
    }

    /// Top-level request wrapper: honors at most one retry signal.
    #[instrument(skip(self, body), fields(method = %method, path))]
    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<ApiEnvelope<T>> {
        match self.dispatch(&method, path, body).await? {
            Attempt::Done(envelope) => Ok(envelope),
            Attempt::Retry => {
                debug!("re-issuing request after credential refresh");
                match self.dispatch(&method, path, body).await? {
                    Attempt::Done(envelope) => Ok(envelope),
                    // A second 401 after a successful refresh means the new
                    // credential is not accepted either; stop retrying.
                    Attempt::Retry => Err(ClientError::SessionExpired),
                }
            }
        }
    }

    /// One request/response cycle.
    async fn dispatch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Attempt<T>> {
        let url = self.join_url(path)?;
        // Captured before the request goes out: if a refresh lands while we
        // are in flight, the 401 recovery can tell.
        let epoch = self.inner.session.epoch();

        let mut request = self.inner.http.request(method.clone(), url);
        if let Some(token) = self.inner.session.bearer_token() {
            request = request.bearer_auth(token.expose_secret());
        }
        if is_mutating(method) {
            // Missing anti-forgery token is a configuration problem, not a
            // client-side veto; the server rejects the request itself.
            if let Some(token) = self.inner.session.csrf_token() {
                request = request.header(CSRF_HEADER, token);
            } else {
                warn!(%method, path, "missing anti-forgery token on mutating request");
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::network)?;
        let status = response.status();
        let text = response.text().await.map_err(ClientError::network)?;

        let envelope: ApiEnvelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(status = %status, "failed to parse response envelope");
                return Err(ClientError::malformed(status.as_u16(), &e));
            }
        };

        if status == StatusCode::UNAUTHORIZED && !path.starts_with(AUTH_PATH_PREFIX) {
            Box::pin(self.recover_unauthorized(epoch)).await?;
            return Ok(Attempt::Retry);
        }

        if status == StatusCode::CONFLICT {
            return Err(ClientError::Conflict {
                message: envelope
                    .message
                    .unwrap_or_else(|| "conflict".to_owned()),
            });
        }

        if !status.is_success() || !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "request failed".to_owned()),
                field_errors: envelope.errors,
            });
        }

        Ok(Attempt::Done(envelope))
    }

    /// Single-flight credential recovery after a 401.
    async fn recover_unauthorized(&self, seen_epoch: u64) -> Result<()> {
        let session = &self.inner.session;
        let _leader = session.refresh_gate().lock().await;

        match session.refresh_disposition(seen_epoch) {
            RefreshDisposition::Refreshed => Ok(()),
            RefreshDisposition::Expired => Err(ClientError::SessionExpired),
            RefreshDisposition::Attempt => match self.call_refresh().await {
                Ok(payload) => {
                    debug!("credential refresh succeeded");
                    session.install(&payload);
                    Ok(())
                }
                Err(err) => {
                    error!(error = %err, "credential refresh failed; session expired");
                    session.mark_refresh_failed();
                    // Subscribers route the user to the session-expired
                    // entry point and drop their caches.
                    self.inner.events.publish_logout();
                    Err(ClientError::SessionExpired)
                }
            },
        }
    }

    /// The dedicated refresh call. Auth paths never enter 401 recovery, so
    /// this cannot recurse into the gate it is called under.
    async fn call_refresh(&self) -> Result<AuthPayload> {
        match self
            .dispatch::<AuthPayload, ()>(&Method::POST, REFRESH_PATH, None)
            .await?
        {
            Attempt::Done(envelope) => envelope.require_data(),
            // Auth paths never yield a retry signal.
            Attempt::Retry => Err(ClientError::SessionExpired),
        }
    }

    fn join_url(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Malformed {
                status: 0,
                detail: format!("invalid request path {path}: {e}"),
            })
    }
}

fn is_mutating(method: &Method) -> bool {
    !matches!(method.as_str(), "GET" | "HEAD" | "OPTIONS")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::SessionBroadcast;

    fn test_client() -> ApiClient {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9/api").unwrap());
        let session = Arc::new(Session::new());
        let broadcast = SessionBroadcast::new();
        ApiClient::new(&config, session, broadcast.handle())
    }

    #[test]
    fn test_is_mutating() {
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PUT));
        assert!(is_mutating(&Method::PATCH));
        assert!(is_mutating(&Method::DELETE));
    }

    #[test]
    fn test_join_url() {
        let client = test_client();
        let url = client.join_url("/wishlist/ids").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/api/wishlist/ids");
    }

    #[test]
    fn test_api_client_is_clone_send_sync() {
        fn assert_clone<T: Clone>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_clone::<ApiClient>();
        assert_send_sync::<ApiClient>();
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = test_client();
        let result = client.get::<()>("/wishlist/ids").await;
        assert!(matches!(result, Err(ClientError::Network(_))));
    }
}
