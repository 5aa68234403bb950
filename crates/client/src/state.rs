//! Wiring and lifecycle for the client data layer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::AuthClient;
use crate::config::ClientConfig;
use crate::session::{Session, SessionBroadcast, SessionEventKind, SessionHandle};
use crate::stores::{ComparisonStore, WishlistStore};
use crate::transport::ApiClient;

/// One view's worth of the storefront client: session, transport, auth, and
/// the two collection stores, sharing one credential state.
///
/// Create it at app start; [`Self::bootstrap`] performs the initial
/// current-user fetch; [`Self::spawn_session_listener`] keeps this view
/// consistent with login/logout markers from other views.
pub struct Storefront {
    /// Shared session state.
    pub session: Arc<Session>,
    /// Broadcast channel for session markers; hand [`SessionBroadcast::handle`]
    /// results to other views.
    pub events: SessionBroadcast,
    /// Session operations.
    pub auth: AuthClient,
    /// Wishlist store.
    pub wishlist: WishlistStore,
    /// Comparison store.
    pub compare: ComparisonStore,
    handle: SessionHandle,
}

impl Storefront {
    /// Wire up a storefront client from configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_broadcast(config, SessionBroadcast::new())
    }

    /// Wire up a storefront client that joins an existing broadcast channel,
    /// as another view of the same app. Each instance registers its own
    /// origin, so markers it publishes are seen by the other views only.
    #[must_use]
    pub fn with_broadcast(config: &ClientConfig, events: SessionBroadcast) -> Self {
        let session = Arc::new(Session::new());
        let handle = events.handle();
        let api = ApiClient::new(config, Arc::clone(&session), handle.clone());
        let auth = AuthClient::new(api.clone(), Arc::clone(&session), handle.clone());
        let wishlist = WishlistStore::new(api.clone(), config);
        let compare = ComparisonStore::new(api, config);

        Self {
            session,
            events,
            auth,
            wishlist,
            compare,
            handle,
        }
    }

    /// App-start current-user fetch. Failure is normal for an anonymous
    /// visitor and is not surfaced.
    pub async fn bootstrap(&self) {
        match self.auth.fetch_current_user().await {
            Ok(user) => debug!(user = %user.id, "restored session at startup"),
            Err(err) => debug!(error = %err, "no authenticated session at startup"),
        }
    }

    /// React to session markers from other views: a logout marker clears
    /// local session state and drops the collection caches; a login marker
    /// re-fetches the current user only if this view is unauthenticated
    /// (the originating view already has the user set directly).
    pub fn spawn_session_listener(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.handle.subscribe();
        let session = Arc::clone(&self.session);
        let auth = self.auth.clone();
        let wishlist = self.wishlist.clone();
        let compare = self.compare.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.kind {
                    SessionEventKind::LoggedOut => {
                        session.clear();
                        wishlist.reset();
                        compare.reset();
                    }
                    SessionEventKind::LoggedIn => {
                        if session.current_user().is_none()
                            && let Err(err) = auth.fetch_current_user().await
                        {
                            warn!(error = %err, "current-user fetch after login marker failed");
                        }
                    }
                }
            }
        })
    }
}
