//! Login/logout markers between views of the same process.
//!
//! The browser-tab analog: every participant registers a [`SessionHandle`]
//! and sees timestamped markers published by *other* participants, never its
//! own (the originator already updated the session directly). Contract for
//! subscribers: a logout marker clears local session state immediately; a
//! login marker triggers a current-user re-fetch only if the local view is
//! unauthenticated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

const EVENT_CAPACITY: usize = 16;

/// Kind of session marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A participant completed login or registration.
    LoggedIn,
    /// A participant logged out (or its session expired terminally).
    LoggedOut,
}

/// A timestamped session marker.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    /// What happened.
    pub kind: SessionEventKind,
    /// When the marker was written.
    pub at: DateTime<Utc>,
    origin: u64,
}

/// The shared channel session markers travel over.
#[derive(Debug, Clone)]
pub struct SessionBroadcast {
    tx: broadcast::Sender<SessionEvent>,
    next_origin: Arc<AtomicU64>,
}

impl SessionBroadcast {
    /// Create a new broadcast channel.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tx,
            next_origin: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a participant. Clones of the returned handle share one
    /// origin (one "tab"); call `handle()` again for a distinct participant.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            origin: self.next_origin.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
        }
    }
}

impl Default for SessionBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's sending side.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    origin: u64,
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Publish a login marker.
    pub fn publish_login(&self) {
        self.publish(SessionEventKind::LoggedIn);
    }

    /// Publish a logout marker.
    pub fn publish_logout(&self) {
        self.publish(SessionEventKind::LoggedOut);
    }

    fn publish(&self, kind: SessionEventKind) {
        // No subscribers is fine; the marker is simply unobserved.
        let _ = self.tx.send(SessionEvent {
            kind,
            at: Utc::now(),
            origin: self.origin,
        });
    }

    /// Subscribe to markers from other participants.
    #[must_use]
    pub fn subscribe(&self) -> SessionEvents {
        SessionEvents {
            origin: self.origin,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of the broadcast, filtered to other participants' markers.
#[derive(Debug)]
pub struct SessionEvents {
    origin: u64,
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// The next marker from another participant, or `None` once every
    /// sender has been dropped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
