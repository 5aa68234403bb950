//! Closed error taxonomy for the client data layer.
//!
//! Every failure mode a caller can observe is one of the variants below, and
//! all of them are produced by the transport client (capacity errors by the
//! store precondition) - downstream code matches on variants instead of
//! inspecting response shapes.
//!
//! Errors are `Clone` so that coalesced callers of a single in-flight fetch
//! can all observe the same rejected outcome.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the storefront client.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// No response was received (connection refused, DNS failure, transport
    /// timeout).
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// The response body could not be parsed as the API envelope.
    #[error("malformed response (status {status}): {detail}")]
    Malformed {
        /// HTTP status code of the unparseable response.
        status: u16,
        /// Description of the parse failure.
        detail: String,
    },

    /// The API answered with a structured error envelope.
    #[error("api error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable message from the envelope.
        message: String,
        /// Field-level validation errors, when the envelope carried any.
        field_errors: Option<HashMap<String, String>>,
    },

    /// The credential could not be refreshed; the local session has been
    /// cleared and a logout marker published.
    #[error("session expired")]
    SessionExpired,

    /// The item is already in the collection (HTTP 409). Handled internally
    /// by the stores; callers only see this from the raw transport.
    #[error("conflict: {message}")]
    Conflict {
        /// Message from the envelope.
        message: String,
    },

    /// The collection is at its capacity limit; no request was sent.
    #[error("collection is full (limit {limit})")]
    CapacityExceeded {
        /// The enforced item limit.
        limit: usize,
    },
}

impl ClientError {
    /// Wrap a transport-level failure.
    #[must_use]
    pub fn network(err: reqwest::Error) -> Self {
        Self::Network(Arc::new(err))
    }

    /// Wrap an envelope parse failure.
    #[must_use]
    pub fn malformed(status: u16, err: &serde_json::Error) -> Self {
        Self::Malformed {
            status,
            detail: err.to_string(),
        }
    }

    /// Whether this error is the terminal session-expiry signal.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err)
    }
}

/// Result type alias for [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Api {
            status: 422,
            message: "validation failed".to_owned(),
            field_errors: None,
        };
        assert_eq!(err.to_string(), "api error (status 422): validation failed");

        let err = ClientError::CapacityExceeded { limit: 4 };
        assert_eq!(err.to_string(), "collection is full (limit 4)");

        let err = ClientError::SessionExpired;
        assert_eq!(err.to_string(), "session expired");
    }

    #[test]
    fn test_error_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<ClientError>();
    }

    #[test]
    fn test_is_session_expired() {
        assert!(ClientError::SessionExpired.is_session_expired());
        assert!(
            !ClientError::Conflict {
                message: "dup".to_owned()
            }
            .is_session_expired()
        );
    }
}
