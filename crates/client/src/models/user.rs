//! Session and authentication payloads.

use serde::{Deserialize, Serialize};

use golden_papaya_core::{Email, UserId};

/// The authenticated user as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    /// User's ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// First name, when provided at registration.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name, when provided at registration.
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Login request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Account email.
    pub email: Email,
    /// Account password.
    pub password: String,
}

/// Registration request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Account email.
    pub email: Email,
    /// Account password.
    pub password: String,
    /// Optional first name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Optional last name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Payload returned by login, registration, and refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// The authenticated user.
    pub user: CurrentUser,
    /// Bearer credential for subsequent requests.
    pub access_token: String,
    /// Anti-forgery token attached to mutating requests.
    pub csrf_token: String,
}
