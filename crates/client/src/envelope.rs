//! The JSON envelope every remote API endpoint responds with.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Response envelope: `{success, message?, data?, pagination?, errors?}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable message, usually present on failures.
    #[serde(default)]
    pub message: Option<String>,
    /// The payload, when the endpoint returns one.
    #[serde(default)]
    pub data: Option<T>,
    /// Pagination metadata for list endpoints.
    #[serde(default)]
    pub pagination: Option<Pagination>,
    /// Field-level validation errors.
    #[serde(default)]
    pub errors: Option<HashMap<String, String>>,
}

impl<T> ApiEnvelope<T> {
    /// Extract the payload, treating an absent `data` field on a successful
    /// envelope as a malformed response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Malformed`] when the envelope has no data.
    pub fn require_data(self) -> Result<T> {
        self.data.ok_or_else(|| ClientError::Malformed {
            status: 200,
            detail: "success envelope without data".to_owned(),
        })
    }
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page (1-indexed).
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Total number of records.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_envelope() {
        let env: ApiEnvelope<Vec<i64>> =
            serde_json::from_str(r#"{"success":true,"data":[1,2,3]}"#).unwrap();
        assert!(env.success);
        assert_eq!(env.require_data().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_error_envelope() {
        let env: ApiEnvelope<()> = serde_json::from_str(
            r#"{"success":false,"message":"invalid input","errors":{"email":"required"}}"#,
        )
        .unwrap();
        assert!(!env.success);
        assert_eq!(env.message.as_deref(), Some("invalid input"));
        assert_eq!(
            env.errors.unwrap().get("email").map(String::as_str),
            Some("required")
        );
    }

    #[test]
    fn test_parse_pagination() {
        let env: ApiEnvelope<Vec<i64>> = serde_json::from_str(
            r#"{"success":true,"data":[],"pagination":{"page":2,"limit":20,"total":45,"totalPages":3}}"#,
        )
        .unwrap();
        let pagination = env.pagination.unwrap();
        assert_eq!(pagination.page, 2);
        assert_eq!(pagination.total_pages, 3);
    }

    #[test]
    fn test_require_data_missing() {
        let env: ApiEnvelope<i64> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(matches!(
            env.require_data(),
            Err(ClientError::Malformed { .. })
        ));
    }
}
