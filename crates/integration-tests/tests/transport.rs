//! Integration tests for the transport client.
//!
//! Covers the error taxonomy, anti-forgery attachment, and the credential
//! recovery path: single-flight refresh coalescing, exactly-once retry, and
//! terminal session expiry.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use golden_papaya_client::models::Credentials;
use golden_papaya_client::{ApiClient, ClientError, SessionEventKind, Storefront};
use golden_papaya_core::Email;
use golden_papaya_integration_tests::mock::MockApi;
use golden_papaya_integration_tests::{ACCOUNT_EMAIL, login, storefront_against_mock};

/// A raw transport client sharing the storefront's session and broadcast.
fn raw_client(api: &MockApi, storefront: &Storefront) -> ApiClient {
    ApiClient::new(
        &api.config(),
        Arc::clone(&storefront.session),
        storefront.events.handle(),
    )
}

// =============================================================================
// Error Taxonomy
// =============================================================================

#[tokio::test]
async fn test_structured_api_error_carries_status() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    api.state.fail_once("GET /wishlist/ids", 500);
    let err = client.get::<Value>("/wishlist/ids").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
}

#[tokio::test]
async fn test_unparseable_body_is_malformed_error() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    api.state.garble_once("GET /wishlist/ids");
    let err = client.get::<Value>("/wishlist/ids").await.unwrap_err();
    assert!(matches!(err, ClientError::Malformed { status: 200, .. }));
}

#[tokio::test]
async fn test_conflict_surfaces_from_raw_transport() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    client
        .post::<Value, _>("/wishlist/items", &json!({"productId": 5}))
        .await
        .expect("first add");
    let err = client
        .post::<Value, _>("/wishlist/items", &json!({"productId": 5}))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict { .. }));
}

#[tokio::test]
async fn test_invalid_credentials_do_not_trigger_refresh() {
    let (api, storefront) = storefront_against_mock().await;

    let credentials = Credentials {
        email: Email::parse(ACCOUNT_EMAIL).unwrap(),
        password: "wrong".to_owned(),
    };
    let err = storefront.auth.login(&credentials).await.unwrap_err();
    // a 401 on an auth path is an ordinary API error, not recovery fodder
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
    assert_eq!(api.state.hits("POST /auth/refresh"), 0);
}

#[tokio::test]
async fn test_validation_errors_reach_the_caller() {
    let (_api, storefront) = storefront_against_mock().await;

    let registration = golden_papaya_client::models::Registration {
        email: Email::parse(ACCOUNT_EMAIL).unwrap(),
        password: "hunter2!".to_owned(),
        first_name: None,
        last_name: None,
    };
    let err = storefront.auth.register(&registration).await.unwrap_err();
    match err {
        ClientError::Api {
            status: 422,
            field_errors: Some(errors),
            ..
        } => assert!(errors.contains_key("email")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

// =============================================================================
// Anti-Forgery Header
// =============================================================================

#[tokio::test]
async fn test_mutations_carry_anti_forgery_token() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    // the mock rejects mutations without the header, so success proves it
    // was attached
    client
        .post::<Value, _>("/wishlist/items", &json!({"productId": 7}))
        .await
        .expect("add with anti-forgery token");
    assert_eq!(api.state.wishlist_items().len(), 1);
}

// =============================================================================
// Credential Recovery
// =============================================================================

#[tokio::test]
async fn test_refresh_coalescing_and_single_retry() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    // keep the refresh in flight long enough for both 401s to queue on it
    api.state
        .set_latency("POST /auth/refresh", Duration::from_millis(100));
    api.state.revoke_access_token();

    let (a, b) = tokio::join!(
        client.get::<Value>("/wishlist/ids"),
        client.get::<Value>("/wishlist"),
    );
    a.expect("first caller succeeds after refresh");
    b.expect("second caller succeeds after refresh");

    // exactly one refresh, and each original call retried exactly once
    assert_eq!(api.state.hits("POST /auth/refresh"), 1);
    assert_eq!(api.state.hits("GET /wishlist/ids"), 2);
    assert_eq!(api.state.hits("GET /wishlist"), 2);
}

#[tokio::test]
async fn test_terminal_session_expiry() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);
    let mut events = storefront.events.handle().subscribe();

    api.state
        .set_latency("POST /auth/refresh", Duration::from_millis(50));
    api.state.revoke_access_token();
    api.state.set_refresh_fails(true);

    let (a, b) = tokio::join!(
        client.get::<Value>("/wishlist/ids"),
        client.get::<Value>("/wishlist"),
    );
    assert!(matches!(a, Err(ClientError::SessionExpired)));
    assert!(matches!(b, Err(ClientError::SessionExpired)));

    // one refresh attempt resolved both callers, and the session was
    // cleared exactly once
    assert_eq!(api.state.hits("POST /auth/refresh"), 1);
    assert!(!storefront.session.is_authenticated());
    assert!(storefront.session.bearer_token().is_none());

    // the expiry published a logout marker for other views
    let event = events.recv().await.expect("logout marker");
    assert_eq!(event.kind, SessionEventKind::LoggedOut);

    // later calls fail fast without another refresh attempt
    let err = client.get::<Value>("/wishlist/ids").await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert_eq!(api.state.hits("POST /auth/refresh"), 1);
}

#[tokio::test]
async fn test_login_after_expiry_restores_service() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    let client = raw_client(&api, &storefront);

    api.state.revoke_access_token();
    api.state.set_refresh_fails(true);
    let err = client.get::<Value>("/wishlist/ids").await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));

    api.state.set_refresh_fails(false);
    login(&storefront).await;
    client
        .get::<Value>("/wishlist/ids")
        .await
        .expect("request succeeds with the new credential");
}
