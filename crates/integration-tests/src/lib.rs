//! Test support for Golden Papaya integration tests.
//!
//! The interesting piece is [`mock::MockApi`]: an in-process axum server
//! speaking the remote storefront API's envelope protocol, with per-route
//! hit counters, injectable latency, one-shot failures, and a controllable
//! credential lifecycle. Tests drive the real client against it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod mock;

use golden_papaya_client::models::Credentials;
use golden_papaya_client::Storefront;
use golden_papaya_core::Email;

use crate::mock::MockApi;

/// Email of the mock API's one registered account.
pub const ACCOUNT_EMAIL: &str = "user@example.com";

/// Password of the mock API's one registered account.
pub const ACCOUNT_PASSWORD: &str = "hunter2!";

/// Spawn a mock API and a storefront wired to it.
pub async fn storefront_against_mock() -> (MockApi, Storefront) {
    let api = MockApi::spawn().await;
    let storefront = Storefront::new(&api.config());
    (api, storefront)
}

/// Log the mock's one test account in.
///
/// # Panics
///
/// Panics if the login fails; tests call this as a precondition.
pub async fn login(storefront: &Storefront) {
    let credentials = Credentials {
        email: Email::parse(ACCOUNT_EMAIL).expect("account email"),
        password: ACCOUNT_PASSWORD.to_owned(),
    };
    storefront.auth.login(&credentials).await.expect("login");
}

/// Initialize test logging once; respects `RUST_LOG`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
