//! Golden Papaya storefront client library.
//!
//! The data-consistency layer between a storefront UI and the remote JSON
//! API: an authenticated transport client that survives credential expiry
//! without dropping in-flight work, a cross-view session broadcast, and two
//! collection-synchronization stores (wishlist and comparison set) that keep
//! a local membership cache correct under concurrent reads, optimistic
//! writes, and partial failures.
//!
//! # Architecture
//!
//! - [`transport::ApiClient`] - envelope-aware HTTP verbs with single-flight
//!   credential refresh on 401
//! - [`session::Session`] - explicit session state holder injected into the
//!   transport (never ambient globals)
//! - [`session::SessionBroadcast`] - timestamped login/logout markers between
//!   views of the same process
//! - [`auth::AuthClient`] - login, registration, logout, current-user fetch
//! - [`stores`] - wishlist and comparison stores: normalized membership
//!   cache with derived compact/full projections, freshness-gated
//!   single-flight fetches, optimistic mutations with rollback
//! - [`state::Storefront`] - wiring and lifecycle (bootstrap, session
//!   listener)
//!
//! # Example
//!
//! ```rust,ignore
//! use golden_papaya_client::{ClientConfig, Storefront};
//!
//! let storefront = Storefront::new(&ClientConfig::from_env()?);
//! storefront.bootstrap().await;
//!
//! storefront.wishlist.fetch_ids().await?;
//! storefront.wishlist.add_product(product_id, Some(variant_id)).await?;
//! assert!(storefront.wishlist.has_any_variant_of(product_id, Some(variant_id)));
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod session;
pub mod state;
pub mod stores;
pub mod transport;

pub use auth::AuthClient;
pub use config::{ClientConfig, ConfigError};
pub use envelope::{ApiEnvelope, Pagination};
pub use error::{ClientError, Result};
pub use session::{Session, SessionBroadcast, SessionEvent, SessionEventKind, SessionHandle};
pub use state::Storefront;
pub use stores::{ComparisonStore, WishlistStore};
pub use transport::ApiClient;
