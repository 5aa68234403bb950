//! Golden Papaya Core - Shared types library.
//!
//! This crate provides common types used across all Golden Papaya components:
//! - `client` - Storefront API client and data-consistency layer
//! - `integration-tests` - Black-box tests against a mock of the remote API
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, item identity, emails,
//!   and monetary amounts

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
