//! Core types for Golden Papaya.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod identity;
pub mod money;

pub use email::{Email, EmailError};
pub use id::*;
pub use identity::ItemKey;
pub use money::Money;
