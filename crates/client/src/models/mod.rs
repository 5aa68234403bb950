//! Wire models for the remote API.
//!
//! These mirror the JSON payloads inside the response envelope, camelCase on
//! the wire, with type-safe IDs from `golden-papaya-core`.

pub mod collection;
pub mod user;

pub use collection::{
    AddItemRequest, BundleSummary, CollectionItem, CompareIdsData, ComparisonData, ProductSummary,
    VariantSummary, VisibilityRequest, WishlistData, WishlistIdsData,
};
pub use user::{AuthPayload, Credentials, CurrentUser, Registration};
