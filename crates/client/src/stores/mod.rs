//! Collection synchronization stores.
//!
//! One store per collection type. The two share a design - normalized cache
//! with derived projections, freshness-gated single-flight fetches,
//! optimistic mutations - but are deliberately separate implementations:
//! their capacity rules, endpoints, and collection-specific fields differ,
//! and each is free to evolve without the other.

pub mod comparison;
pub mod wishlist;

pub use comparison::{CompactComparison, ComparisonStore, MAX_COMPARE_ITEMS};
pub use wishlist::{CompactWishlist, WishlistStore};
