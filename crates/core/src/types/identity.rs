//! Identity of a tracked collection item.
//!
//! Wishlist and comparison entries are identified by the triple
//! (product, optional variant, bundle): a product and one of its variants
//! may be tracked independently, and a bundle is tracked by its bundle ID
//! alone. `ItemKey` encodes the "exactly one of product/bundle" rule in the
//! type instead of leaving it to runtime validation.

use serde::{Deserialize, Serialize};

use super::id::{BundleId, ProductId, VariantId};

/// Identity of one tracked item in a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKey {
    /// A product, optionally narrowed to one of its variants.
    ///
    /// `variant: None` means the product is tracked without a specific
    /// variant; that is a distinct identity from any `variant: Some(_)`
    /// entry of the same product.
    Product {
        /// The tracked product.
        product: ProductId,
        /// The specific variant, if one was selected.
        variant: Option<VariantId>,
    },
    /// A bundle, tracked by bundle ID alone.
    Bundle(BundleId),
}

impl ItemKey {
    /// Key for a product tracked without a specific variant.
    #[must_use]
    pub const fn product(product: ProductId) -> Self {
        Self::Product {
            product,
            variant: None,
        }
    }

    /// Key for a specific variant of a product.
    #[must_use]
    pub const fn variant(product: ProductId, variant: VariantId) -> Self {
        Self::Product {
            product,
            variant: Some(variant),
        }
    }

    /// Key for a bundle.
    #[must_use]
    pub const fn bundle(bundle: BundleId) -> Self {
        Self::Bundle(bundle)
    }

    /// The product ID, if this key identifies a product entry.
    #[must_use]
    pub const fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Product { product, .. } => Some(*product),
            Self::Bundle(_) => None,
        }
    }

    /// The variant ID, if this key identifies a specific variant.
    #[must_use]
    pub const fn variant_id(&self) -> Option<VariantId> {
        match self {
            Self::Product { variant, .. } => *variant,
            Self::Bundle(_) => None,
        }
    }

    /// The bundle ID, if this key identifies a bundle entry.
    #[must_use]
    pub const fn bundle_id(&self) -> Option<BundleId> {
        match self {
            Self::Product { .. } => None,
            Self::Bundle(bundle) => Some(*bundle),
        }
    }

    /// Whether this key identifies a bundle.
    #[must_use]
    pub const fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }
}
