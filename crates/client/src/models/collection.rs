//! Collection (wishlist / comparison set) payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use golden_papaya_core::{BundleId, CollectionItemId, ItemKey, Money, ProductId, VariantId};

// =============================================================================
// Denormalized item details
// =============================================================================

/// Product details embedded in a collection item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    /// Product ID.
    pub id: ProductId,
    /// Display title.
    pub title: String,
    /// URL handle.
    pub handle: String,
    /// Primary image URL.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Current price.
    pub price: Money,
}

/// Variant details embedded in a collection item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSummary {
    /// Variant ID.
    pub id: VariantId,
    /// Display title (e.g., "Large / Blue").
    pub title: String,
    /// Current price.
    pub price: Money,
}

/// Bundle details embedded in a collection item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummary {
    /// Bundle ID.
    pub id: BundleId,
    /// Display title.
    pub title: String,
    /// Current price.
    pub price: Money,
}

/// One item of a collection, with denormalized display details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    /// Server-side row ID, used for removal.
    pub id: CollectionItemId,
    /// Tracked product, absent for bundle entries.
    #[serde(default)]
    pub product: Option<ProductSummary>,
    /// Tracked variant, absent when the product is tracked without one.
    #[serde(default)]
    pub variant: Option<VariantSummary>,
    /// Tracked bundle, absent for product entries.
    #[serde(default)]
    pub bundle: Option<BundleSummary>,
    /// When the item was added.
    pub added_at: DateTime<Utc>,
}

impl CollectionItem {
    /// The identity of this item, or `None` for a wire item that names
    /// neither a product nor a bundle.
    #[must_use]
    pub fn key(&self) -> Option<ItemKey> {
        if let Some(bundle) = &self.bundle {
            return Some(ItemKey::bundle(bundle.id));
        }
        self.product.as_ref().map(|product| ItemKey::Product {
            product: product.id,
            variant: self.variant.as_ref().map(|v| v.id),
        })
    }
}

// =============================================================================
// Compact and full collection payloads
// =============================================================================

/// Compact wishlist payload: `GET /wishlist/ids`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistIdsData {
    /// Product IDs present in the wishlist.
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    /// Bundle IDs present in the wishlist.
    #[serde(default)]
    pub bundle_ids: Vec<BundleId>,
    /// Map from product ID (JSON object key, so a string) to the variant IDs
    /// of that product in the wishlist. An empty list means the product is
    /// tracked without a specific variant.
    #[serde(default)]
    pub variant_map: BTreeMap<String, Vec<VariantId>>,
}

impl WishlistIdsData {
    /// The variant map with parsed keys, in ascending product-ID order.
    /// Unparseable keys are skipped.
    #[must_use]
    pub fn variant_entries(&self) -> Vec<(ProductId, Vec<VariantId>)> {
        let mut entries: Vec<_> = self
            .variant_map
            .iter()
            .filter_map(|(key, variants)| {
                key.parse::<i64>()
                    .ok()
                    .map(|id| (ProductId::new(id), variants.clone()))
            })
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// Full wishlist payload: `GET /wishlist`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistData {
    /// All wishlist items, in server order.
    pub items: Vec<CollectionItem>,
    /// Whether the wishlist is publicly shareable.
    #[serde(default)]
    pub is_public: bool,
}

/// Compact comparison payload: `GET /compare/ids`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareIdsData {
    /// Product IDs present in the comparison set.
    #[serde(default)]
    pub product_ids: Vec<ProductId>,
    /// Map from product ID (JSON object key, so a string) to the variant IDs
    /// of that product in the comparison set.
    #[serde(default)]
    pub variant_map: BTreeMap<String, Vec<VariantId>>,
}

impl CompareIdsData {
    /// The variant map with parsed keys, in ascending product-ID order.
    /// Unparseable keys are skipped.
    #[must_use]
    pub fn variant_entries(&self) -> Vec<(ProductId, Vec<VariantId>)> {
        let mut entries: Vec<_> = self
            .variant_map
            .iter()
            .filter_map(|(key, variants)| {
                key.parse::<i64>()
                    .ok()
                    .map(|id| (ProductId::new(id), variants.clone()))
            })
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// Full comparison payload: `GET /compare`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonData {
    /// All comparison items, in server order.
    pub items: Vec<CollectionItem>,
}

// =============================================================================
// Mutation request bodies
// =============================================================================

/// Add-item request body. Exactly one of `product_id`/`bundle_id` is set by
/// the store methods that build it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    /// Product to add.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ProductId>,
    /// Specific variant of the product.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    /// Bundle to add.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<BundleId>,
}

/// Wishlist visibility request body: `PATCH /wishlist`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    /// Whether the wishlist should be publicly shareable.
    pub is_public: bool,
}
