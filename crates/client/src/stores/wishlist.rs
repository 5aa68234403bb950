//! Wishlist synchronization store.
//!
//! Owns the local mirror of wishlist membership. The cache is one
//! normalized, ordered list of entries keyed by [`ItemKey`], each optionally
//! carrying full item details; the compact (id lists + variant map) and full
//! (item list) representations are derived projections of it, so the two
//! can never diverge.
//!
//! Fetches are freshness-gated (30 s by default) and single-flight per
//! granularity: concurrent callers share one in-flight request and observe
//! the same outcome. Mutations apply optimistically, then reconcile from the
//! authoritative response or roll back on permanent failure.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, instrument, warn};

use golden_papaya_core::{BundleId, CollectionItemId, ItemKey, ProductId, VariantId};

use crate::config::ClientConfig;
use crate::envelope::ApiEnvelope;
use crate::error::{ClientError, Result};
use crate::models::{
    AddItemRequest, CollectionItem, VisibilityRequest, WishlistData, WishlistIdsData,
};
use crate::transport::ApiClient;

const IDS_PATH: &str = "/wishlist/ids";
const WISHLIST_PATH: &str = "/wishlist";
const ITEMS_PATH: &str = "/wishlist/items";

type FetchFlight = Shared<BoxFuture<'static, Result<()>>>;

/// Which of the two independently-tracked fetches is meant.
#[derive(Debug, Clone, Copy)]
enum Granularity {
    Ids,
    Full,
}

/// Derived compact projection of the wishlist cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactWishlist {
    /// Distinct product IDs, in cache order.
    pub product_ids: Vec<ProductId>,
    /// Bundle IDs, in cache order.
    pub bundle_ids: Vec<BundleId>,
    /// Product ID to the variant IDs tracked for it; an empty list means the
    /// product is tracked without a specific variant.
    pub variant_map: std::collections::HashMap<ProductId, Vec<VariantId>>,
}

/// One normalized cache entry. Details are present once a full fetch (or an
/// add response) has supplied them.
struct Entry {
    key: ItemKey,
    item: Option<CollectionItem>,
}

#[derive(Default)]
struct WishlistCache {
    entries: Vec<Entry>,
    /// `None` means invalidated (or never fetched): the next read consults
    /// the server regardless of how recently a fetch completed.
    ids_fresh_at: Option<Instant>,
    full_fresh_at: Option<Instant>,
    is_public: bool,
}

impl WishlistCache {
    /// Ingest the compact payload. Surviving entries keep their details and
    /// order; removed keys drop; new keys append detail-less. Fields the
    /// compact form does not carry are never erased.
    fn apply_compact(&mut self, data: &WishlistIdsData) {
        let mut incoming: Vec<ItemKey> = Vec::new();
        for (product, variants) in data.variant_entries() {
            if variants.is_empty() {
                incoming.push(ItemKey::product(product));
            } else {
                for variant in variants {
                    incoming.push(ItemKey::variant(product, variant));
                }
            }
        }
        // Products in the bare id list but absent from the variant map are
        // legacy/default-variant entries: one variant-less entry each.
        for product in &data.product_ids {
            if !data.variant_map.contains_key(&product.to_string()) {
                incoming.push(ItemKey::product(*product));
            }
        }
        for bundle in &data.bundle_ids {
            incoming.push(ItemKey::bundle(*bundle));
        }

        let previous = std::mem::take(&mut self.entries);
        let mut next: Vec<Entry> = previous
            .into_iter()
            .filter(|entry| incoming.contains(&entry.key))
            .collect();
        for key in incoming {
            if !next.iter().any(|entry| entry.key == key) {
                next.push(Entry { key, item: None });
            }
        }
        self.entries = next;
    }

    /// Ingest the full payload: authoritative for everything, including the
    /// compact projection derived from it.
    fn apply_full(&mut self, data: WishlistData) {
        self.entries = data
            .items
            .into_iter()
            .filter_map(|item| {
                item.key().map(|key| Entry {
                    key,
                    item: Some(item),
                })
            })
            .collect();
        self.is_public = data.is_public;
    }
}

/// Local cache and synchronization for the customer's wishlist.
///
/// Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct WishlistStore {
    inner: Arc<WishlistInner>,
}

struct WishlistInner {
    api: ApiClient,
    freshness_window: Duration,
    cache: RwLock<WishlistCache>,
    ids_flight: Mutex<Option<FetchFlight>>,
    full_flight: Mutex<Option<FetchFlight>>,
}

impl WishlistStore {
    /// Create a new wishlist store.
    #[must_use]
    pub fn new(api: ApiClient, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(WishlistInner {
                api,
                freshness_window: config.freshness_window,
                cache: RwLock::new(WishlistCache::default()),
                ids_flight: Mutex::new(None),
                full_flight: Mutex::new(None),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, WishlistCache> {
        self.inner.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WishlistCache> {
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Queries (pure reads over the cache, no network)
    // =========================================================================

    /// Coarse membership: is the product tracked at all, with or without a
    /// variant?
    #[must_use]
    pub fn contains_product(&self, product: ProductId) -> bool {
        self.read()
            .entries
            .iter()
            .any(|entry| entry.key.product_id() == Some(product))
    }

    /// Coarse membership for bundles.
    #[must_use]
    pub fn contains_bundle(&self, bundle: BundleId) -> bool {
        self.read()
            .entries
            .iter()
            .any(|entry| entry.key.bundle_id() == Some(bundle))
    }

    /// Loose variant membership: true when the product is tracked without a
    /// specific variant (which matches any variant), or when the given
    /// variant is tracked. False when the product is not tracked at all.
    #[must_use]
    pub fn has_any_variant_of(&self, product: ProductId, variant: Option<VariantId>) -> bool {
        self.read().entries.iter().any(|entry| match entry.key {
            ItemKey::Product {
                product: p,
                variant: v,
            } if p == product => v.is_none() || (variant.is_some() && v == variant),
            _ => false,
        })
    }

    /// Strict variant membership: a variant-less query matches only a
    /// variant-less entry, not "any variant". The counterpart of
    /// [`Self::item_for_variant`] when only a boolean is needed.
    #[must_use]
    pub fn has_exact_variant(&self, product: ProductId, variant: Option<VariantId>) -> bool {
        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        self.read().entries.iter().any(|entry| entry.key == key)
    }

    /// Locate the unique item for a product/variant pair, for mutation
    /// targeting. Strict match: no variant given means "tracked without a
    /// variant", not "any variant". Returns `None` until a full fetch (or an
    /// add response) has supplied details for the entry.
    #[must_use]
    pub fn item_for_variant(
        &self,
        product: ProductId,
        variant: Option<VariantId>,
    ) -> Option<CollectionItem> {
        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        self.read()
            .entries
            .iter()
            .find(|entry| entry.key == key)
            .and_then(|entry| entry.item.clone())
    }

    /// Number of items in the wishlist. Counts normalized entries, so the
    /// result is identical whether the cache was populated by the compact
    /// fetch, the full fetch, or optimistic mutations.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.read().entries.len()
    }

    /// Derived compact projection (id lists + variant map).
    #[must_use]
    pub fn compact_ids(&self) -> CompactWishlist {
        let cache = self.read();
        let mut compact = CompactWishlist::default();
        for entry in &cache.entries {
            match entry.key {
                ItemKey::Product { product, variant } => {
                    if !compact.product_ids.contains(&product) {
                        compact.product_ids.push(product);
                    }
                    let variants = compact.variant_map.entry(product).or_default();
                    if let Some(variant) = variant {
                        variants.push(variant);
                    }
                }
                ItemKey::Bundle(bundle) => compact.bundle_ids.push(bundle),
            }
        }
        compact
    }

    /// Derived full projection: every entry whose details are loaded, in
    /// cache order.
    #[must_use]
    pub fn items(&self) -> Vec<CollectionItem> {
        self.read()
            .entries
            .iter()
            .filter_map(|entry| entry.item.clone())
            .collect()
    }

    /// Whether the wishlist is publicly shareable.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.read().is_public
    }

    /// Drop the freshness stamps without touching cached membership; the
    /// next fetch of either granularity consults the server.
    pub fn invalidate(&self) {
        let mut cache = self.write();
        cache.ids_fresh_at = None;
        cache.full_fresh_at = None;
    }

    /// Drop the entire cache (logout, session expiry).
    pub fn reset(&self) {
        *self.write() = WishlistCache::default();
    }

    // =========================================================================
    // Fetches (freshness-gated, single-flight per granularity)
    // =========================================================================

    /// Fetch the compact form (id lists + variant map). Skipped entirely
    /// when a compact fetch completed within the freshness window and the
    /// stamp was not invalidated; concurrent callers share one request.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous cache is preserved except on
    /// session expiry, which clears it.
    #[instrument(skip(self))]
    pub async fn fetch_ids(&self) -> Result<()> {
        if self.is_fresh(|cache| cache.ids_fresh_at) {
            debug!("wishlist ids cache fresh, skipping fetch");
            return Ok(());
        }
        self.join_flight(Granularity::Ids, WishlistInner::load_ids)
            .await
    }

    /// Fetch the full form (items with display details). Tracked
    /// independently of the compact fetch, with the same freshness and
    /// single-flight discipline. Success rebuilds the whole cache, so the
    /// derived compact projection matches by construction.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous cache is preserved except on
    /// session expiry, which clears it.
    #[instrument(skip(self))]
    pub async fn fetch_items(&self) -> Result<()> {
        if self.is_fresh(|cache| cache.full_fresh_at) {
            debug!("wishlist cache fresh, skipping fetch");
            return Ok(());
        }
        self.join_flight(Granularity::Full, WishlistInner::load_full)
            .await
    }

    fn is_fresh(&self, stamp: impl Fn(&WishlistCache) -> Option<Instant>) -> bool {
        stamp(&self.read()).is_some_and(|at| at.elapsed() < self.inner.freshness_window)
    }

    /// Join the in-flight request for a granularity, or become its leader.
    fn join_flight(
        &self,
        granularity: Granularity,
        load: fn(Arc<WishlistInner>) -> BoxFuture<'static, Result<()>>,
    ) -> FetchFlight {
        let mut slot_guard = self
            .inner
            .flight_slot(granularity)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = slot_guard.as_ref() {
            return flight.clone();
        }
        let inner = Arc::clone(&self.inner);
        let flight: FetchFlight = async move {
            let result = load(Arc::clone(&inner)).await;
            *inner
                .flight_slot(granularity)
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            result
        }
        .boxed()
        .shared();
        *slot_guard = Some(flight.clone());
        flight
    }

    // =========================================================================
    // Mutations (optimistic apply, request, reconcile-or-rollback)
    // =========================================================================

    /// Add a product (optionally a specific variant) to the wishlist.
    ///
    /// The membership change is visible immediately; a 409 from the server
    /// is treated as success and reconciled with a full refetch; any other
    /// failure rolls back exactly the speculative entry and is re-raised.
    ///
    /// # Errors
    ///
    /// Returns the request error after rolling back the optimistic change.
    #[instrument(skip(self))]
    pub async fn add_product(&self, product: ProductId, variant: Option<VariantId>) -> Result<()> {
        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        let request = AddItemRequest {
            product_id: Some(product),
            variant_id: variant,
            bundle_id: None,
        };
        self.add(key, &request).await
    }

    /// Add a bundle to the wishlist. Same contract as [`Self::add_product`].
    ///
    /// # Errors
    ///
    /// Returns the request error after rolling back the optimistic change.
    #[instrument(skip(self))]
    pub async fn add_bundle(&self, bundle: BundleId) -> Result<()> {
        let request = AddItemRequest {
            product_id: None,
            variant_id: None,
            bundle_id: Some(bundle),
        };
        self.add(ItemKey::bundle(bundle), &request).await
    }

    async fn add(&self, key: ItemKey, request: &AddItemRequest) -> Result<()> {
        // Optimistic: membership flips now, and the compact stamp is
        // refreshed so the speculative value is trusted until the server
        // round-trip settles.
        let inserted = {
            let mut cache = self.write();
            let inserted = if cache.entries.iter().any(|entry| entry.key == key) {
                false
            } else {
                cache.entries.push(Entry { key, item: None });
                true
            };
            cache.ids_fresh_at = Some(Instant::now());
            inserted
        };

        match self.inner.api.post::<CollectionItem, _>(ITEMS_PATH, request).await {
            Ok(envelope) => {
                if let Some(item) = envelope.data {
                    let mut cache = self.write();
                    if let Some(entry) = cache.entries.iter_mut().find(|entry| entry.key == key) {
                        entry.item = Some(item);
                    }
                }
                Ok(())
            }
            Err(ClientError::Conflict { .. }) => {
                // Already present server-side: the optimistic state is
                // correct, a full refetch reconciles the details.
                debug!("item already in wishlist, reconciling from server");
                self.reconcile_full().await;
                Ok(())
            }
            Err(err) => {
                if inserted {
                    self.write().entries.retain(|entry| entry.key != key);
                }
                Err(err)
            }
        }
    }

    /// Remove an item by its server-side ID.
    ///
    /// The entry (located in the full cache to learn its identity) is
    /// removed optimistically and both freshness stamps are invalidated:
    /// removal changes which other items may now be the sole remaining
    /// variant of a product, so the next read must reconsult the server. On
    /// failure both granularities are forcibly resynchronized before the
    /// error is re-raised.
    ///
    /// # Errors
    ///
    /// Returns the request error after resynchronizing.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: CollectionItemId) -> Result<()> {
        {
            let mut cache = self.write();
            let key = cache
                .entries
                .iter()
                .find(|entry| entry.item.as_ref().is_some_and(|item| item.id == item_id))
                .map(|entry| entry.key);
            match key {
                Some(key) => cache.entries.retain(|entry| entry.key != key),
                None => debug!(%item_id, "item not in local cache, removal goes to server only"),
            }
            cache.ids_fresh_at = None;
            cache.full_fresh_at = None;
        }

        let path = format!("{ITEMS_PATH}/{item_id}");
        match self.inner.api.delete::<()>(&path).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.resync().await;
                Err(err)
            }
        }
    }

    /// Remove by product (and optional variant) identity, for call sites
    /// that have no item ID at hand. Same cache discipline as
    /// [`Self::remove_item`].
    ///
    /// # Errors
    ///
    /// Returns the request error after resynchronizing.
    #[instrument(skip(self))]
    pub async fn remove_product(
        &self,
        product: ProductId,
        variant: Option<VariantId>,
    ) -> Result<()> {
        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        {
            let mut cache = self.write();
            cache.entries.retain(|entry| entry.key != key);
            cache.ids_fresh_at = None;
            cache.full_fresh_at = None;
        }

        let mut path = format!("{ITEMS_PATH}/by-product/{product}");
        if let Some(variant) = variant {
            path.push_str(&format!("?variantId={variant}"));
        }
        match self.inner.api.delete::<()>(&path).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.resync().await;
                Err(err)
            }
        }
    }

    /// Empty the wishlist.
    ///
    /// # Errors
    ///
    /// Returns the request error after resynchronizing.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        {
            let mut cache = self.write();
            cache.entries.clear();
            cache.ids_fresh_at = None;
            cache.full_fresh_at = None;
        }
        match self.inner.api.delete::<()>(WISHLIST_PATH).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.resync().await;
                Err(err)
            }
        }
    }

    /// Toggle public visibility, optimistically.
    ///
    /// # Errors
    ///
    /// Returns the request error after restoring the previous flag.
    #[instrument(skip(self))]
    pub async fn set_public(&self, is_public: bool) -> Result<()> {
        let previous = {
            let mut cache = self.write();
            let previous = cache.is_public;
            cache.is_public = is_public;
            previous
        };
        match self
            .inner
            .api
            .patch::<(), _>(WISHLIST_PATH, &VisibilityRequest { is_public })
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                self.write().is_public = previous;
                Err(err)
            }
        }
    }

    /// Forced full refetch after a conflict; its own failure is only logged.
    async fn reconcile_full(&self) {
        self.write().full_fresh_at = None;
        if let Err(err) = self.fetch_items().await {
            warn!(error = %err, "wishlist reconciliation fetch failed");
        }
    }

    /// Forced resynchronization of both granularities after a failed
    /// mutation; a reliable local rollback of the variant map is not
    /// reconstructible, so the server becomes the source of truth again.
    async fn resync(&self) {
        self.invalidate();
        if let Err(err) = self.fetch_ids().await {
            warn!(error = %err, "wishlist id resync failed");
        }
        if let Err(err) = self.fetch_items().await {
            warn!(error = %err, "wishlist resync failed");
        }
    }
}

impl WishlistInner {
    const fn flight_slot(&self, granularity: Granularity) -> &Mutex<Option<FetchFlight>> {
        match granularity {
            Granularity::Ids => &self.ids_flight,
            Granularity::Full => &self.full_flight,
        }
    }

    fn load_ids(inner: Arc<Self>) -> BoxFuture<'static, Result<()>> {
        async move {
            let fetched = inner
                .api
                .get::<WishlistIdsData>(IDS_PATH)
                .await
                .and_then(ApiEnvelope::require_data);
            inner.settle_ids(fetched)
        }
        .boxed()
    }

    fn load_full(inner: Arc<Self>) -> BoxFuture<'static, Result<()>> {
        async move {
            let fetched = inner
                .api
                .get::<WishlistData>(WISHLIST_PATH)
                .await
                .and_then(ApiEnvelope::require_data);
            inner.settle_full(fetched)
        }
        .boxed()
    }

    fn settle_ids(&self, fetched: Result<WishlistIdsData>) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match fetched {
            Ok(data) => {
                cache.apply_compact(&data);
                cache.ids_fresh_at = Some(Instant::now());
                Ok(())
            }
            Err(err) => Err(Self::settle_failure(&mut cache, err, "wishlist ids")),
        }
    }

    fn settle_full(&self, fetched: Result<WishlistData>) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match fetched {
            Ok(data) => {
                cache.apply_full(data);
                // The full form is higher fidelity; the compact projection
                // derived from it is fresh too.
                let now = Instant::now();
                cache.full_fresh_at = Some(now);
                cache.ids_fresh_at = Some(now);
                Ok(())
            }
            Err(err) => Err(Self::settle_failure(&mut cache, err, "wishlist")),
        }
    }

    /// Session expiry clears the cache so stale authenticated data is not
    /// shown to a now-anonymous caller; other failures keep the cache.
    fn settle_failure(cache: &mut WishlistCache, err: ClientError, what: &str) -> ClientError {
        if err.is_session_expired() {
            warn!("session expired during {what} fetch, cache cleared");
            *cache = WishlistCache::default();
        } else {
            warn!(error = %err, "{what} fetch failed, keeping cached state");
        }
        err
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionBroadcast};
    use golden_papaya_core::Money;
    use url::Url;

    fn test_store() -> WishlistStore {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9/api").unwrap());
        let session = Arc::new(Session::new());
        let broadcast = SessionBroadcast::new();
        let api = ApiClient::new(&config, session, broadcast.handle());
        WishlistStore::new(api, &config)
    }

    fn compact(json: &str) -> WishlistIdsData {
        serde_json::from_str(json).unwrap()
    }

    fn item(id: i64, product: i64, variant: Option<i64>) -> CollectionItem {
        let price = Money::new("10.00", "USD");
        serde_json::from_value(serde_json::json!({
            "id": id,
            "product": {"id": product, "title": "P", "handle": "p", "price": price},
            "variant": variant.map(|v| serde_json::json!({"id": v, "title": "V", "price": price})),
            "addedAt": "2026-01-05T12:00:00Z"
        }))
        .unwrap()
    }

    fn bundle_item(id: i64, bundle: i64) -> CollectionItem {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "bundle": {"id": bundle, "title": "B", "price": Money::new("30.00", "USD")},
            "addedAt": "2026-01-05T12:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_count_from_compact_form() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "bundleIds": [3], "variantMap": {"5": [9, 10], "7": []}}"#,
        ));
        // 2 variants of product 5, product 7 without a variant, bundle 3
        assert_eq!(store.item_count(), 4);
    }

    #[test]
    fn test_count_includes_products_missing_from_variant_map() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 11], "bundleIds": [], "variantMap": {"5": [9]}}"#,
        ));
        // product 11 appears only in the bare id list
        assert_eq!(store.item_count(), 2);
        assert!(store.has_exact_variant(ProductId::new(11), None));
    }

    #[test]
    fn test_count_equivalent_after_full_fetch() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "bundleIds": [3], "variantMap": {"5": [9, 10], "7": []}}"#,
        ));
        assert_eq!(store.item_count(), 4);

        store.write().apply_full(WishlistData {
            items: vec![
                item(1, 5, Some(9)),
                item(2, 5, Some(10)),
                item(3, 7, None),
                bundle_item(4, 3),
            ],
            is_public: false,
        });
        assert_eq!(store.item_count(), 4);
    }

    #[test]
    fn test_any_variant_vs_exact_variant_semantics() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "bundleIds": [], "variantMap": {"5": [9], "7": []}}"#,
        ));

        // product 7 is tracked variant-less: matches any variant loosely
        assert!(store.has_any_variant_of(ProductId::new(7), Some(VariantId::new(99))));
        assert!(store.has_any_variant_of(ProductId::new(7), None));
        // but strictly only the variant-less identity exists
        assert!(store.has_exact_variant(ProductId::new(7), None));
        assert!(!store.has_exact_variant(ProductId::new(7), Some(VariantId::new(99))));

        // product 5 is tracked as variant 9 only
        assert!(store.has_any_variant_of(ProductId::new(5), Some(VariantId::new(9))));
        assert!(!store.has_any_variant_of(ProductId::new(5), Some(VariantId::new(10))));
        assert!(!store.has_any_variant_of(ProductId::new(5), None));
        assert!(!store.has_exact_variant(ProductId::new(5), None));

        // untracked product
        assert!(!store.has_any_variant_of(ProductId::new(42), Some(VariantId::new(9))));
    }

    #[test]
    fn test_item_for_variant_is_strict() {
        let store = test_store();
        store.write().apply_full(WishlistData {
            items: vec![item(1, 5, Some(9)), item(2, 7, None)],
            is_public: false,
        });

        let found = store.item_for_variant(ProductId::new(5), Some(VariantId::new(9)));
        assert_eq!(found.unwrap().id, CollectionItemId::new(1));

        // variant-less query does not match the variant entry of product 5
        assert!(store.item_for_variant(ProductId::new(5), None).is_none());
        // and matches the variant-less entry of product 7
        let found = store.item_for_variant(ProductId::new(7), None);
        assert_eq!(found.unwrap().id, CollectionItemId::new(2));
    }

    #[test]
    fn test_compact_ingest_preserves_details() {
        let store = test_store();
        store.write().apply_full(WishlistData {
            items: vec![item(1, 5, Some(9)), item(2, 7, None)],
            is_public: true,
        });
        // a later compact payload drops product 7 but keeps 5/9
        store.write().apply_compact(&compact(
            r#"{"productIds": [5], "bundleIds": [], "variantMap": {"5": [9]}}"#,
        ));

        assert_eq!(store.item_count(), 1);
        // surviving entry still carries its details
        assert!(
            store
                .item_for_variant(ProductId::new(5), Some(VariantId::new(9)))
                .is_some()
        );
        assert!(!store.contains_product(ProductId::new(7)));
        // fields the compact form does not carry were not touched
        assert!(store.is_public());
    }

    #[test]
    fn test_compact_projection_derivation() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "bundleIds": [3], "variantMap": {"5": [9, 10], "7": []}}"#,
        ));

        let projection = store.compact_ids();
        assert_eq!(
            projection.product_ids,
            vec![ProductId::new(5), ProductId::new(7)]
        );
        assert_eq!(projection.bundle_ids, vec![BundleId::new(3)]);
        assert_eq!(
            projection.variant_map.get(&ProductId::new(5)),
            Some(&vec![VariantId::new(9), VariantId::new(10)])
        );
        assert_eq!(
            projection.variant_map.get(&ProductId::new(7)),
            Some(&Vec::new())
        );
    }

    #[tokio::test]
    async fn test_optimistic_add_rolls_back_on_network_failure() {
        let store = test_store();
        let product = ProductId::new(5);
        let variant = Some(VariantId::new(9));

        let result = store.add_product(product, variant).await;
        // unreachable host: the request fails and the speculative entry is
        // removed again
        assert!(matches!(result, Err(ClientError::Network(_))));
        assert!(!store.has_any_variant_of(product, variant));
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_add_keeps_preexisting_entry() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5], "bundleIds": [], "variantMap": {"5": [9]}}"#,
        ));

        let result = store
            .add_product(ProductId::new(5), Some(VariantId::new(9)))
            .await;
        assert!(result.is_err());
        // the entry existed before the call; rollback must not remove it
        assert!(store.has_exact_variant(ProductId::new(5), Some(VariantId::new(9))));
    }

    #[test]
    fn test_reset_drops_everything() {
        let store = test_store();
        store.write().apply_full(WishlistData {
            items: vec![item(1, 5, Some(9))],
            is_public: true,
        });
        store.reset();
        assert_eq!(store.item_count(), 0);
        assert!(!store.is_public());
    }
}
