//! Comparison-set synchronization store.
//!
//! Same design as the wishlist store: a normalized, ordered entry list with
//! derived compact/full projections, freshness-gated single-flight fetches,
//! and optimistic mutations. The differences are the endpoints, a hard
//! client-side capacity of [`MAX_COMPARE_ITEMS`] products, and no bundle or
//! visibility surface.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, instrument, warn};

use golden_papaya_core::{CollectionItemId, ItemKey, ProductId, VariantId};

use crate::config::ClientConfig;
use crate::envelope::ApiEnvelope;
use crate::error::{ClientError, Result};
use crate::models::{AddItemRequest, CollectionItem, CompareIdsData, ComparisonData};
use crate::transport::ApiClient;

/// Upper bound on comparison-set size, enforced before any network call.
pub const MAX_COMPARE_ITEMS: usize = 4;

const IDS_PATH: &str = "/compare/ids";
const COMPARE_PATH: &str = "/compare";
const ITEMS_PATH: &str = "/compare/items";

type FetchFlight = Shared<BoxFuture<'static, Result<()>>>;

#[derive(Debug, Clone, Copy)]
enum Granularity {
    Ids,
    Full,
}

/// Derived compact projection of the comparison cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactComparison {
    /// Distinct product IDs, in cache order.
    pub product_ids: Vec<ProductId>,
    /// Product ID to the variant IDs tracked for it.
    pub variant_map: std::collections::HashMap<ProductId, Vec<VariantId>>,
}

struct Entry {
    key: ItemKey,
    item: Option<CollectionItem>,
}

#[derive(Default)]
struct ComparisonCache {
    entries: Vec<Entry>,
    ids_fresh_at: Option<Instant>,
    full_fresh_at: Option<Instant>,
}

impl ComparisonCache {
    /// Ingest the compact payload; surviving entries keep details and order.
    fn apply_compact(&mut self, data: &CompareIdsData) {
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
        for product in &data.product_ids {
            if !data.variant_map.contains_key(&product.to_string()) {
                incoming.push(ItemKey::product(*product));
            }
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

    fn apply_full(&mut self, data: ComparisonData) {
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
    }
}

/// Local cache and synchronization for the product comparison set.
///
/// Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct ComparisonStore {
    inner: Arc<ComparisonInner>,
}

struct ComparisonInner {
    api: ApiClient,
    freshness_window: Duration,
    cache: RwLock<ComparisonCache>,
    ids_flight: Mutex<Option<FetchFlight>>,
    full_flight: Mutex<Option<FetchFlight>>,
}

impl ComparisonStore {
    /// Create a new comparison store.
    #[must_use]
    pub fn new(api: ApiClient, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(ComparisonInner {
                api,
                freshness_window: config.freshness_window,
                cache: RwLock::new(ComparisonCache::default()),
                ids_flight: Mutex::new(None),
                full_flight: Mutex::new(None),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ComparisonCache> {
        self.inner.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ComparisonCache> {
        self.inner
            .cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Is the product being compared, with or without a variant?
    #[must_use]
    pub fn contains_product(&self, product: ProductId) -> bool {
        self.read()
            .entries
            .iter()
            .any(|entry| entry.key.product_id() == Some(product))
    }

    /// Loose variant membership: a variant-less entry matches any variant.
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
    /// variant-less entry.
    #[must_use]
    pub fn has_exact_variant(&self, product: ProductId, variant: Option<VariantId>) -> bool {
        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        self.read().entries.iter().any(|entry| entry.key == key)
    }

    /// Locate the unique item for a product/variant pair (strict match),
    /// for mutation targeting.
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

    /// Number of products being compared.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.read().entries.len()
    }

    /// Whether another product can still be added.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.item_count() < MAX_COMPARE_ITEMS
    }

    /// Derived compact projection.
    #[must_use]
    pub fn compact_ids(&self) -> CompactComparison {
        let cache = self.read();
        let mut compact = CompactComparison::default();
        for entry in &cache.entries {
            if let ItemKey::Product { product, variant } = entry.key {
                if !compact.product_ids.contains(&product) {
                    compact.product_ids.push(product);
                }
                let variants = compact.variant_map.entry(product).or_default();
                if let Some(variant) = variant {
                    variants.push(variant);
                }
            }
        }
        compact
    }

    /// Derived full projection: entries with loaded details, in cache order.
    #[must_use]
    pub fn items(&self) -> Vec<CollectionItem> {
        self.read()
            .entries
            .iter()
            .filter_map(|entry| entry.item.clone())
            .collect()
    }

    /// Drop the freshness stamps; the next fetch consults the server.
    pub fn invalidate(&self) {
        let mut cache = self.write();
        cache.ids_fresh_at = None;
        cache.full_fresh_at = None;
    }

    /// Drop the entire cache (logout, session expiry).
    pub fn reset(&self) {
        *self.write() = ComparisonCache::default();
    }

    // =========================================================================
    // Fetches
    // =========================================================================

    /// Fetch the compact form. Freshness-gated and single-flight.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous cache is preserved except on
    /// session expiry, which clears it.
    #[instrument(skip(self))]
    pub async fn fetch_ids(&self) -> Result<()> {
        if self.is_fresh(|cache| cache.ids_fresh_at) {
            debug!("comparison ids cache fresh, skipping fetch");
            return Ok(());
        }
        self.join_flight(Granularity::Ids, ComparisonInner::load_ids)
            .await
    }

    /// Fetch the full form. Tracked independently of the compact fetch.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous cache is preserved except on
    /// session expiry, which clears it.
    #[instrument(skip(self))]
    pub async fn fetch_items(&self) -> Result<()> {
        if self.is_fresh(|cache| cache.full_fresh_at) {
            debug!("comparison cache fresh, skipping fetch");
            return Ok(());
        }
        self.join_flight(Granularity::Full, ComparisonInner::load_full)
            .await
    }

    fn is_fresh(&self, stamp: impl Fn(&ComparisonCache) -> Option<Instant>) -> bool {
        stamp(&self.read()).is_some_and(|at| at.elapsed() < self.inner.freshness_window)
    }

    fn join_flight(
        &self,
        granularity: Granularity,
        load: fn(Arc<ComparisonInner>) -> BoxFuture<'static, Result<()>>,
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
    // Mutations
    // =========================================================================

    /// Add a product (optionally a specific variant) to the comparison set.
    ///
    /// Raises [`ClientError::CapacityExceeded`] without touching the cache
    /// or the network when the set already holds [`MAX_COMPARE_ITEMS`]
    /// items. Otherwise the same optimistic contract as the wishlist: 409 is
    /// treated as success and reconciled, any other failure rolls back the
    /// speculative entry and is re-raised.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::CapacityExceeded`] or the request error after
    /// rolling back.
    #[instrument(skip(self))]
    pub async fn add_product(&self, product: ProductId, variant: Option<VariantId>) -> Result<()> {
        if self.item_count() >= MAX_COMPARE_ITEMS {
            return Err(ClientError::CapacityExceeded {
                limit: MAX_COMPARE_ITEMS,
            });
        }

        let key = match variant {
            Some(variant) => ItemKey::variant(product, variant),
            None => ItemKey::product(product),
        };
        let request = AddItemRequest {
            product_id: Some(product),
            variant_id: variant,
            bundle_id: None,
        };

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

        match self
            .inner
            .api
            .post::<CollectionItem, _>(ITEMS_PATH, &request)
            .await
        {
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
                debug!("product already in comparison set, reconciling from server");
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

    /// Remove an item by its server-side ID. Optimistic removal, both
    /// freshness stamps invalidated, forced resync on failure.
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

    /// Remove by product (and optional variant) identity.
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

    /// Empty the comparison set.
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
        match self.inner.api.delete::<()>(COMPARE_PATH).await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.resync().await;
                Err(err)
            }
        }
    }

    async fn reconcile_full(&self) {
        self.write().full_fresh_at = None;
        if let Err(err) = self.fetch_items().await {
            warn!(error = %err, "comparison reconciliation fetch failed");
        }
    }

    async fn resync(&self) {
        self.invalidate();
        if let Err(err) = self.fetch_ids().await {
            warn!(error = %err, "comparison id resync failed");
        }
        if let Err(err) = self.fetch_items().await {
            warn!(error = %err, "comparison resync failed");
        }
    }
}

impl ComparisonInner {
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
                .get::<CompareIdsData>(IDS_PATH)
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
                .get::<ComparisonData>(COMPARE_PATH)
                .await
                .and_then(ApiEnvelope::require_data);
            inner.settle_full(fetched)
        }
        .boxed()
    }

    fn settle_ids(&self, fetched: Result<CompareIdsData>) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match fetched {
            Ok(data) => {
                cache.apply_compact(&data);
                cache.ids_fresh_at = Some(Instant::now());
                Ok(())
            }
            Err(err) => Err(Self::settle_failure(&mut cache, err, "comparison ids")),
        }
    }

    fn settle_full(&self, fetched: Result<ComparisonData>) -> Result<()> {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        match fetched {
            Ok(data) => {
                cache.apply_full(data);
                let now = Instant::now();
                cache.full_fresh_at = Some(now);
                cache.ids_fresh_at = Some(now);
                Ok(())
            }
            Err(err) => Err(Self::settle_failure(&mut cache, err, "comparison")),
        }
    }

    fn settle_failure(cache: &mut ComparisonCache, err: ClientError, what: &str) -> ClientError {
        if err.is_session_expired() {
            warn!("session expired during {what} fetch, cache cleared");
            *cache = ComparisonCache::default();
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
    use url::Url;

    fn test_store() -> ComparisonStore {
        let config = ClientConfig::new(Url::parse("http://127.0.0.1:9/api").unwrap());
        let session = Arc::new(Session::new());
        let broadcast = SessionBroadcast::new();
        let api = ApiClient::new(&config, session, broadcast.handle());
        ComparisonStore::new(api, &config)
    }

    fn compact(json: &str) -> CompareIdsData {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_capacity_error_without_network_call() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [1, 2, 3, 4], "variantMap": {}}"#,
        ));
        assert_eq!(store.item_count(), MAX_COMPARE_ITEMS);
        assert!(!store.has_room());

        // unreachable API host: reaching the network would fail with a
        // network error, so a capacity error proves nothing was sent
        let result = store.add_product(ProductId::new(5), None).await;
        assert!(matches!(
            result,
            Err(ClientError::CapacityExceeded { limit: MAX_COMPARE_ITEMS })
        ));
        // cache unchanged
        assert_eq!(store.item_count(), MAX_COMPARE_ITEMS);
        assert!(!store.contains_product(ProductId::new(5)));
    }

    #[tokio::test]
    async fn test_optimistic_add_rolls_back_on_network_failure() {
        let store = test_store();
        let result = store
            .add_product(ProductId::new(1), Some(VariantId::new(2)))
            .await;
        assert!(matches!(result, Err(ClientError::Network(_))));
        assert!(!store.contains_product(ProductId::new(1)));
        assert_eq!(store.item_count(), 0);
    }

    #[test]
    fn test_count_from_compact_form() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "variantMap": {"5": [9, 10], "7": []}}"#,
        ));
        assert_eq!(store.item_count(), 3);
    }

    #[test]
    fn test_membership_semantics() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5, 7], "variantMap": {"5": [9], "7": []}}"#,
        ));

        assert!(store.has_any_variant_of(ProductId::new(7), Some(VariantId::new(1))));
        assert!(!store.has_exact_variant(ProductId::new(7), Some(VariantId::new(1))));
        assert!(store.has_exact_variant(ProductId::new(5), Some(VariantId::new(9))));
        assert!(!store.has_any_variant_of(ProductId::new(5), None));
    }

    #[test]
    fn test_compact_projection_has_no_bundles() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5], "variantMap": {"5": [9]}}"#,
        ));
        let projection = store.compact_ids();
        assert_eq!(projection.product_ids, vec![ProductId::new(5)]);
        assert_eq!(
            projection.variant_map.get(&ProductId::new(5)),
            Some(&vec![VariantId::new(9)])
        );
    }

    #[test]
    fn test_reset() {
        let store = test_store();
        store.write().apply_compact(&compact(
            r#"{"productIds": [5], "variantMap": {}}"#,
        ));
        store.reset();
        assert_eq!(store.item_count(), 0);
    }
}
