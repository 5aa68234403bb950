//! In-process mock of the remote storefront API.
//!
//! Speaks the `{success, message?, data?, errors?}` envelope on every route
//! the client consumes: session endpoints under `/auth/`, wishlist and
//! comparison collections. Test hooks:
//!
//! - per-route hit counters ([`MockState::hits`])
//! - injectable latency ([`MockState::set_latency`]) for overlap tests
//! - one-shot failures ([`MockState::fail_once`]) and unparseable bodies
//!   ([`MockState::garble_once`])
//! - credential lifecycle: [`MockState::revoke_access_token`] makes the
//!   client's bearer stale (next call 401s), [`MockState::set_refresh_fails`]
//!   makes the recovery refresh terminal.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use golden_papaya_client::ClientConfig;

use crate::{ACCOUNT_EMAIL, ACCOUNT_PASSWORD};

const CSRF_HEADER: &str = "x-csrf-token";
const ADDED_AT: &str = "2026-01-05T12:00:00Z";

// =============================================================================
// Server state
// =============================================================================

/// One stored collection item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredItem {
    /// Row ID.
    pub id: i64,
    /// Product, absent for bundles.
    pub product_id: Option<i64>,
    /// Specific variant of the product.
    pub variant_id: Option<i64>,
    /// Bundle, absent for products.
    pub bundle_id: Option<i64>,
}

/// Convenient seed shape for tests.
#[derive(Debug, Clone, Copy)]
pub enum Seed {
    /// Product without a specific variant.
    Product(i64),
    /// Specific variant of a product.
    Variant(i64, i64),
    /// Bundle.
    Bundle(i64),
}

#[derive(Debug, Default)]
struct CollectionState {
    items: Vec<StoredItem>,
    is_public: bool,
}

#[derive(Clone, Copy)]
enum Which {
    Wishlist,
    Compare,
}

/// Shared mutable state of the mock server.
#[derive(Default)]
pub struct MockState {
    hits: Mutex<HashMap<String, usize>>,
    latency: Mutex<HashMap<String, Duration>>,
    fail_next: Mutex<HashMap<String, u16>>,
    garble_next: Mutex<HashSet<String>>,
    token: Mutex<Option<String>>,
    token_counter: AtomicI64,
    item_counter: AtomicI64,
    refresh_fails: AtomicBool,
    wishlist: Mutex<CollectionState>,
    compare: Mutex<CollectionState>,
}

impl MockState {
    fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How many times a route was hit. Keys look like `"GET /wishlist/ids"`.
    #[must_use]
    pub fn hits(&self, route: &str) -> usize {
        Self::lock(&self.hits).get(route).copied().unwrap_or(0)
    }

    /// Delay every request to a route; used to force request overlap.
    pub fn set_latency(&self, route: &str, delay: Duration) {
        Self::lock(&self.latency).insert(route.to_owned(), delay);
    }

    /// Make the next request to a route fail with the given status.
    pub fn fail_once(&self, route: &str, status: u16) {
        Self::lock(&self.fail_next).insert(route.to_owned(), status);
    }

    /// Make the next response on a route an unparseable body.
    pub fn garble_once(&self, route: &str) {
        Self::lock(&self.garble_next).insert(route.to_owned());
    }

    /// Rotate the accepted bearer without telling the client: its next
    /// request observes a 401 and enters credential recovery.
    pub fn revoke_access_token(&self) {
        self.rotate_token();
    }

    /// Whether the recovery refresh should fail terminally.
    pub fn set_refresh_fails(&self, fails: bool) {
        self.refresh_fails.store(fails, Ordering::SeqCst);
    }

    /// Seed the wishlist with items, bypassing the API.
    pub fn seed_wishlist(&self, seeds: &[Seed]) -> Vec<i64> {
        self.seed(&self.wishlist, seeds)
    }

    /// Seed the comparison set with items, bypassing the API.
    pub fn seed_compare(&self, seeds: &[Seed]) -> Vec<i64> {
        self.seed(&self.compare, seeds)
    }

    /// Raw wishlist contents, for asserting server-side effects.
    #[must_use]
    pub fn wishlist_items(&self) -> Vec<StoredItem> {
        Self::lock(&self.wishlist).items.clone()
    }

    /// Raw comparison contents, for asserting server-side effects.
    #[must_use]
    pub fn compare_items(&self) -> Vec<StoredItem> {
        Self::lock(&self.compare).items.clone()
    }

    /// Whether the wishlist is flagged public.
    #[must_use]
    pub fn wishlist_is_public(&self) -> bool {
        Self::lock(&self.wishlist).is_public
    }

    fn seed(&self, collection: &Mutex<CollectionState>, seeds: &[Seed]) -> Vec<i64> {
        let mut guard = Self::lock(collection);
        seeds
            .iter()
            .map(|seed| {
                let id = self.item_counter.fetch_add(1, Ordering::SeqCst) + 1;
                let item = match *seed {
                    Seed::Product(product) => StoredItem {
                        id,
                        product_id: Some(product),
                        variant_id: None,
                        bundle_id: None,
                    },
                    Seed::Variant(product, variant) => StoredItem {
                        id,
                        product_id: Some(product),
                        variant_id: Some(variant),
                        bundle_id: None,
                    },
                    Seed::Bundle(bundle) => StoredItem {
                        id,
                        product_id: None,
                        variant_id: None,
                        bundle_id: Some(bundle),
                    },
                };
                guard.items.push(item);
                id
            })
            .collect()
    }

    fn rotate_token(&self) -> String {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("token-{n}");
        *Self::lock(&self.token) = Some(token.clone());
        token
    }

    fn record_hit(&self, route: &str) {
        *Self::lock(&self.hits).entry(route.to_owned()).or_insert(0) += 1;
    }

    fn latency_for(&self, route: &str) -> Option<Duration> {
        Self::lock(&self.latency).get(route).copied()
    }

    fn take_failure(&self, route: &str) -> Option<u16> {
        Self::lock(&self.fail_next).remove(route)
    }

    fn take_garble(&self, route: &str) -> bool {
        Self::lock(&self.garble_next).remove(route)
    }

    fn bearer_ok(&self, headers: &HeaderMap) -> bool {
        let Some(token) = Self::lock(&self.token).clone() else {
            return false;
        };
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {token}"))
    }

    fn csrf_ok(&self, headers: &HeaderMap) -> bool {
        let Some(token) = Self::lock(&self.token).clone() else {
            return false;
        };
        headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("csrf-{token}"))
    }

    fn collection(&self, which: Which) -> &Mutex<CollectionState> {
        match which {
            Which::Wishlist => &self.wishlist,
            Which::Compare => &self.compare,
        }
    }
}

// =============================================================================
// Server handle
// =============================================================================

/// A running mock API bound to an ephemeral local port.
pub struct MockApi {
    /// Test hooks and server-side state.
    pub state: Arc<MockState>,
    /// Base URL for a [`ClientConfig`].
    pub base_url: Url,
    server: tokio::task::JoinHandle<()>,
}

impl MockApi {
    /// Bind and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind.
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock listener");
        let addr = listener.local_addr().expect("mock listener address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });

        Self {
            state,
            base_url: Url::parse(&format!("http://{addr}/")).expect("mock base url"),
            server,
        }
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/wishlist", get(wishlist_full).delete(wishlist_clear).patch(wishlist_visibility))
        .route("/wishlist/ids", get(wishlist_ids))
        .route("/wishlist/items", post(wishlist_add))
        .route("/wishlist/items/{id}", delete(wishlist_remove))
        .route("/wishlist/items/by-product/{id}", delete(wishlist_remove_by_product))
        .route("/compare", get(compare_full).delete(compare_clear))
        .route("/compare/ids", get(compare_ids))
        .route("/compare/items", post(compare_add))
        .route("/compare/items/{id}", delete(compare_remove))
        .route("/compare/items/by-product/{id}", delete(compare_remove_by_product))
        .with_state(state)
}

// =============================================================================
// Envelope helpers
// =============================================================================

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "message": message}))).into_response()
}

fn ok_data(data: Value) -> Response {
    Json(json!({"success": true, "data": data})).into_response()
}

fn ok_empty() -> Response {
    Json(json!({"success": true})).into_response()
}

/// Shared request bookkeeping: hit counter, latency, injected failures, and
/// (where required) bearer and anti-forgery checks.
async fn preflight(
    state: &MockState,
    route: &str,
    headers: &HeaderMap,
    auth: bool,
    csrf: bool,
) -> Result<(), Response> {
    state.record_hit(route);
    if let Some(delay) = state.latency_for(route) {
        tokio::time::sleep(delay).await;
    }
    if state.take_garble(route) {
        return Err((StatusCode::OK, "not-json").into_response());
    }
    if let Some(status) = state.take_failure(route) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Err(fail(status, "injected failure"));
    }
    if auth && !state.bearer_ok(headers) {
        return Err(fail(StatusCode::UNAUTHORIZED, "credential expired"));
    }
    if csrf && !state.csrf_ok(headers) {
        return Err(fail(StatusCode::FORBIDDEN, "missing anti-forgery token"));
    }
    Ok(())
}

fn user_json(email: &str) -> Value {
    json!({"id": 1, "email": email, "firstName": "Ada", "lastName": "Lovelace"})
}

fn auth_payload(state: &MockState, email: &str) -> Response {
    let token = state.rotate_token();
    ok_data(json!({
        "user": user_json(email),
        "accessToken": token,
        "csrfToken": format!("csrf-{token}"),
    }))
}

fn money() -> Value {
    json!({"amount": "19.99", "currencyCode": "USD"})
}

fn item_json(item: &StoredItem) -> Value {
    json!({
        "id": item.id,
        "product": item.product_id.map(|id| json!({
            "id": id,
            "title": format!("Product {id}"),
            "handle": format!("product-{id}"),
            "imageUrl": null,
            "price": money(),
        })),
        "variant": item.variant_id.map(|id| json!({
            "id": id,
            "title": format!("Variant {id}"),
            "price": money(),
        })),
        "bundle": item.bundle_id.map(|id| json!({
            "id": id,
            "title": format!("Bundle {id}"),
            "price": money(),
        })),
        "addedAt": ADDED_AT,
    })
}

fn compact_json(items: &[StoredItem], include_bundles: bool) -> Value {
    let mut product_ids: Vec<i64> = Vec::new();
    let mut bundle_ids: Vec<i64> = Vec::new();
    let mut variant_map: serde_json::Map<String, Value> = serde_json::Map::new();
    for item in items {
        if let Some(bundle) = item.bundle_id {
            bundle_ids.push(bundle);
        } else if let Some(product) = item.product_id {
            if !product_ids.contains(&product) {
                product_ids.push(product);
            }
            let entry = variant_map
                .entry(product.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let (Some(variant), Value::Array(list)) = (item.variant_id, entry) {
                list.push(json!(variant));
            }
        }
    }
    if include_bundles {
        json!({"productIds": product_ids, "bundleIds": bundle_ids, "variantMap": variant_map})
    } else {
        json!({"productIds": product_ids, "variantMap": variant_map})
    }
}

// =============================================================================
// Auth handlers
// =============================================================================

async fn login(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = preflight(&state, "POST /auth/login", &headers, false, false).await {
        return response;
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    let password = body
        .get("password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if email != ACCOUNT_EMAIL || password != ACCOUNT_PASSWORD {
        return fail(StatusCode::UNAUTHORIZED, "invalid credentials");
    }
    auth_payload(&state, email)
}

async fn register(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = preflight(&state, "POST /auth/register", &headers, false, false).await {
        return response;
    }
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email == ACCOUNT_EMAIL {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "success": false,
                "message": "validation failed",
                "errors": {"email": "already registered"},
            })),
        )
            .into_response();
    }
    auth_payload(&state, email)
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(&state, "POST /auth/refresh", &headers, false, false).await {
        return response;
    }
    let has_session = MockState::lock(&state.token).is_some();
    if state.refresh_fails.load(Ordering::SeqCst) || !has_session {
        return fail(StatusCode::UNAUTHORIZED, "refresh token invalid");
    }
    auth_payload(&state, ACCOUNT_EMAIL)
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(&state, "POST /auth/logout", &headers, false, false).await {
        return response;
    }
    *MockState::lock(&state.token) = None;
    ok_empty()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(&state, "GET /auth/me", &headers, true, false).await {
        return response;
    }
    ok_data(user_json(ACCOUNT_EMAIL))
}

// =============================================================================
// Collection handlers
// =============================================================================

async fn collection_ids(state: &MockState, which: Which, route: &str, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, false).await {
        return response;
    }
    let items = MockState::lock(state.collection(which)).items.clone();
    ok_data(compact_json(&items, matches!(which, Which::Wishlist)))
}

async fn collection_full(state: &MockState, which: Which, route: &str, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, false).await {
        return response;
    }
    let guard = MockState::lock(state.collection(which));
    let items: Vec<Value> = guard.items.iter().map(item_json).collect();
    match which {
        Which::Wishlist => ok_data(json!({"items": items, "isPublic": guard.is_public})),
        Which::Compare => ok_data(json!({"items": items})),
    }
}

async fn collection_add(
    state: &MockState,
    which: Which,
    route: &str,
    headers: HeaderMap,
    body: &Value,
) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, true).await {
        return response;
    }
    let product_id = body.get("productId").and_then(Value::as_i64);
    let variant_id = body.get("variantId").and_then(Value::as_i64);
    let bundle_id = body.get("bundleId").and_then(Value::as_i64);
    if product_id.is_none() && bundle_id.is_none() {
        return fail(StatusCode::BAD_REQUEST, "productId or bundleId required");
    }

    let mut guard = MockState::lock(state.collection(which));
    let duplicate = guard.items.iter().any(|item| {
        item.product_id == product_id
            && item.variant_id == variant_id
            && item.bundle_id == bundle_id
    });
    if duplicate {
        return fail(StatusCode::CONFLICT, "item already in collection");
    }

    let item = StoredItem {
        id: state.item_counter.fetch_add(1, Ordering::SeqCst) + 1,
        product_id,
        variant_id,
        bundle_id,
    };
    guard.items.push(item);
    (StatusCode::CREATED, Json(json!({"success": true, "data": item_json(&item)}))).into_response()
}

async fn collection_remove(
    state: &MockState,
    which: Which,
    route: &str,
    headers: HeaderMap,
    id: i64,
) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, true).await {
        return response;
    }
    let mut guard = MockState::lock(state.collection(which));
    let before = guard.items.len();
    guard.items.retain(|item| item.id != id);
    if guard.items.len() == before {
        return fail(StatusCode::NOT_FOUND, "item not found");
    }
    ok_empty()
}

async fn collection_remove_by_product(
    state: &MockState,
    which: Which,
    route: &str,
    headers: HeaderMap,
    product: i64,
    variant: Option<i64>,
) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, true).await {
        return response;
    }
    let mut guard = MockState::lock(state.collection(which));
    guard
        .items
        .retain(|item| !(item.product_id == Some(product) && item.variant_id == variant));
    ok_empty()
}

async fn collection_clear(state: &MockState, which: Which, route: &str, headers: HeaderMap) -> Response {
    if let Err(response) = preflight(state, route, &headers, true, true).await {
        return response;
    }
    MockState::lock(state.collection(which)).items.clear();
    ok_empty()
}

async fn wishlist_ids(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_ids(&state, Which::Wishlist, "GET /wishlist/ids", headers).await
}

async fn wishlist_full(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_full(&state, Which::Wishlist, "GET /wishlist", headers).await
}

async fn wishlist_add(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    collection_add(&state, Which::Wishlist, "POST /wishlist/items", headers, &body).await
}

async fn wishlist_remove(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    collection_remove(&state, Which::Wishlist, "DELETE /wishlist/items/{id}", headers, id).await
}

async fn wishlist_remove_by_product(
    State(state): State<Arc<MockState>>,
    Path(product): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let variant = query.get("variantId").and_then(|value| value.parse().ok());
    collection_remove_by_product(
        &state,
        Which::Wishlist,
        "DELETE /wishlist/items/by-product/{id}",
        headers,
        product,
        variant,
    )
    .await
}

async fn wishlist_clear(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_clear(&state, Which::Wishlist, "DELETE /wishlist", headers).await
}

async fn wishlist_visibility(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(response) = preflight(&state, "PATCH /wishlist", &headers, true, true).await {
        return response;
    }
    let Some(is_public) = body.get("isPublic").and_then(Value::as_bool) else {
        return fail(StatusCode::BAD_REQUEST, "isPublic required");
    };
    MockState::lock(&state.wishlist).is_public = is_public;
    ok_empty()
}

async fn compare_ids(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_ids(&state, Which::Compare, "GET /compare/ids", headers).await
}

async fn compare_full(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_full(&state, Which::Compare, "GET /compare", headers).await
}

async fn compare_add(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    collection_add(&state, Which::Compare, "POST /compare/items", headers, &body).await
}

async fn compare_remove(
    State(state): State<Arc<MockState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    collection_remove(&state, Which::Compare, "DELETE /compare/items/{id}", headers, id).await
}

async fn compare_remove_by_product(
    State(state): State<Arc<MockState>>,
    Path(product): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let variant = query.get("variantId").and_then(|value| value.parse().ok());
    collection_remove_by_product(
        &state,
        Which::Compare,
        "DELETE /compare/items/by-product/{id}",
        headers,
        product,
        variant,
    )
    .await
}

async fn compare_clear(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    collection_clear(&state, Which::Compare, "DELETE /compare", headers).await
}
