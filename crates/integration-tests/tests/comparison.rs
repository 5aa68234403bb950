//! Integration tests for the comparison store, capacity enforcement in
//! particular.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use golden_papaya_client::stores::MAX_COMPARE_ITEMS;
use golden_papaya_client::ClientError;
use golden_papaya_core::{ProductId, VariantId};
use golden_papaya_integration_tests::mock::Seed;
use golden_papaya_integration_tests::{login, storefront_against_mock};

// =============================================================================
// Capacity
// =============================================================================

#[tokio::test]
async fn test_capacity_error_without_any_network_call() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;

    for product in 1..=4_i64 {
        storefront
            .compare
            .add_product(ProductId::new(product), None)
            .await
            .unwrap();
    }
    assert_eq!(api.state.hits("POST /compare/items"), 4);
    assert_eq!(storefront.compare.item_count(), MAX_COMPARE_ITEMS);
    assert!(!storefront.compare.has_room());

    let err = storefront
        .compare
        .add_product(ProductId::new(5), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::CapacityExceeded {
            limit: MAX_COMPARE_ITEMS
        }
    ));
    // zero additional requests, cache unchanged
    assert_eq!(api.state.hits("POST /compare/items"), 4);
    assert_eq!(storefront.compare.item_count(), MAX_COMPARE_ITEMS);
    assert!(!storefront.compare.contains_product(ProductId::new(5)));
}

#[tokio::test]
async fn test_room_frees_up_after_removal() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    api.state.seed_compare(&[
        Seed::Product(1),
        Seed::Product(2),
        Seed::Product(3),
        Seed::Product(4),
    ]);

    storefront.compare.fetch_items().await.unwrap();
    assert!(!storefront.compare.has_room());

    let item = storefront
        .compare
        .item_for_variant(ProductId::new(4), None)
        .unwrap();
    storefront.compare.remove_item(item.id).await.unwrap();

    storefront
        .compare
        .add_product(ProductId::new(5), None)
        .await
        .unwrap();
    assert!(storefront.compare.contains_product(ProductId::new(5)));
}

// =============================================================================
// Fetch Discipline
// =============================================================================

#[tokio::test]
async fn test_concurrent_fetches_share_one_request() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    api.state.seed_compare(&[Seed::Variant(1, 2)]);
    api.state
        .set_latency("GET /compare/ids", Duration::from_millis(100));

    let fetches: Vec<_> = (0..4).map(|_| storefront.compare.fetch_ids()).collect();
    let results = futures::future::join_all(fetches).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(api.state.hits("GET /compare/ids"), 1);
    assert_eq!(storefront.compare.item_count(), 1);

    // and a repeat within the freshness window stays local
    storefront.compare.fetch_ids().await.unwrap();
    assert_eq!(api.state.hits("GET /compare/ids"), 1);
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_failed_add_rolls_back() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    api.state.fail_once("POST /compare/items", 500);

    let err = storefront
        .compare
        .add_product(ProductId::new(1), Some(VariantId::new(2)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert!(!storefront.compare.contains_product(ProductId::new(1)));
    assert_eq!(storefront.compare.item_count(), 0);
}

#[tokio::test]
async fn test_conflict_is_idempotent_success() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;

    storefront
        .compare
        .add_product(ProductId::new(1), Some(VariantId::new(2)))
        .await
        .unwrap();
    storefront
        .compare
        .add_product(ProductId::new(1), Some(VariantId::new(2)))
        .await
        .unwrap();

    assert!(
        storefront
            .compare
            .has_exact_variant(ProductId::new(1), Some(VariantId::new(2)))
    );
    assert_eq!(api.state.compare_items().len(), 1);
}

#[tokio::test]
async fn test_clear() {
    let (api, storefront) = storefront_against_mock().await;
    login(&storefront).await;
    api.state.seed_compare(&[Seed::Product(1), Seed::Product(2)]);
    storefront.compare.fetch_ids().await.unwrap();

    storefront.compare.clear().await.unwrap();
    assert_eq!(storefront.compare.item_count(), 0);
    assert!(api.state.compare_items().is_empty());
}
