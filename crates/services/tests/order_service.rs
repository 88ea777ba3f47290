//! Integration tests for the order service over the in-memory store.

use std::sync::Arc;

use common::{MaterialId, Money};
use domain::{
    DomainError, LineRequest, Material, NewMaterial, NewOrder, NewPriceTier, NewProduct, Order,
    OrderStatus, Product,
};
use futures_util::future::join_all;
use services::{OrderService, ServiceConfig, ServiceError};
use store::{CommitOptions, InMemoryStore, OrderFilter, Page, Store};

/// Material M with `count_left` units; one unit of M covers 5 units of P.
async fn setup(
    count_left: i64,
    unit_price: i64,
) -> (OrderService<InMemoryStore>, MaterialId, Product) {
    let store = InMemoryStore::new();
    let material = Material::new(NewMaterial {
        name: "M".to_string(),
        material_type: "sheet".to_string(),
        pack_price: Money::from_minor(1000),
        units_per_pack: 1,
        count_left,
        ..Default::default()
    })
    .unwrap();
    let mut product = Product::new(NewProduct {
        name: "P".to_string(),
        ..Default::default()
    })
    .unwrap();
    product.add_bom_entry(material.id, 5).unwrap();
    product
        .add_price_tier(NewPriceTier {
            start: 1,
            end: 1000,
            price: Money::from_minor(unit_price),
            description: None,
        })
        .unwrap();

    store.insert_material(&material).await.unwrap();
    store.insert_product(&product).await.unwrap();
    (
        OrderService::new(store, ServiceConfig::default()),
        material.id,
        product,
    )
}

async fn order_for(
    service: &OrderService<InMemoryStore>,
    product: &Product,
    quantity: u32,
) -> Order {
    let order = service
        .create(NewOrder {
            customer: Some("Workshop client".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    service
        .set_lines(
            order.id,
            vec![LineRequest {
                product_id: product.id,
                quantity,
            }],
        )
        .await
        .unwrap()
}

async fn count_left(service: &OrderService<InMemoryStore>, material: MaterialId) -> i64 {
    service
        .store()
        .get_material(material)
        .await
        .unwrap()
        .unwrap()
        .count_left
}

/// Creates an order of 4 units at 2500 each (total 10000) and moves it to READY.
async fn ready_order(service: &OrderService<InMemoryStore>, product: &Product) -> Order {
    let order = order_for(service, product, 4).await;
    assert_eq!(order.total_price.minor(), 10_000);
    service.confirm(order.id).await.unwrap();
    service.mark_ready(order.id).await.unwrap()
}

#[tokio::test]
async fn sequential_confirmations_drain_stock() {
    let (service, material, product) = setup(10, 2500).await;

    let first = order_for(&service, &product, 12).await;
    assert_eq!(first.lines[0].usages[0].budgeted_usage, 3);
    service.confirm(first.id).await.unwrap();
    assert_eq!(count_left(&service, material).await, 7);

    let second = order_for(&service, &product, 8).await;
    service.confirm(second.id).await.unwrap();
    assert_eq!(count_left(&service, material).await, 5);

    let third = order_for(&service, &product, 30).await;
    let err = service.confirm(third.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InsufficientStock {
            needed: 6,
            available: 5,
            ..
        })
    ));
    assert_eq!(count_left(&service, material).await, 5);
    assert_eq!(
        service.get(third.id).await.unwrap().status,
        OrderStatus::Created
    );
}

#[tokio::test]
async fn complete_fully_paid_order() {
    let (service, _, product) = setup(100, 2500).await;
    let order = ready_order(&service, &product).await;

    service
        .record_payment(order.id, Money::from_minor(10_000))
        .await
        .unwrap();
    let order = service.complete(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert!(order.completed_at.is_some());
}

#[tokio::test]
async fn complete_with_balance_is_unpaid() {
    let (service, _, product) = setup(100, 2500).await;
    let order = ready_order(&service, &product).await;

    service
        .record_payment(order.id, Money::from_minor(7000))
        .await
        .unwrap();
    let err = service.complete(order.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Unpaid { remains }) if remains.minor() == 3000
    ));
    assert_eq!(service.get(order.id).await.unwrap().status, OrderStatus::Ready);
}

#[tokio::test]
async fn overpayment_is_rejected() {
    let (service, _, product) = setup(100, 2500).await;
    let order = ready_order(&service, &product).await;
    service
        .record_payment(order.id, Money::from_minor(9000))
        .await
        .unwrap();

    let err = service
        .record_payment(order.id, Money::from_minor(1001))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::Overpayment { remains, .. }) if remains.minor() == 1000
    ));
    assert_eq!(service.get(order.id).await.unwrap().paid.minor(), 9000);
}

#[tokio::test]
async fn shipped_orders_can_complete() {
    let (service, _, product) = setup(100, 2500).await;
    let order = ready_order(&service, &product).await;

    let order = service.mark_shipped(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Shipped);
    service
        .record_payment(order.id, Money::from_minor(10_000))
        .await
        .unwrap();
    let order = service.complete(order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Completed);

    let err = service.cancel(order.id).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Domain(DomainError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn concurrent_confirmations_never_overdraw() {
    let (service, material, product) = setup(10, 2500).await;
    let service = Arc::new(service);

    // Each order needs 3 units; only three of them fit into 10.
    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(order_for(&service, &product, 15).await.id);
    }

    let handles = ids.into_iter().map(|id| {
        let service = service.clone();
        tokio::spawn(async move { service.confirm(id).await })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(confirmed, 3);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(ServiceError::is_insufficient_stock)
    );
    assert_eq!(count_left(&service, material).await, 1);
}

#[tokio::test]
async fn stale_commit_is_a_concurrency_conflict() {
    let (service, _, product) = setup(100, 2500).await;
    let stale = order_for(&service, &product, 4).await;
    service.confirm(stale.id).await.unwrap();

    let err: ServiceError = service
        .store()
        .commit_order(&stale, CommitOptions::expect_version(stale.version))
        .await
        .map_err(ServiceError::from)
        .unwrap_err();
    assert!(err.is_concurrency_conflict());
}

#[tokio::test]
async fn list_orders_by_status() {
    let (service, _, product) = setup(100, 2500).await;
    let confirmed = order_for(&service, &product, 4).await;
    service.confirm(confirmed.id).await.unwrap();
    order_for(&service, &product, 4).await;

    let listing = service
        .list(
            &OrderFilter::new().status(OrderStatus::InProgress),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.items[0].id, confirmed.id);

    let listing = service
        .list(&OrderFilter::new().customer("Workshop client"), Page::default())
        .await
        .unwrap();
    assert_eq!(listing.total, 2);
}
