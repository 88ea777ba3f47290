//! Integration tests for concurrent catalog edits over the in-memory store.

use std::sync::Arc;

use common::{Money, ProductId, Version};
use domain::{DomainError, NewMaterial, NewPriceTier, NewProduct, ProductUpdate};
use futures_util::future::join_all;
use services::{CatalogService, ServiceError};
use store::{InMemoryStore, Store};

async fn catalog_with_product() -> (Arc<CatalogService<InMemoryStore>>, ProductId) {
    let service = CatalogService::new(InMemoryStore::new());
    let product = service
        .create_product(NewProduct {
            name: "Shelf".to_string(),
            size: "80cm".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    (Arc::new(service), product.id)
}

fn tier(start: u32, end: u32, price: i64) -> NewPriceTier {
    NewPriceTier {
        start,
        end,
        price: Money::from_minor(price),
        description: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_tiers_keep_one() {
    let (service, product_id) = catalog_with_product().await;

    // Every range overlaps every other one; at most one may be stored.
    let handles = (0..6u32).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .add_price_tier(product_id, tier(1 + i, 20 + i, 1000 + i64::from(i)))
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| {
        err.is_concurrency_conflict()
            || matches!(err, ServiceError::Domain(DomainError::InvalidInput { .. }))
    }));

    let stored = service.get_product(product_id).await.unwrap();
    assert_eq!(stored.price_tiers.len(), 1);
    assert_eq!(stored.version, Version::new(1));
}

#[tokio::test]
async fn stale_product_write_is_a_concurrency_conflict() {
    let (service, product_id) = catalog_with_product().await;
    let mut stale = service.get_product(product_id).await.unwrap();

    service
        .add_price_tier(product_id, tier(1, 10, 1500))
        .await
        .unwrap();

    // An edit built on the old snapshot would drop the tier added above.
    stale.add_price_tier(tier(5, 50, 900)).unwrap();
    let err: ServiceError = service
        .store()
        .update_product(&stale, stale.version)
        .await
        .map_err(ServiceError::from)
        .unwrap_err();
    assert!(err.is_concurrency_conflict());

    let stored = service.get_product(product_id).await.unwrap();
    assert_eq!(stored.price_tiers.len(), 1);
    assert_eq!(stored.price_tiers[0].start, 1);
}

#[tokio::test]
async fn every_product_edit_bumps_the_version() {
    let (service, product_id) = catalog_with_product().await;
    let material = service
        .create_material(NewMaterial {
            name: "Pine board".to_string(),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(3000),
            units_per_pack: 1,
            count_left: 4,
            ..Default::default()
        })
        .await
        .unwrap();

    let product = service
        .add_bom_entry(product_id, material.id, 2)
        .await
        .unwrap();
    assert_eq!(product.version, Version::new(1));

    let product = service
        .add_price_tier(product_id, tier(1, 10, 2000))
        .await
        .unwrap();
    assert_eq!(product.version, Version::new(2));

    let product = service
        .update_product(
            product_id,
            ProductUpdate {
                description: Some("Wall shelf".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(product.version, Version::new(3));
    assert_eq!(
        service.get_product(product_id).await.unwrap().version,
        Version::new(3)
    );
}
