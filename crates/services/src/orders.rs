//! Order operations: load, run the transition, commit.

use std::time::Instant;

use common::{AdditionalCostId, Money, OrderId, OrderLineId, ProductId};
use domain::{
    Catalog, DomainError, LineRequest, NewOrder, Order, Transition, UsageAdjustment,
};
use store::{CommitOptions, Listing, OrderFilter, Page, Store};

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::telemetry;

/// Which products (and their materials) an operation needs in its catalog.
enum CatalogScope<'a> {
    /// The transition never looks anything up.
    Empty,
    /// Products of the order's lines plus any extra requested ones.
    Order(&'a [ProductId]),
}

/// Service for managing orders.
///
/// Every mutation loads the order, builds the catalog it needs, runs the
/// pure transition and commits the result together with its stock changes.
/// A commit against a stale version fails; nothing is retried.
pub struct OrderService<S: Store> {
    store: S,
    config: ServiceConfig,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Creates an empty order in CREATED state.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, input: NewOrder) -> Result<Order> {
        let order = Order::new(input);
        self.store.insert_order(&order).await?;
        tracing::info!(order_id = %order.id, "order created");
        Ok(order)
    }

    /// Loads an order. Fails with `NotFound` when it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id).into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, filter: &OrderFilter, page: Page) -> Result<Listing<Order>> {
        Ok(self.store.list_orders(filter, page).await?)
    }

    /// Replaces all lines of a CREATED order.
    #[tracing::instrument(skip(self))]
    pub async fn set_lines(&self, order_id: OrderId, lines: Vec<LineRequest>) -> Result<Order> {
        let products: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        self.execute(
            order_id,
            "set_lines",
            CatalogScope::Order(&products),
            |order, catalog| order.set_lines(&lines, catalog),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_line(&self, order_id: OrderId, request: LineRequest) -> Result<Order> {
        self.execute(
            order_id,
            "add_line",
            CatalogScope::Order(&[request.product_id]),
            |order, catalog| order.add_line(request, catalog),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_line_quantity(
        &self,
        order_id: OrderId,
        line_id: OrderLineId,
        quantity: u32,
    ) -> Result<Order> {
        self.execute(
            order_id,
            "change_line_quantity",
            CatalogScope::Order(&[]),
            |order, catalog| order.change_line_quantity(line_id, quantity, catalog),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, order_id: OrderId, line_id: OrderLineId) -> Result<Order> {
        self.execute(order_id, "remove_line", CatalogScope::Empty, |order, _| {
            order.remove_line(line_id)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_cost(
        &self,
        order_id: OrderId,
        amount: Money,
        description: Option<String>,
    ) -> Result<Order> {
        self.execute(order_id, "add_cost", CatalogScope::Empty, |order, _| {
            order.add_cost(amount, description)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_cost(&self, order_id: OrderId, cost_id: AdditionalCostId) -> Result<Order> {
        self.execute(order_id, "remove_cost", CatalogScope::Empty, |order, _| {
            order.remove_cost(cost_id)
        })
        .await
    }

    /// CREATED -> IN_PROGRESS, deducting the resolved material usage.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, order_id: OrderId) -> Result<Order> {
        self.execute(
            order_id,
            "confirm",
            CatalogScope::Order(&[]),
            |order, catalog| order.confirm(catalog),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn record_payment(&self, order_id: OrderId, payment: Money) -> Result<Order> {
        self.execute(order_id, "record_payment", CatalogScope::Empty, |order, _| {
            order.record_payment(payment)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn adjust_material_usage(
        &self,
        order_id: OrderId,
        adjustments: Vec<UsageAdjustment>,
    ) -> Result<Order> {
        self.execute(
            order_id,
            "adjust_material_usage",
            CatalogScope::Order(&[]),
            |order, catalog| order.adjust_material_usage(&adjustments, catalog),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_ready(&self, order_id: OrderId) -> Result<Order> {
        self.execute(order_id, "mark_ready", CatalogScope::Empty, |order, _| {
            order.mark_ready()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_shipped(&self, order_id: OrderId) -> Result<Order> {
        self.execute(order_id, "mark_shipped", CatalogScope::Empty, |order, _| {
            order.mark_shipped()
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, order_id: OrderId) -> Result<Order> {
        self.execute(order_id, "complete", CatalogScope::Empty, |order, _| {
            order.complete()
        })
        .await
    }

    /// Cancels the order under the configured cancellation policy.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<Order> {
        let policy = self.config.cancellation_policy;
        self.execute(order_id, "cancel", CatalogScope::Empty, |order, _| {
            order.cancel(policy)
        })
        .await
    }

    /// Runs one load -> transition -> commit cycle and records its outcome.
    async fn execute<F>(
        &self,
        order_id: OrderId,
        operation: &'static str,
        scope: CatalogScope<'_>,
        transition: F,
    ) -> Result<Order>
    where
        F: FnOnce(&Order, &Catalog) -> domain::Result<Transition>,
    {
        let started = Instant::now();
        let result = self.run(order_id, scope, transition).await;
        telemetry::record_transition(operation, started, result.is_ok());

        match &result {
            Ok(order) => {
                telemetry::record_success(operation);
                tracing::info!(
                    order_id = %order.id,
                    operation,
                    status = %order.status,
                    version = %order.version,
                    "order updated"
                );
            }
            Err(err) if err.is_insufficient_stock() => {
                telemetry::record_stock_rejection(operation);
                tracing::warn!(order_id = %order_id, operation, error = %err, "stock rejected");
            }
            Err(err) => {
                tracing::debug!(
                    order_id = %order_id,
                    operation,
                    error = %err,
                    "order operation rejected"
                );
            }
        }
        result
    }

    async fn run<F>(
        &self,
        order_id: OrderId,
        scope: CatalogScope<'_>,
        transition: F,
    ) -> Result<Order>
    where
        F: FnOnce(&Order, &Catalog) -> domain::Result<Transition>,
    {
        let current = self.get(order_id).await?;
        let catalog = match scope {
            CatalogScope::Empty => Catalog::new(),
            CatalogScope::Order(extra) => self.catalog_for(&current, extra).await?,
        };

        let Transition { mut order, stock } = transition(&current, &catalog)?;
        let version = self
            .store
            .commit_order(
                &order,
                CommitOptions::expect_version(current.version).with_stock(stock),
            )
            .await?;
        order.version = version;
        Ok(order)
    }

    /// Loads the products of the order's lines and `extra`, and every
    /// material their bills-of-materials or the order's usages reference.
    async fn catalog_for(&self, order: &Order, extra: &[ProductId]) -> Result<Catalog> {
        let mut product_ids = order.product_ids();
        product_ids.extend_from_slice(extra);
        product_ids.sort();
        product_ids.dedup();

        let mut catalog = Catalog::new();
        for product in self.store.get_products(&product_ids).await? {
            catalog.insert_product(product);
        }

        let mut material_ids = catalog.referenced_materials();
        material_ids.extend(order.material_ids());
        material_ids.sort();
        material_ids.dedup();

        for material in self.store.get_materials(&material_ids).await? {
            catalog.insert_material(material);
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use domain::{
        CancellationPolicy, Material, NewMaterial, NewPriceTier, NewProduct, OrderStatus, Product,
    };
    use store::InMemoryStore;

    struct Fixture {
        service: OrderService<InMemoryStore>,
        material: Material,
        product: Product,
    }

    async fn fixture(count_left: i64, config: ServiceConfig) -> Fixture {
        let store = InMemoryStore::new();
        let material = Material::new(NewMaterial {
            name: "Felt".to_string(),
            material_type: "fabric".to_string(),
            pack_price: Money::from_minor(1000),
            units_per_pack: 1,
            count_left,
            ..Default::default()
        })
        .unwrap();
        let mut product = Product::new(NewProduct {
            name: "Coaster".to_string(),
            size: "S".to_string(),
            ..Default::default()
        })
        .unwrap();
        product.add_bom_entry(material.id, 4).unwrap();
        product
            .add_price_tier(NewPriceTier {
                start: 1,
                end: 100,
                price: Money::from_minor(500),
                description: None,
            })
            .unwrap();
        store.insert_material(&material).await.unwrap();
        store.insert_product(&product).await.unwrap();

        Fixture {
            service: OrderService::new(store, config),
            material,
            product,
        }
    }

    async fn stock_of(fixture: &Fixture) -> i64 {
        fixture
            .service
            .store()
            .get_material(fixture.material.id)
            .await
            .unwrap()
            .unwrap()
            .count_left
    }

    async fn confirmed_order(fixture: &Fixture, quantity: u32) -> Order {
        let order = fixture.service.create(NewOrder::default()).await.unwrap();
        fixture
            .service
            .add_line(
                order.id,
                LineRequest {
                    product_id: fixture.product.id,
                    quantity,
                },
            )
            .await
            .unwrap();
        fixture.service.confirm(order.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_order() {
        let f = fixture(10, ServiceConfig::default()).await;
        let err = f.service.get(OrderId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::NotFound { entity: "order", .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_deducts_and_bumps_version() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;

        assert_eq!(order.status, OrderStatus::InProgress);
        assert_eq!(order.version.as_i64(), 2);
        assert_eq!(order.total_price.minor(), 5000);
        assert_eq!(stock_of(&f).await, 7);

        let stored = f.service.get(order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_confirm_shortfall_leaves_everything() {
        let f = fixture(2, ServiceConfig::default()).await;
        let order = f.service.create(NewOrder::default()).await.unwrap();
        f.service
            .add_line(
                order.id,
                LineRequest {
                    product_id: f.product.id,
                    quantity: 10,
                },
            )
            .await
            .unwrap();

        let err = f.service.confirm(order.id).await.unwrap_err();
        assert!(err.is_insufficient_stock());
        assert_eq!(stock_of(&f).await, 2);
        let stored = f.service.get(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = f.service.create(NewOrder::default()).await.unwrap();
        let err = f
            .service
            .add_line(
                order.id,
                LineRequest {
                    product_id: ProductId::new(),
                    quantity: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::NotFound { entity: "product", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_policy_from_config() {
        let f = fixture(
            10,
            ServiceConfig::default().with_cancellation_policy(CancellationPolicy::RestoreStock),
        )
        .await;
        let order = confirmed_order(&f, 10).await;
        assert_eq!(stock_of(&f).await, 7);

        let canceled = f.service.cancel(order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert_eq!(stock_of(&f).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_keeps_consumed_by_default() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;
        f.service.cancel(order.id).await.unwrap();
        assert_eq!(stock_of(&f).await, 7);
    }

    #[tokio::test]
    async fn test_line_change_after_confirm_moves_stock() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;
        let line = order.lines[0].id;

        let order = f
            .service
            .change_line_quantity(order.id, line, 20)
            .await
            .unwrap();
        assert_eq!(order.lines[0].usages[0].actual_usage, 5);
        assert_eq!(stock_of(&f).await, 5);

        f.service.remove_line(order.id, line).await.unwrap();
        assert_eq!(stock_of(&f).await, 10);
    }

    #[tokio::test]
    async fn test_adjust_usage_moves_stock() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;
        let usage = order.lines[0].usages[0].id;

        let order = f
            .service
            .adjust_material_usage(
                order.id,
                vec![UsageAdjustment {
                    usage_id: usage,
                    actual_usage: 5,
                }],
            )
            .await
            .unwrap();
        assert_eq!(order.materials_price.minor(), 5000);
        assert_eq!(stock_of(&f).await, 5);
    }

    #[tokio::test]
    async fn test_payment_then_completion() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;
        assert_eq!(order.prepay_sum().minor(), 2500);

        let order = f
            .service
            .record_payment(order.id, Money::from_minor(2500))
            .await
            .unwrap();
        assert_eq!(order.prepay_sum(), Money::zero());

        f.service.mark_ready(order.id).await.unwrap();
        let err = f.service.complete(order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Unpaid { .. })));

        f.service
            .record_payment(order.id, Money::from_minor(2500))
            .await
            .unwrap();
        let order = f.service.complete(order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.remains(), Money::zero());
    }

    #[tokio::test]
    async fn test_costs_reduce_total() {
        let f = fixture(10, ServiceConfig::default()).await;
        let order = confirmed_order(&f, 10).await;

        let order = f
            .service
            .add_cost(order.id, Money::from_minor(700), Some("delivery".to_string()))
            .await
            .unwrap();
        assert_eq!(order.total_price.minor(), 4300);

        let cost = order.costs[0].id;
        let order = f.service.remove_cost(order.id, cost).await.unwrap();
        assert_eq!(order.total_price.minor(), 5000);
    }
}
