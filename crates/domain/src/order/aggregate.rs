//! Order aggregate and line management.

use chrono::{DateTime, Utc};
use common::{
    AdditionalCostId, CustomerId, MaterialId, MaterialUsageId, Money, OrderId, OrderLineId,
    ProductId, Version,
};
use serde::{Deserialize, Serialize};

use crate::bom::{self, ResolvedUsage};
use crate::catalog::Catalog;
use crate::error::{DomainError, Result};
use crate::ledger::{self, StockChange};
use crate::product::Product;

use super::OrderStatus;

/// Material consumption recorded against one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub id: MaterialUsageId,
    pub material_id: MaterialId,
    pub units_per_material: u32,
    pub material_price: Money,
    pub budgeted_usage: u32,
    pub actual_usage: u32,
}

impl MaterialUsage {
    fn from_resolved(resolved: ResolvedUsage) -> Self {
        Self {
            id: MaterialUsageId::new(),
            material_id: resolved.material_id,
            units_per_material: resolved.units_per_material,
            material_price: resolved.material_price,
            budgeted_usage: resolved.budgeted_usage,
            actual_usage: resolved.budgeted_usage,
        }
    }

    pub fn budgeted_cost(&self) -> Money {
        self.material_price.saturating_mul(self.budgeted_usage)
    }

    pub fn actual_cost(&self) -> Money {
        self.material_price.saturating_mul(self.actual_usage)
    }

    fn checked_actual_cost(&self) -> Result<Money> {
        self.material_price
            .checked_mul(self.actual_usage)
            .ok_or_else(|| DomainError::out_of_range("actual_usage"))
    }
}

/// One product in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    /// Snapshot of the product name for display.
    pub product_name: String,
    pub quantity: u32,
    /// Unit price locked in when the line was created.
    pub unit_price: Money,
    pub usages: Vec<MaterialUsage>,
}

impl OrderLine {
    /// `quantity * unit_price`, saturating. Order totals use
    /// [`OrderLine::checked_subtotal`].
    pub fn subtotal(&self) -> Money {
        self.unit_price.saturating_mul(self.quantity)
    }

    pub fn checked_subtotal(&self) -> Result<Money> {
        self.unit_price
            .checked_mul(self.quantity)
            .ok_or_else(|| DomainError::out_of_range("quantity"))
    }

    fn build(product: &Product, quantity: u32, catalog: &Catalog) -> Result<Self> {
        let usages = bom::resolve(product, quantity, catalog)?
            .into_iter()
            .map(MaterialUsage::from_resolved)
            .collect();
        let line = Self {
            id: OrderLineId::new(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price_for(quantity),
            usages,
        };
        line.checked_subtotal()?;
        Ok(line)
    }
}

/// An ad-hoc cost adjustment. It lowers the order total by `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalCost {
    pub id: AdditionalCostId,
    pub amount: Money,
    pub description: Option<String>,
}

/// Input for creating an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub description: Option<String>,
}

/// A requested product quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// New actual usage for one material usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageAdjustment {
    pub usage_id: MaterialUsageId,
    pub actual_usage: u32,
}

/// The outcome of an order operation: the updated order and the stock
/// movements that must be committed together with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order: Order,
    pub stock: Vec<StockChange>,
}

impl Transition {
    pub fn without_stock(order: Order) -> Self {
        Self {
            order,
            stock: Vec::new(),
        }
    }
}

/// Order aggregate root.
///
/// Operations take `&self` and return a [`Transition`] built on a copy, so a
/// failed operation never leaves a half-updated order behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Current version for optimistic concurrency.
    pub version: Version,
    pub status: OrderStatus,
    pub customer: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub description: Option<String>,
    pub total_price: Money,
    pub materials_price: Money,
    pub paid: Money,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
    pub costs: Vec<AdditionalCost>,
}

/// Sum of line subtotals minus additional costs.
///
/// Fails with `InvalidInput` when any intermediate sum overflows.
pub fn order_total(lines: &[OrderLine], costs: &[AdditionalCost]) -> Result<Money> {
    let subtotals = lines
        .iter()
        .map(OrderLine::checked_subtotal)
        .collect::<Result<Vec<_>>>()?;
    let lines_total =
        Money::checked_sum(subtotals).ok_or_else(|| DomainError::out_of_range("quantity"))?;
    let costs_total = Money::checked_sum(costs.iter().map(|c| c.amount))
        .ok_or_else(|| DomainError::out_of_range("amount"))?;
    lines_total
        .checked_sub(costs_total)
        .ok_or_else(|| DomainError::out_of_range("amount"))
}

// Query methods
impl Order {
    pub fn new(input: NewOrder) -> Self {
        Self {
            id: OrderId::new(),
            version: Version::initial(),
            status: OrderStatus::Created,
            customer: input.customer,
            customer_id: input.customer_id,
            description: input.description,
            total_price: Money::zero(),
            materials_price: Money::zero(),
            paid: Money::zero(),
            created_at: Utc::now(),
            confirmed_at: None,
            ready_at: None,
            shipped_at: None,
            completed_at: None,
            canceled_at: None,
            lines: Vec::new(),
            costs: Vec::new(),
        }
    }

    /// Amount still to be paid. `paid <= total_price` holds for every
    /// order produced by a transition.
    pub fn remains(&self) -> Money {
        self.total_price.saturating_sub(self.paid)
    }

    /// Advance still expected before production: half the total minus what
    /// has been paid, never below zero.
    pub fn prepay_sum(&self) -> Money {
        self.total_price
            .halve()
            .saturating_sub(self.paid)
            .clamp_non_negative()
    }

    pub fn line(&self, line_id: OrderLineId) -> Result<&OrderLine> {
        self.lines
            .iter()
            .find(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found("order line", line_id))
    }

    pub fn usages(&self) -> impl Iterator<Item = &MaterialUsage> {
        self.lines.iter().flat_map(|l| l.usages.iter())
    }

    /// Cost of the materials actually used across all lines.
    pub fn actual_materials_cost(&self) -> Result<Money> {
        let costs = self
            .usages()
            .map(MaterialUsage::checked_actual_cost)
            .collect::<Result<Vec<_>>>()?;
        Money::checked_sum(costs).ok_or_else(|| DomainError::out_of_range("actual_usage"))
    }

    /// Products referenced by the order's lines.
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|l| l.product_id).collect()
    }

    /// Materials referenced by the order's usages.
    pub fn material_ids(&self) -> Vec<MaterialId> {
        let mut ids: Vec<_> = self.usages().map(|u| u.material_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// Line management
impl Order {
    /// Replaces every line. Only allowed before confirmation.
    pub fn set_lines(&self, requested: &[LineRequest], catalog: &Catalog) -> Result<Transition> {
        if !self.status.can_set_lines() {
            return Err(self.invalid_state("set lines"));
        }
        for (index, request) in requested.iter().enumerate() {
            validate_quantity(request.quantity)?;
            if requested[..index]
                .iter()
                .any(|r| r.product_id == request.product_id)
            {
                return Err(DomainError::conflict(format!(
                    "product {} requested twice",
                    request.product_id
                )));
            }
        }

        let lines = requested
            .iter()
            .map(|r| OrderLine::build(catalog.product(r.product_id)?, r.quantity, catalog))
            .collect::<Result<Vec<_>>>()?;

        let mut order = self.clone();
        order.lines = lines;
        order.finish_line_change(Vec::new(), catalog)
    }

    /// Adds a product that is not yet part of the order.
    pub fn add_line(&self, request: LineRequest, catalog: &Catalog) -> Result<Transition> {
        self.ensure_lines_modifiable()?;
        validate_quantity(request.quantity)?;
        if self.lines.iter().any(|l| l.product_id == request.product_id) {
            return Err(DomainError::conflict(format!(
                "product {} already in order {}",
                request.product_id, self.id
            )));
        }

        let product = catalog.product(request.product_id)?;
        let line = OrderLine::build(product, request.quantity, catalog)?;
        let stock = line
            .usages
            .iter()
            .map(|u| StockChange::deduct(u.material_id, u.actual_usage))
            .collect();

        let mut order = self.clone();
        order.lines.push(line);
        order.finish_line_change(stock, catalog)
    }

    /// Changes a line's quantity, keeping its locked unit price.
    pub fn change_line_quantity(
        &self,
        line_id: OrderLineId,
        quantity: u32,
        catalog: &Catalog,
    ) -> Result<Transition> {
        self.ensure_lines_modifiable()?;
        validate_quantity(quantity)?;
        let current = self.line(line_id)?;
        let product = catalog.product(current.product_id)?;

        let usages = resolve_usages(product, quantity, catalog, &current.usages)?;

        let mut stock: Vec<StockChange> = current
            .usages
            .iter()
            .map(|u| StockChange::restore(u.material_id, u.actual_usage))
            .collect();
        stock.extend(
            usages
                .iter()
                .map(|u| StockChange::deduct(u.material_id, u.actual_usage)),
        );

        let mut order = self.clone();
        if let Some(line) = order.lines.iter_mut().find(|l| l.id == line_id) {
            line.quantity = quantity;
            line.usages = usages;
            line.checked_subtotal()?;
        }
        order.finish_line_change(stock, catalog)
    }

    pub fn remove_line(&self, line_id: OrderLineId) -> Result<Transition> {
        self.ensure_lines_modifiable()?;
        let line = self.line(line_id)?;
        let stock = line
            .usages
            .iter()
            .map(|u| StockChange::restore(u.material_id, u.actual_usage))
            .collect();

        let mut order = self.clone();
        order.lines.retain(|l| l.id != line_id);
        order.finish_line_change(stock, &Catalog::new())
    }

    pub fn add_cost(&self, amount: Money, description: Option<String>) -> Result<Transition> {
        self.ensure_lines_modifiable()?;
        if !amount.is_positive() {
            return Err(DomainError::invalid_input("amount", "must be greater than 0"));
        }

        let mut order = self.clone();
        order.costs.push(AdditionalCost {
            id: AdditionalCostId::new(),
            amount,
            description,
        });
        order.finish_line_change(Vec::new(), &Catalog::new())
    }

    pub fn remove_cost(&self, cost_id: AdditionalCostId) -> Result<Transition> {
        self.ensure_lines_modifiable()?;
        if !self.costs.iter().any(|c| c.id == cost_id) {
            return Err(DomainError::not_found("additional cost", cost_id));
        }

        let mut order = self.clone();
        order.costs.retain(|c| c.id != cost_id);
        order.finish_line_change(Vec::new(), &Catalog::new())
    }

    /// Recomputes totals after a line or cost change and plans the stock
    /// movements when materials have already been deducted.
    fn finish_line_change(
        mut self,
        stock: Vec<StockChange>,
        catalog: &Catalog,
    ) -> Result<Transition> {
        self.total_price = order_total(&self.lines, &self.costs)?;
        if self.total_price < self.paid {
            return Err(DomainError::conflict(format!(
                "total {} would drop below paid amount {}",
                self.total_price, self.paid
            )));
        }

        let stock = if self.status.materials_deducted() {
            self.materials_price = self.actual_materials_cost()?;
            ledger::plan(catalog, stock)?
        } else {
            Vec::new()
        };
        Ok(Transition { order: self, stock })
    }

    fn ensure_lines_modifiable(&self) -> Result<()> {
        if self.status.can_modify_lines() {
            Ok(())
        } else {
            Err(self.invalid_state("modify lines"))
        }
    }

    pub(crate) fn invalid_state(&self, attempted: &'static str) -> DomainError {
        DomainError::InvalidState {
            current: self.status,
            attempted,
        }
    }
}

/// Resolves usages for `quantity` units, keeping the ids of `previous`
/// usages of the same material.
pub(crate) fn resolve_usages(
    product: &Product,
    quantity: u32,
    catalog: &Catalog,
    previous: &[MaterialUsage],
) -> Result<Vec<MaterialUsage>> {
    Ok(bom::resolve(product, quantity, catalog)?
        .into_iter()
        .map(|resolved| {
            let mut usage = MaterialUsage::from_resolved(resolved);
            if let Some(earlier) = previous
                .iter()
                .find(|u| u.material_id == usage.material_id)
            {
                usage.id = earlier.id;
            }
            usage
        })
        .collect())
}

fn validate_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(DomainError::invalid_input("quantity", "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Material, NewMaterial};
    use crate::product::{NewPriceTier, NewProduct};

    struct Fixture {
        catalog: Catalog,
        chair: ProductId,
        table: ProductId,
        wood: MaterialId,
    }

    fn fixture() -> Fixture {
        let wood = Material::new(NewMaterial {
            name: "Pine".to_string(),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(2000),
            units_per_pack: 4,
            count_left: 10,
            ..Default::default()
        })
        .unwrap();

        let mut chair = Product::new(NewProduct {
            name: "Chair".to_string(),
            ..Default::default()
        })
        .unwrap();
        chair.add_bom_entry(wood.id, 5).unwrap();
        chair
            .add_price_tier(NewPriceTier {
                start: 1,
                end: 9,
                price: Money::from_minor(1000),
                description: None,
            })
            .unwrap();
        chair
            .add_price_tier(NewPriceTier {
                start: 10,
                end: 100,
                price: Money::from_minor(800),
                description: None,
            })
            .unwrap();

        let mut table = Product::new(NewProduct {
            name: "Table".to_string(),
            ..Default::default()
        })
        .unwrap();
        table
            .add_price_tier(NewPriceTier {
                start: 1,
                end: 100,
                price: Money::from_minor(5000),
                description: None,
            })
            .unwrap();

        Fixture {
            chair: chair.id,
            table: table.id,
            wood: wood.id,
            catalog: Catalog::new()
                .with_material(wood)
                .with_product(chair)
                .with_product(table),
        }
    }

    fn request(product_id: ProductId, quantity: u32) -> LineRequest {
        LineRequest {
            product_id,
            quantity,
        }
    }

    #[test]
    fn test_set_lines_prices_and_resolves() {
        let f = fixture();
        let order = Order::new(NewOrder::default());
        let t = order
            .set_lines(&[request(f.chair, 12), request(f.table, 1)], &f.catalog)
            .unwrap();

        assert!(t.stock.is_empty());
        assert_eq!(t.order.lines.len(), 2);
        assert_eq!(t.order.lines[0].unit_price.minor(), 800);
        assert_eq!(t.order.lines[0].usages[0].budgeted_usage, 3);
        assert_eq!(t.order.lines[0].usages[0].material_price.minor(), 500);
        assert_eq!(t.order.total_price.minor(), 12 * 800 + 5000);
        assert!(order.lines.is_empty());
    }

    #[test]
    fn test_set_lines_rejects_duplicates() {
        let f = fixture();
        let order = Order::new(NewOrder::default());
        let err = order
            .set_lines(&[request(f.chair, 1), request(f.chair, 2)], &f.catalog)
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[test]
    fn test_set_lines_rejects_zero_quantity_and_unknown_product() {
        let f = fixture();
        let order = Order::new(NewOrder::default());
        assert!(matches!(
            order.set_lines(&[request(f.chair, 0)], &f.catalog),
            Err(DomainError::InvalidInput {
                field: "quantity",
                ..
            })
        ));
        assert!(matches!(
            order.set_lines(&[request(ProductId::new(), 1)], &f.catalog),
            Err(DomainError::NotFound {
                entity: "product",
                ..
            })
        ));
    }

    #[test]
    fn test_total_tracks_lines_and_costs() {
        let f = fixture();
        let order = Order::new(NewOrder::default())
            .set_lines(&[request(f.chair, 5)], &f.catalog)
            .unwrap()
            .order;
        let order = order.add_line(request(f.table, 2), &f.catalog).unwrap().order;
        assert_eq!(order.total_price.minor(), 5 * 1000 + 2 * 5000);

        let order = order
            .add_cost(Money::from_minor(1500), Some("discount".to_string()))
            .unwrap()
            .order;
        assert_eq!(order.total_price.minor(), 13_500);
        assert_eq!(order.total_price, order_total(&order.lines, &order.costs).unwrap());

        let chair_line = order.lines[0].id;
        let order = order
            .change_line_quantity(chair_line, 20, &f.catalog)
            .unwrap()
            .order;
        // unit price stays locked at the 1-9 tier
        assert_eq!(order.lines[0].unit_price.minor(), 1000);
        assert_eq!(order.total_price.minor(), 20 * 1000 + 10_000 - 1500);
        assert_eq!(order.lines[0].usages[0].budgeted_usage, 4);

        let cost = order.costs[0].id;
        let order = order.remove_cost(cost).unwrap().order;
        let order = order.remove_line(chair_line).unwrap().order;
        assert_eq!(order.total_price.minor(), 10_000);
    }

    #[test]
    fn test_add_line_rejects_existing_product() {
        let f = fixture();
        let order = Order::new(NewOrder::default())
            .set_lines(&[request(f.chair, 5)], &f.catalog)
            .unwrap()
            .order;
        assert!(matches!(
            order.add_line(request(f.chair, 1), &f.catalog),
            Err(DomainError::Conflict { .. })
        ));
    }

    #[test]
    fn test_costs_validate_amount_and_existence() {
        let order = Order::new(NewOrder::default());
        assert!(matches!(
            order.add_cost(Money::zero(), None),
            Err(DomainError::InvalidInput { field: "amount", .. })
        ));
        assert!(matches!(
            order.remove_cost(AdditionalCostId::new()),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_cost_larger_than_total_is_conflict() {
        let f = fixture();
        let order = Order::new(NewOrder::default())
            .set_lines(&[request(f.table, 1)], &f.catalog)
            .unwrap()
            .order;
        assert!(matches!(
            order.add_cost(Money::from_minor(5001), None),
            Err(DomainError::Conflict { .. })
        ));
    }

    #[test]
    fn test_line_changes_after_confirmation_move_stock() {
        let f = fixture();
        let mut order = Order::new(NewOrder::default())
            .set_lines(&[request(f.chair, 12)], &f.catalog)
            .unwrap()
            .order;
        order.status = OrderStatus::InProgress;
        order.materials_price = order.actual_materials_cost().unwrap();
        let line = order.lines[0].id;

        let t = order.change_line_quantity(line, 20, &f.catalog).unwrap();
        assert_eq!(t.stock, vec![StockChange::deduct(f.wood, 1)]);
        assert_eq!(t.order.materials_price.minor(), 4 * 500);
        assert_eq!(t.order.lines[0].usages[0].id, order.lines[0].usages[0].id);

        let t = t.order.remove_line(line).unwrap();
        assert_eq!(t.stock, vec![StockChange::restore(f.wood, 4)]);
        assert_eq!(t.order.materials_price, Money::zero());
    }

    #[test]
    fn test_line_change_after_confirmation_checks_stock() {
        let f = fixture();
        let mut order = Order::new(NewOrder::default());
        order.status = OrderStatus::InProgress;
        let err = order.add_line(request(f.chair, 100), &f.catalog).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                material: f.wood,
                needed: 20,
                available: 10,
            }
        );
    }

    #[test]
    fn test_line_change_below_paid_is_conflict() {
        let f = fixture();
        let mut order = Order::new(NewOrder::default())
            .set_lines(&[request(f.table, 2)], &f.catalog)
            .unwrap()
            .order;
        order.status = OrderStatus::Ready;
        order.paid = Money::from_minor(8000);
        let line = order.lines[0].id;
        assert!(matches!(
            order.change_line_quantity(line, 1, &f.catalog),
            Err(DomainError::Conflict { .. })
        ));
        assert_eq!(order.lines[0].quantity, 2);
    }

    #[test]
    fn test_terminal_orders_reject_line_changes() {
        let f = fixture();
        let mut order = Order::new(NewOrder::default());
        order.status = OrderStatus::Canceled;
        assert!(matches!(
            order.add_line(request(f.table, 1), &f.catalog),
            Err(DomainError::InvalidState {
                attempted: "modify lines",
                ..
            })
        ));
        order.status = OrderStatus::Ready;
        assert!(matches!(
            order.set_lines(&[request(f.table, 1)], &f.catalog),
            Err(DomainError::InvalidState {
                attempted: "set lines",
                ..
            })
        ));
    }

    #[test]
    fn test_line_subtotal_overflow_is_rejected() {
        let mut pricey = Product::new(NewProduct {
            name: "Pricey".to_string(),
            ..Default::default()
        })
        .unwrap();
        pricey
            .add_price_tier(NewPriceTier {
                start: 1,
                end: 10,
                price: Money::from_minor(i64::MAX / 2),
                description: None,
            })
            .unwrap();
        let catalog = Catalog::new().with_product(pricey.clone());
        let order = Order::new(NewOrder::default());

        assert!(matches!(
            order.set_lines(&[request(pricey.id, 3)], &catalog),
            Err(DomainError::InvalidInput {
                field: "quantity",
                ..
            })
        ));

        let order = order
            .set_lines(&[request(pricey.id, 1)], &catalog)
            .unwrap()
            .order;
        let line = order.lines[0].id;
        assert!(matches!(
            order.change_line_quantity(line, 3, &catalog),
            Err(DomainError::InvalidInput {
                field: "quantity",
                ..
            })
        ));
    }

    #[test]
    fn test_cost_sum_overflow_is_rejected() {
        let mut order = Order::new(NewOrder::default());
        order.costs.push(AdditionalCost {
            id: AdditionalCostId::new(),
            amount: Money::from_minor(1),
            description: None,
        });
        assert!(matches!(
            order.add_cost(Money::from_minor(i64::MAX), None),
            Err(DomainError::InvalidInput { field: "amount", .. })
        ));
    }

    #[test]
    fn test_remains_and_prepay() {
        let mut order = Order::new(NewOrder::default());
        order.total_price = Money::from_minor(10_001);
        order.paid = Money::from_minor(2000);
        assert_eq!(order.remains().minor(), 8001);
        assert_eq!(order.prepay_sum().minor(), 3000);
        order.paid = Money::from_minor(6000);
        assert_eq!(order.prepay_sum(), Money::zero());
    }
}
