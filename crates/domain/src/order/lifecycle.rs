//! Lifecycle transitions of an order.

use chrono::Utc;
use common::Money;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{DomainError, Result};
use crate::ledger::{self, StockChange};

use super::aggregate::resolve_usages;
use super::{Order, OrderStatus, Transition, UsageAdjustment};

/// What happens to already deducted materials when an order is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancellationPolicy {
    /// Materials count as consumed; stock stays as it is.
    #[default]
    KeepConsumed,
    /// The actual usage of every line goes back into stock.
    RestoreStock,
}

impl Order {
    /// CREATED -> IN_PROGRESS.
    ///
    /// Re-resolves every line from the current bill-of-materials and deducts
    /// the usage all-or-nothing.
    pub fn confirm(&self, catalog: &Catalog) -> Result<Transition> {
        if !self.status.can_confirm() {
            return Err(self.invalid_state("confirm"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::invalid_input("lines", "order has no lines to confirm"));
        }

        let mut order = self.clone();
        for line in &mut order.lines {
            let product = catalog.product(line.product_id)?;
            let usages = resolve_usages(product, line.quantity, catalog, &line.usages)?;
            line.usages = usages;
        }

        let stock = ledger::plan(
            catalog,
            order
                .usages()
                .map(|u| StockChange::deduct(u.material_id, u.actual_usage)),
        )?;

        order.materials_price = order
            .materials_price
            .checked_add(order.actual_materials_cost()?)
            .ok_or_else(|| DomainError::out_of_range("materials_price"))?;
        order.status = OrderStatus::InProgress;
        order.confirmed_at = Some(Utc::now());
        Ok(Transition { order, stock })
    }

    /// Records a payment that must not exceed the remaining amount.
    pub fn record_payment(&self, payment: Money) -> Result<Transition> {
        if !self.status.can_accept_payment() {
            return Err(self.invalid_state("record payment"));
        }
        if !payment.is_positive() {
            return Err(DomainError::invalid_input("payment", "must be greater than 0"));
        }
        // An overflowing sum is necessarily above the total.
        let paid = self
            .paid
            .checked_add(payment)
            .filter(|paid| *paid <= self.total_price)
            .ok_or(DomainError::Overpayment {
                remains: self.remains(),
                payment,
            })?;

        let mut order = self.clone();
        order.paid = paid;
        Ok(Transition::without_stock(order))
    }

    /// Replaces the actual usage of the given usage records.
    ///
    /// Stock follows the change: extra usage is deducted, saved usage is
    /// restored.
    pub fn adjust_material_usage(
        &self,
        adjustments: &[UsageAdjustment],
        catalog: &Catalog,
    ) -> Result<Transition> {
        if !self.status.can_adjust_usage() {
            return Err(self.invalid_state("adjust material usage"));
        }
        if let Some(unknown) = adjustments
            .iter()
            .find(|a| !self.usages().any(|u| u.id == a.usage_id))
        {
            return Err(DomainError::not_found("material usage", unknown.usage_id));
        }

        let mut order = self.clone();
        let mut changes = Vec::with_capacity(adjustments.len());
        for adjustment in adjustments {
            if let Some(usage) = order
                .lines
                .iter_mut()
                .flat_map(|l| l.usages.iter_mut())
                .find(|u| u.id == adjustment.usage_id)
            {
                changes.push(StockChange::between(
                    usage.material_id,
                    usage.actual_usage,
                    adjustment.actual_usage,
                ));
                usage.actual_usage = adjustment.actual_usage;
            }
        }

        let stock = ledger::plan(catalog, changes)?;
        order.materials_price = order.actual_materials_cost()?;
        Ok(Transition { order, stock })
    }

    /// IN_PROGRESS -> READY.
    pub fn mark_ready(&self) -> Result<Transition> {
        if !self.status.can_mark_ready() {
            return Err(self.invalid_state("mark ready"));
        }
        let mut order = self.clone();
        order.status = OrderStatus::Ready;
        order.ready_at = Some(Utc::now());
        Ok(Transition::without_stock(order))
    }

    /// READY -> SHIPPED.
    pub fn mark_shipped(&self) -> Result<Transition> {
        if !self.status.can_ship() {
            return Err(self.invalid_state("ship"));
        }
        let mut order = self.clone();
        order.status = OrderStatus::Shipped;
        order.shipped_at = Some(Utc::now());
        Ok(Transition::without_stock(order))
    }

    /// READY or SHIPPED -> COMPLETED, once nothing remains to be paid.
    pub fn complete(&self) -> Result<Transition> {
        if !self.status.can_complete() {
            return Err(self.invalid_state("complete"));
        }
        let remains = self.remains();
        if !remains.is_zero() {
            return Err(DomainError::Unpaid { remains });
        }

        let mut order = self.clone();
        order.materials_price = order.actual_materials_cost()?;
        order.status = OrderStatus::Completed;
        order.completed_at = Some(Utc::now());
        Ok(Transition::without_stock(order))
    }

    pub fn cancel(&self, policy: CancellationPolicy) -> Result<Transition> {
        if !self.status.can_cancel() {
            return Err(self.invalid_state("cancel"));
        }

        let stock = match policy {
            CancellationPolicy::RestoreStock if self.status.materials_deducted() => {
                ledger::plan(
                    &Catalog::new(),
                    self.usages()
                        .map(|u| StockChange::restore(u.material_id, u.actual_usage)),
                )?
            }
            _ => Vec::new(),
        };

        let mut order = self.clone();
        order.status = OrderStatus::Canceled;
        order.canceled_at = Some(Utc::now());
        Ok(Transition { order, stock })
    }
}
