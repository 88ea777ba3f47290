//! Business rules of the workshop CRM.
//!
//! This crate is pure: it never talks to a store. It provides:
//! - Materials with their single-row stock operations
//! - Products with a bill-of-materials and quantity price tiers
//! - The bill-of-materials and pricing resolvers
//! - The inventory ledger planner
//! - The order aggregate with its lifecycle state machine
//! - Workshop expenses kept outside of orders

pub mod bom;
pub mod catalog;
pub mod error;
pub mod expense;
pub mod ledger;
pub mod material;
pub mod order;
pub mod pricing;
pub mod product;

pub use bom::{ResolvedUsage, material_units_needed};
pub use catalog::Catalog;
pub use error::{DomainError, Result};
pub use expense::{Expense, ExpenseUpdate, NewExpense};
pub use ledger::StockChange;
pub use material::{Material, MaterialStatus, MaterialUpdate, NewMaterial, stock_after};
pub use order::{
    AdditionalCost, CancellationPolicy, LineRequest, MaterialUsage, NewOrder, Order, OrderLine,
    OrderStatus, Transition, UsageAdjustment, order_total,
};
pub use pricing::PriceTier;
pub use product::{
    BomEntry, NewPriceTier, NewProduct, PriceTierUpdate, Product, ProductStatus, ProductUpdate,
};
