//! Shared types for the workshop CRM.
//!
//! Identifiers, the optimistic-concurrency [`Version`] counter and [`Money`]
//! (always minor currency units) live here so every crate agrees on them.

pub mod money;
pub mod types;

pub use money::{Money, MoneyError, to_major, to_minor};
pub use types::{
    AdditionalCostId, BomEntryId, CustomerId, ExpenseId, MaterialId, MaterialUsageId, OrderId,
    OrderLineId, PriceTierId, ProductId, Version,
};
