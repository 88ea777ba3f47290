use async_trait::async_trait;
use common::{ExpenseId, MaterialId, OrderId, ProductId, Version};
use domain::{Expense, ExpenseUpdate, Material, Order, Product, StockChange};

use crate::{
    ExpenseFilter, ExpenseListing, Listing, MaterialFilter, OrderFilter, Page, ProductFilter,
    Result,
};

/// Options for committing an order transition.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Version the order had when it was loaded. The commit fails with
    /// `ConcurrencyConflict` if the stored order moved on since.
    pub expected_version: Version,

    /// Stock movements applied in the same transaction.
    pub stock: Vec<StockChange>,
}

impl CommitOptions {
    /// Expects the order to still be at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: version,
            stock: Vec::new(),
        }
    }

    pub fn with_stock(mut self, stock: Vec<StockChange>) -> Self {
        self.stock = stock;
        self
    }
}

/// Details that identify a material for duplicate checks.
#[derive(Debug, Clone, Copy)]
pub struct MaterialKey<'a> {
    pub name: &'a str,
    pub material_type: &'a str,
    pub detail: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Details that identify a product for duplicate checks.
#[derive(Debug, Clone, Copy)]
pub struct ProductKey<'a> {
    pub name: &'a str,
    pub size: &'a str,
    pub detail: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Core trait for store implementations.
///
/// Every method is one transaction. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_material(&self, id: MaterialId) -> Result<Option<Material>>;

    /// Loads the given materials. Unknown ids are skipped.
    async fn get_materials(&self, ids: &[MaterialId]) -> Result<Vec<Material>>;

    async fn find_material(&self, key: MaterialKey<'_>) -> Result<Option<Material>>;

    async fn list_materials(&self, filter: &MaterialFilter, page: Page)
    -> Result<Listing<Material>>;

    async fn insert_material(&self, material: &Material) -> Result<()>;

    /// Saves descriptive and pricing fields. Stock is left untouched.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored material is still
    /// at `expected_version`; returns the new version.
    async fn update_material(
        &self,
        material: &Material,
        expected_version: Version,
    ) -> Result<Version>;

    /// Applies a signed stock change under a row lock and returns the
    /// updated material.
    async fn adjust_stock(&self, id: MaterialId, delta: i64) -> Result<Material>;

    /// Deletes a material and its bill-of-materials entries.
    ///
    /// Fails with a conflict while any order usage still references it.
    async fn delete_material(&self, id: MaterialId) -> Result<()>;

    /// Loads a product with its bill-of-materials and price tiers.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Loads the given products. Unknown ids are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    async fn find_product(&self, key: ProductKey<'_>) -> Result<Option<Product>>;

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Listing<Product>>;

    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Saves a product together with its bill-of-materials and tiers.
    ///
    /// The whole product is replaced, so the write is checked against
    /// `expected_version` like an order commit.
    async fn update_product(&self, product: &Product, expected_version: Version)
    -> Result<Version>;

    /// Deletes a product. Fails with a conflict while order lines reference it.
    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// Loads an order with its lines, usages and costs.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Listing<Order>>;

    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Commits an order transition atomically.
    ///
    /// Locks the touched materials in id order, re-checks and applies every
    /// stock change, verifies the expected version and rewrites the order.
    /// Any failure leaves stock and order untouched.
    ///
    /// Returns the new version of the order.
    async fn commit_order(&self, order: &Order, options: CommitOptions) -> Result<Version>;

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>>;

    /// Lists expenses by `actual_date` and sums the amounts of every match.
    ///
    /// A sum outside the `i64` range is an `InvalidInput` on `amount`.
    async fn list_expenses(&self, filter: &ExpenseFilter, page: Page) -> Result<ExpenseListing>;

    async fn insert_expense(&self, expense: &Expense) -> Result<()>;

    /// Applies a partial update under a row lock and returns the result.
    async fn update_expense(&self, id: ExpenseId, update: ExpenseUpdate) -> Result<Expense>;

    async fn delete_expense(&self, id: ExpenseId) -> Result<()>;
}

/// Sorts stock changes by material so that concurrent commits always lock
/// rows in the same order.
pub(crate) fn lock_order(stock: &[StockChange]) -> Vec<StockChange> {
    let mut sorted = stock.to_vec();
    sorted.sort_by_key(|c| c.material_id);
    sorted
}
