use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ExpenseId, MaterialId, Money, OrderId, ProductId, Version};
use domain::{DomainError, Expense, ExpenseUpdate, Material, Order, Product};
use tokio::sync::RwLock;

use crate::query::contains_ignore_case;
use crate::store::{CommitOptions, MaterialKey, ProductKey, Store, lock_order};
use crate::{
    ExpenseFilter, ExpenseListing, Listing, MaterialFilter, OrderFilter, Page, ProductFilter,
    Result, StoreError,
};

#[derive(Default)]
struct Tables {
    materials: HashMap<MaterialId, Material>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
    expenses: HashMap<ExpenseId, Expense>,
}

/// In-memory store implementation.
///
/// One write lock serializes every mutation, which gives the same
/// guarantees as the row locks of the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_material(&self, id: MaterialId) -> Result<Option<Material>> {
        Ok(self.tables.read().await.materials.get(&id).cloned())
    }

    async fn get_materials(&self, ids: &[MaterialId]) -> Result<Vec<Material>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.materials.get(id).cloned())
            .collect())
    }

    async fn find_material(&self, key: MaterialKey<'_>) -> Result<Option<Material>> {
        let tables = self.tables.read().await;
        Ok(tables
            .materials
            .values()
            .find(|m| {
                m.name == key.name
                    && m.material_type == key.material_type
                    && m.detail.as_deref() == key.detail
                    && m.description.as_deref() == key.description
            })
            .cloned())
    }

    async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: Page,
    ) -> Result<Listing<Material>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Material> = tables
            .materials
            .values()
            .filter(|m| {
                filter
                    .material_type
                    .as_ref()
                    .is_none_or(|t| &m.material_type == t)
            })
            .filter(|m| {
                filter
                    .search
                    .as_ref()
                    .is_none_or(|s| contains_ignore_case(&m.name, s))
            })
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                crate::MaterialSort::Name => a.name.cmp(&b.name),
                crate::MaterialSort::MaterialType => a.material_type.cmp(&b.material_type),
                crate::MaterialSort::CountLeft => a.count_left.cmp(&b.count_left),
                crate::MaterialSort::Price => a.pack_price.cmp(&b.pack_price),
            };
            filter.order.apply(ordering.then(a.id.cmp(&b.id)))
        });

        let total = items.len();
        Ok(Listing {
            items: page.slice(items),
            total,
        })
    }

    async fn insert_material(&self, material: &Material) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.materials.contains_key(&material.id) {
            let message = format!("material {} already exists", material.id);
            return Err(DomainError::conflict(message).into());
        }
        tables.materials.insert(material.id, material.clone());
        Ok(())
    }

    async fn update_material(
        &self,
        material: &Material,
        expected_version: Version,
    ) -> Result<Version> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .materials
            .get_mut(&material.id)
            .ok_or_else(|| DomainError::not_found("material", material.id))?;
        if stored.version != expected_version {
            return Err(StoreError::concurrency_conflict(
                "material",
                material.id,
                expected_version,
                stored.version,
            ));
        }

        let version = stored.version.next();
        let count_left = stored.count_left;
        *stored = material.clone();
        stored.count_left = count_left;
        stored.version = version;
        Ok(version)
    }

    async fn adjust_stock(&self, id: MaterialId, delta: i64) -> Result<Material> {
        let mut tables = self.tables.write().await;
        let material = tables
            .materials
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("material", id))?;
        material.apply_delta(delta)?;
        Ok(material.clone())
    }

    async fn delete_material(&self, id: MaterialId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.materials.contains_key(&id) {
            return Err(DomainError::not_found("material", id).into());
        }
        if tables
            .orders
            .values()
            .any(|o| o.usages().any(|u| u.material_id == id))
        {
            return Err(DomainError::conflict(format!("material {id} is used by orders")).into());
        }

        tables.materials.remove(&id);
        for product in tables.products.values_mut() {
            product.bom.retain(|e| e.material_id != id);
        }
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn find_product(&self, key: ProductKey<'_>) -> Result<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .values()
            .find(|p| {
                p.name == key.name
                    && p.size == key.size
                    && p.detail.as_deref() == key.detail
                    && p.description.as_deref() == key.description
            })
            .cloned())
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Listing<Product>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Product> = tables
            .products
            .values()
            .filter(|p| filter.name.as_ref().is_none_or(|n| &p.name == n))
            .filter(|p| {
                filter.search.as_ref().is_none_or(|s| {
                    contains_ignore_case(&p.name, s) || contains_ignore_case(&p.size, s)
                })
            })
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                crate::ProductSort::Name => a.name.cmp(&b.name),
                crate::ProductSort::Size => a.size.cmp(&b.size),
            };
            filter.order.apply(ordering.then(a.id.cmp(&b.id)))
        });

        let total = items.len();
        Ok(Listing {
            items: page.slice(items),
            total,
        })
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.products.contains_key(&product.id) {
            let message = format!("product {} already exists", product.id);
            return Err(DomainError::conflict(message).into());
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(
        &self,
        product: &Product,
        expected_version: Version,
    ) -> Result<Version> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = product
            .material_ids()
            .find(|id| !tables.materials.contains_key(id))
        {
            return Err(DomainError::not_found("material", missing).into());
        }
        let stored = tables
            .products
            .get_mut(&product.id)
            .ok_or_else(|| DomainError::not_found("product", product.id))?;
        if stored.version != expected_version {
            return Err(StoreError::concurrency_conflict(
                "product",
                product.id,
                expected_version,
                stored.version,
            ));
        }

        let version = stored.version.next();
        *stored = product.clone();
        stored.version = version;
        Ok(version)
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.products.contains_key(&id) {
            return Err(DomainError::not_found("product", id).into());
        }
        if tables
            .orders
            .values()
            .any(|o| o.lines.iter().any(|l| l.product_id == id))
        {
            return Err(DomainError::conflict(format!("product {id} is used by orders")).into());
        }
        tables.products.remove(&id);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Listing<Order>> {
        let tables = self.tables.read().await;
        let mut items: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| filter.created_from.is_none_or(|from| o.created_at >= from))
            .filter(|o| filter.created_to.is_none_or(|to| o.created_at <= to))
            .filter(|o| {
                filter
                    .customer
                    .as_ref()
                    .is_none_or(|c| o.customer.as_ref() == Some(c))
            })
            .filter(|o| {
                filter
                    .customer_id
                    .is_none_or(|c| o.customer_id == Some(c))
            })
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                crate::OrderSort::CreatedAt => a.created_at.cmp(&b.created_at),
                crate::OrderSort::TotalPrice => a.total_price.cmp(&b.total_price),
                crate::OrderSort::Status => a.status.code().cmp(&b.status.code()),
            };
            filter.order.apply(ordering.then(a.id.cmp(&b.id)))
        });

        let total = items.len();
        Ok(Listing {
            items: page.slice(items),
            total,
        })
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(DomainError::conflict(format!("order {} already exists", order.id)).into());
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit_order(&self, order: &Order, options: CommitOptions) -> Result<Version> {
        let mut tables = self.tables.write().await;

        let actual = tables
            .orders
            .get(&order.id)
            .map(|o| o.version)
            .ok_or_else(|| DomainError::not_found("order", order.id))?;
        if actual != options.expected_version {
            return Err(StoreError::concurrency_conflict(
                "order",
                order.id,
                options.expected_version,
                actual,
            ));
        }

        // Stage every change on copies so a shortfall leaves stock untouched.
        let mut staged: HashMap<MaterialId, Material> = HashMap::new();
        for change in lock_order(&options.stock) {
            let material = match staged.remove(&change.material_id) {
                Some(material) => material,
                None => tables
                    .materials
                    .get(&change.material_id)
                    .cloned()
                    .ok_or_else(|| DomainError::not_found("material", change.material_id))?,
            };
            let mut material = material;
            material.apply_delta(change.delta)?;
            staged.insert(change.material_id, material);
        }
        tables.materials.extend(staged);

        let version = actual.next();
        let mut stored = order.clone();
        stored.version = version;
        tables.orders.insert(order.id, stored);

        tracing::debug!(order_id = %order.id, %version, "order committed");
        Ok(version)
    }

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        Ok(self.tables.read().await.expenses.get(&id).cloned())
    }

    async fn list_expenses(&self, filter: &ExpenseFilter, page: Page) -> Result<ExpenseListing> {
        let tables = self.tables.read().await;
        let mut items: Vec<Expense> = tables
            .expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        let amount_total = Money::checked_sum(items.iter().map(|e| e.amount))
            .ok_or_else(|| DomainError::out_of_range("amount"))?;

        items.sort_by(|a, b| {
            let ordering = a
                .actual_date
                .cmp(&b.actual_date)
                .then(a.created_at.cmp(&b.created_at));
            filter.order.apply(ordering.then(a.id.cmp(&b.id)))
        });

        let total = items.len();
        Ok(ExpenseListing {
            expenses: Listing {
                items: page.slice(items),
                total,
            },
            amount_total,
        })
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.expenses.contains_key(&expense.id) {
            let message = format!("expense {} already exists", expense.id);
            return Err(DomainError::conflict(message).into());
        }
        tables.expenses.insert(expense.id, expense.clone());
        Ok(())
    }

    async fn update_expense(&self, id: ExpenseId, update: ExpenseUpdate) -> Result<Expense> {
        let mut tables = self.tables.write().await;
        let expense = tables
            .expenses
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("expense", id))?;
        expense.apply_update(update)?;
        Ok(expense.clone())
    }

    async fn delete_expense(&self, id: ExpenseId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .expenses
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DomainError::not_found("expense", id).into())
    }
}
