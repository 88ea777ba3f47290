use std::collections::HashMap;

use async_trait::async_trait;
use common::{
    AdditionalCostId, BomEntryId, CustomerId, ExpenseId, MaterialId, MaterialUsageId, Money,
    OrderId, OrderLineId, PriceTierId, ProductId, Version,
};
use domain::{
    AdditionalCost, BomEntry, DomainError, Expense, ExpenseUpdate, Material, MaterialStatus,
    MaterialUsage, Order, OrderLine, OrderStatus, PriceTier, Product, ProductStatus, stock_after,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::store::{CommitOptions, MaterialKey, ProductKey, Store, lock_order};
use crate::{
    ExpenseFilter, ExpenseListing, Listing, MaterialFilter, OrderFilter, Page, ProductFilter,
    Result, StoreError,
};

const MATERIAL_COLUMNS: &str = "id, version, name, material_type, detail, description, status, \
     pack_price, unit_price, units_per_pack, count_left, created_at";

const EXPENSE_COLUMNS: &str =
    "id, expense_type, periodicity, description, amount, actual_date, created_at";

const ORDER_COLUMNS: &str = "id, version, status, customer, customer_id, description, total_price, \
     materials_price, paid, created_at, confirmed_at, ready_at, shipped_at, completed_at, \
     canceled_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_material(row: &PgRow) -> Result<Material> {
        Ok(Material {
            id: MaterialId::from_uuid(row.try_get::<Uuid, _>("id")?),
            version: Version::new(row.try_get("version")?),
            name: row.try_get("name")?,
            material_type: row.try_get("material_type")?,
            detail: row.try_get("detail")?,
            description: row.try_get("description")?,
            status: MaterialStatus::from_code(row.try_get("status")?)
                .map_err(|e| StoreError::invalid_row("materials", e))?,
            pack_price: Money::from_minor(row.try_get("pack_price")?),
            unit_price: Money::from_minor(row.try_get("unit_price")?),
            units_per_pack: to_u32("materials", row.try_get("units_per_pack")?)?,
            count_left: row.try_get("count_left")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_expense(row: &PgRow) -> Result<Expense> {
        Ok(Expense {
            id: ExpenseId::from_uuid(row.try_get::<Uuid, _>("id")?),
            expense_type: row.try_get("expense_type")?,
            periodicity: row.try_get("periodicity")?,
            description: row.try_get("description")?,
            amount: Money::from_minor(row.try_get("amount")?),
            actual_date: row.try_get("actual_date")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn load_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, version, name, size, detail, description, status, created_at
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut products: HashMap<Uuid, Product> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = row.try_get("id")?;
            products.insert(
                id,
                Product {
                    id: ProductId::from_uuid(id),
                    version: Version::new(row.try_get("version")?),
                    name: row.try_get("name")?,
                    size: row.try_get("size")?,
                    detail: row.try_get("detail")?,
                    description: row.try_get("description")?,
                    status: ProductStatus::from_code(row.try_get("status")?)
                        .map_err(|e| StoreError::invalid_row("products", e))?,
                    created_at: row.try_get("created_at")?,
                    bom: Vec::new(),
                    price_tiers: Vec::new(),
                },
            );
        }

        let bom_rows = sqlx::query(
            r#"
            SELECT id, product_id, material_id, units_per_material
            FROM product_materials
            WHERE product_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in &bom_rows {
            let product_id: Uuid = row.try_get("product_id")?;
            if let Some(product) = products.get_mut(&product_id) {
                product.bom.push(BomEntry {
                    id: BomEntryId::from_uuid(row.try_get("id")?),
                    material_id: MaterialId::from_uuid(row.try_get("material_id")?),
                    units_per_material: to_u32(
                        "product_materials",
                        row.try_get("units_per_material")?,
                    )?,
                });
            }
        }

        let tier_rows = sqlx::query(
            r#"
            SELECT id, product_id, start_quantity, end_quantity, price, description
            FROM price_tiers
            WHERE product_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in &tier_rows {
            let product_id: Uuid = row.try_get("product_id")?;
            if let Some(product) = products.get_mut(&product_id) {
                product.price_tiers.push(PriceTier {
                    id: PriceTierId::from_uuid(row.try_get("id")?),
                    start: to_u32("price_tiers", row.try_get("start_quantity")?)?,
                    end: to_u32("price_tiers", row.try_get("end_quantity")?)?,
                    price: Money::from_minor(row.try_get("price")?),
                    description: row.try_get("description")?,
                });
            }
        }

        Ok(ids.iter().filter_map(|id| products.remove(id)).collect())
    }

    async fn load_orders(&self, ids: &[Uuid]) -> Result<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut orders: HashMap<Uuid, Order> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = row.try_get("id")?;
            orders.insert(id, Self::row_to_order(row)?);
        }

        let line_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity, unit_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let line_ids: Vec<Uuid> = line_rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let usage_rows = sqlx::query(
            r#"
            SELECT id, line_id, material_id, units_per_material, material_price,
                   budgeted_usage, actual_usage
            FROM material_usages
            WHERE line_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(&line_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut usages: HashMap<Uuid, Vec<MaterialUsage>> = HashMap::new();
        for row in &usage_rows {
            usages
                .entry(row.try_get("line_id")?)
                .or_default()
                .push(MaterialUsage {
                    id: MaterialUsageId::from_uuid(row.try_get("id")?),
                    material_id: MaterialId::from_uuid(row.try_get("material_id")?),
                    units_per_material: to_u32(
                        "material_usages",
                        row.try_get("units_per_material")?,
                    )?,
                    material_price: Money::from_minor(row.try_get("material_price")?),
                    budgeted_usage: to_u32("material_usages", row.try_get("budgeted_usage")?)?,
                    actual_usage: to_u32("material_usages", row.try_get("actual_usage")?)?,
                });
        }

        for row in &line_rows {
            let line_id: Uuid = row.try_get("id")?;
            let order_id: Uuid = row.try_get("order_id")?;
            if let Some(order) = orders.get_mut(&order_id) {
                order.lines.push(OrderLine {
                    id: OrderLineId::from_uuid(line_id),
                    product_id: ProductId::from_uuid(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: to_u32("order_lines", row.try_get("quantity")?)?,
                    unit_price: Money::from_minor(row.try_get("unit_price")?),
                    usages: usages.remove(&line_id).unwrap_or_default(),
                });
            }
        }

        let cost_rows = sqlx::query(
            r#"
            SELECT id, order_id, amount, description
            FROM additional_costs
            WHERE order_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        for row in &cost_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            if let Some(order) = orders.get_mut(&order_id) {
                order.costs.push(AdditionalCost {
                    id: AdditionalCostId::from_uuid(row.try_get("id")?),
                    amount: Money::from_minor(row.try_get("amount")?),
                    description: row.try_get("description")?,
                });
            }
        }

        Ok(ids.iter().filter_map(|id| orders.remove(id)).collect())
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            version: Version::new(row.try_get("version")?),
            status: OrderStatus::from_code(row.try_get("status")?)
                .map_err(|e| StoreError::invalid_row("orders", e))?,
            customer: row.try_get("customer")?,
            customer_id: row
                .try_get::<Option<Uuid>, _>("customer_id")?
                .map(CustomerId::from_uuid),
            description: row.try_get("description")?,
            total_price: Money::from_minor(row.try_get("total_price")?),
            materials_price: Money::from_minor(row.try_get("materials_price")?),
            paid: Money::from_minor(row.try_get("paid")?),
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            ready_at: row.try_get("ready_at")?,
            shipped_at: row.try_get("shipped_at")?,
            completed_at: row.try_get("completed_at")?,
            canceled_at: row.try_get("canceled_at")?,
            lines: Vec::new(),
            costs: Vec::new(),
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_material(&self, id: MaterialId) -> Result<Option<Material>> {
        let row = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_material).transpose()
    }

    async fn get_materials(&self, ids: &[MaterialId]) -> Result<Vec<Material>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_material).collect()
    }

    async fn find_material(&self, key: MaterialKey<'_>) -> Result<Option<Material>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {MATERIAL_COLUMNS} FROM materials
            WHERE name = $1
              AND material_type = $2
              AND detail IS NOT DISTINCT FROM $3
              AND description IS NOT DISTINCT FROM $4
            LIMIT 1
            "#
        ))
        .bind(key.name)
        .bind(key.material_type)
        .bind(key.detail)
        .bind(key.description)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_material).transpose()
    }

    async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: Page,
    ) -> Result<Listing<Material>> {
        let mut conditions = String::from(" WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if filter.material_type.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND material_type = ${param_count}"));
        }
        if filter.search.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND name ILIKE '%' || ${param_count} || '%'"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM materials{conditions}");
        let list_sql = format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials{conditions} ORDER BY {} {}, id ASC LIMIT ${} OFFSET ${}",
            filter.sort_by.column(),
            filter.order.as_sql(),
            param_count + 1,
            param_count + 2,
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query(&list_sql);
        if let Some(material_type) = &filter.material_type {
            count_query = count_query.bind(material_type);
            list_query = list_query.bind(material_type);
        }
        if let Some(search) = &filter.search {
            count_query = count_query.bind(search);
            list_query = list_query.bind(search);
        }

        let total = count_query.fetch_one(&self.pool).await?;
        let rows = list_query
            .bind(page.limit as i64)
            .bind(page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Listing {
            items: rows
                .iter()
                .map(Self::row_to_material)
                .collect::<Result<_>>()?,
            total: total as usize,
        })
    }

    async fn insert_material(&self, material: &Material) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO materials (id, version, name, material_type, detail, description,
                                   status, pack_price, unit_price, units_per_pack, count_left,
                                   created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(material.id.as_uuid())
        .bind(material.version.as_i64())
        .bind(&material.name)
        .bind(&material.material_type)
        .bind(&material.detail)
        .bind(&material.description)
        .bind(material.status.code())
        .bind(material.pack_price.minor())
        .bind(material.unit_price.minor())
        .bind(i64::from(material.units_per_pack))
        .bind(material.count_left)
        .bind(material.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_material(
        &self,
        material: &Material,
        expected_version: Version,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        let version = lock_version(
            &mut tx,
            "materials",
            "material",
            material.id.as_uuid(),
            expected_version,
        )
        .await?;
        sqlx::query(
            r#"
            UPDATE materials
            SET version = $2, name = $3, material_type = $4, detail = $5, description = $6,
                status = $7, pack_price = $8, unit_price = $9, units_per_pack = $10
            WHERE id = $1
            "#,
        )
        .bind(material.id.as_uuid())
        .bind(version.as_i64())
        .bind(&material.name)
        .bind(&material.material_type)
        .bind(&material.detail)
        .bind(&material.description)
        .bind(material.status.code())
        .bind(material.pack_price.minor())
        .bind(material.unit_price.minor())
        .bind(i64::from(material.units_per_pack))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(version)
    }

    async fn adjust_stock(&self, id: MaterialId, delta: i64) -> Result<Material> {
        let mut tx = self.pool.begin().await?;

        apply_stock_change(&mut tx, id, delta).await?;
        let row = sqlx::query(&format!(
            "SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_material(&row)
    }

    async fn delete_material(&self, id: MaterialId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM materials WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DomainError::not_found("material", id).into());
        }

        let used: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM material_usages WHERE material_id = $1)",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        if used {
            return Err(DomainError::conflict(format!("material {id} is used by orders")).into());
        }

        sqlx::query("DELETE FROM materials WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.load_products(&[id.as_uuid()]).await?.pop())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        self.load_products(&ids).await
    }

    async fn find_product(&self, key: ProductKey<'_>) -> Result<Option<Product>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM products
            WHERE name = $1
              AND size = $2
              AND detail IS NOT DISTINCT FROM $3
              AND description IS NOT DISTINCT FROM $4
            LIMIT 1
            "#,
        )
        .bind(key.name)
        .bind(key.size)
        .bind(key.detail)
        .bind(key.description)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => Ok(self.load_products(&[id]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> Result<Listing<Product>> {
        let mut conditions = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if filter.name.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND name = ${param_count}"));
        }
        if filter.search.is_some() {
            param_count += 1;
            conditions.push_str(&format!(
                " AND (name ILIKE '%' || ${param_count} || '%' OR size ILIKE '%' || ${param_count} || '%')"
            ));
        }

        let count_sql = format!("SELECT COUNT(*) FROM products{conditions}");
        let list_sql = format!(
            "SELECT id FROM products{conditions} ORDER BY {} {}, id ASC LIMIT ${} OFFSET ${}",
            filter.sort_by.column(),
            filter.order.as_sql(),
            param_count + 1,
            param_count + 2,
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query_scalar::<_, Uuid>(&list_sql);
        if let Some(name) = &filter.name {
            count_query = count_query.bind(name);
            list_query = list_query.bind(name);
        }
        if let Some(search) = &filter.search {
            count_query = count_query.bind(search);
            list_query = list_query.bind(search);
        }

        let total = count_query.fetch_one(&self.pool).await?;
        let ids = list_query
            .bind(page.limit as i64)
            .bind(page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Listing {
            items: self.load_products(&ids).await?,
            total: total as usize,
        })
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, version, name, size, detail, description, status,
                                  created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.version.as_i64())
        .bind(&product.name)
        .bind(&product.size)
        .bind(&product.detail)
        .bind(&product.description)
        .bind(product.status.code())
        .bind(product.created_at)
        .execute(&mut *tx)
        .await?;

        write_product_children(&mut tx, product).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_product(
        &self,
        product: &Product,
        expected_version: Version,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        let version = lock_version(
            &mut tx,
            "products",
            "product",
            product.id.as_uuid(),
            expected_version,
        )
        .await?;
        sqlx::query(
            r#"
            UPDATE products
            SET version = $2, name = $3, size = $4, detail = $5, description = $6, status = $7
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(version.as_i64())
        .bind(&product.name)
        .bind(&product.size)
        .bind(&product.detail)
        .bind(&product.description)
        .bind(product.status.code())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM product_materials WHERE product_id = $1")
            .bind(product.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM price_tiers WHERE product_id = $1")
            .bind(product.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        write_product_children(&mut tx, product).await?;

        tx.commit().await?;
        tracing::debug!(product_id = %product.id, %version, "product saved");
        Ok(version)
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DomainError::not_found("product", id).into());
        }

        let used: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_lines WHERE product_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if used {
            return Err(DomainError::conflict(format!("product {id} is used by orders")).into());
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.load_orders(&[id.as_uuid()]).await?.pop())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> Result<Listing<Order>> {
        let mut conditions = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if filter.created_from.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND created_at >= ${param_count}"));
        }
        if filter.created_to.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND created_at <= ${param_count}"));
        }
        if filter.customer.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND customer = ${param_count}"));
        }
        if filter.customer_id.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND customer_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND status = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders{conditions}");
        let list_sql = format!(
            "SELECT id FROM orders{conditions} ORDER BY {} {}, id ASC LIMIT ${} OFFSET ${}",
            filter.sort_by.column(),
            filter.order.as_sql(),
            param_count + 1,
            param_count + 2,
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut list_query = sqlx::query_scalar::<_, Uuid>(&list_sql);
        if let Some(from) = filter.created_from {
            count_query = count_query.bind(from);
            list_query = list_query.bind(from);
        }
        if let Some(to) = filter.created_to {
            count_query = count_query.bind(to);
            list_query = list_query.bind(to);
        }
        if let Some(customer) = &filter.customer {
            count_query = count_query.bind(customer);
            list_query = list_query.bind(customer);
        }
        if let Some(customer_id) = filter.customer_id {
            count_query = count_query.bind(customer_id.as_uuid());
            list_query = list_query.bind(customer_id.as_uuid());
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.code());
            list_query = list_query.bind(status.code());
        }

        let total = count_query.fetch_one(&self.pool).await?;
        let ids = list_query
            .bind(page.limit as i64)
            .bind(page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(Listing {
            items: self.load_orders(&ids).await?,
            total: total as usize,
        })
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.version.as_i64())
        .bind(order.status.code())
        .bind(&order.customer)
        .bind(order.customer_id.map(|c| c.as_uuid()))
        .bind(&order.description)
        .bind(order.total_price.minor())
        .bind(order.materials_price.minor())
        .bind(order.paid.minor())
        .bind(order.created_at)
        .bind(order.confirmed_at)
        .bind(order.ready_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.canceled_at)
        .execute(&mut *tx)
        .await?;

        write_order_children(&mut tx, order).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_order(&self, order: &Order, options: CommitOptions) -> Result<Version> {
        // Start a transaction
        let mut tx = self.pool.begin().await?;

        let version = lock_version(
            &mut tx,
            "orders",
            "order",
            order.id.as_uuid(),
            options.expected_version,
        )
        .await?;

        for change in lock_order(&options.stock) {
            apply_stock_change(&mut tx, change.material_id, change.delta).await?;
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET version = $2, status = $3, customer = $4, customer_id = $5, description = $6,
                total_price = $7, materials_price = $8, paid = $9, confirmed_at = $10,
                ready_at = $11, shipped_at = $12, completed_at = $13, canceled_at = $14
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(version.as_i64())
        .bind(order.status.code())
        .bind(&order.customer)
        .bind(order.customer_id.map(|c| c.as_uuid()))
        .bind(&order.description)
        .bind(order.total_price.minor())
        .bind(order.materials_price.minor())
        .bind(order.paid.minor())
        .bind(order.confirmed_at)
        .bind(order.ready_at)
        .bind(order.shipped_at)
        .bind(order.completed_at)
        .bind(order.canceled_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_lines WHERE order_id = $1")
            .bind(order.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM additional_costs WHERE order_id = $1")
            .bind(order.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        write_order_children(&mut tx, order).await?;

        tx.commit().await?;
        tracing::debug!(order_id = %order.id, %version, "order committed");
        Ok(version)
    }

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_expense).transpose()
    }

    async fn list_expenses(&self, filter: &ExpenseFilter, page: Page) -> Result<ExpenseListing> {
        let mut conditions = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if filter.date_from.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND actual_date >= ${param_count}"));
        }
        if filter.date_to.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND actual_date <= ${param_count}"));
        }
        if filter.expense_type.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND expense_type = ${param_count}"));
        }
        if filter.periodicity.is_some() {
            param_count += 1;
            conditions.push_str(&format!(" AND periodicity = ${param_count}"));
        }

        let summary_sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0)::BIGINT FROM expenses{conditions}"
        );
        let list_sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses{conditions} \
             ORDER BY actual_date {order}, created_at {order}, id {order} LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2,
            order = filter.order.as_sql(),
        );

        let mut summary_query = sqlx::query_as::<_, (i64, i64)>(&summary_sql);
        let mut list_query = sqlx::query(&list_sql);
        if let Some(from) = filter.date_from {
            summary_query = summary_query.bind(from);
            list_query = list_query.bind(from);
        }
        if let Some(to) = filter.date_to {
            summary_query = summary_query.bind(to);
            list_query = list_query.bind(to);
        }
        if let Some(expense_type) = &filter.expense_type {
            summary_query = summary_query.bind(expense_type);
            list_query = list_query.bind(expense_type);
        }
        if let Some(periodicity) = &filter.periodicity {
            summary_query = summary_query.bind(periodicity);
            list_query = list_query.bind(periodicity);
        }

        let (total, amount_total) = summary_query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| out_of_range_as_invalid(e, "amount"))?;
        let rows = list_query
            .bind(page.limit as i64)
            .bind(page.skip as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(ExpenseListing {
            expenses: Listing {
                items: rows
                    .iter()
                    .map(Self::row_to_expense)
                    .collect::<Result<_>>()?,
                total: total as usize,
            },
            amount_total: Money::from_minor(amount_total),
        })
    }

    async fn insert_expense(&self, expense: &Expense) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, expense_type, periodicity, description, amount,
                                  actual_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(expense.id.as_uuid())
        .bind(&expense.expense_type)
        .bind(&expense.periodicity)
        .bind(&expense.description)
        .bind(expense.amount.minor())
        .bind(expense.actual_date)
        .bind(expense.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_expense(&self, id: ExpenseId, update: ExpenseUpdate) -> Result<Expense> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DomainError::not_found("expense", id))?;
        let mut expense = Self::row_to_expense(&row)?;
        expense.apply_update(update)?;

        sqlx::query(
            r#"
            UPDATE expenses
            SET expense_type = $2, periodicity = $3, description = $4, amount = $5,
                actual_date = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&expense.expense_type)
        .bind(&expense.periodicity)
        .bind(&expense.description)
        .bind(expense.amount.minor())
        .bind(expense.actual_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(expense)
    }

    async fn delete_expense(&self, id: ExpenseId) -> Result<()> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("expense", id).into());
        }
        Ok(())
    }
}

/// Turns Postgres' numeric_value_out_of_range into an input error on `field`.
fn out_of_range_as_invalid(err: sqlx::Error, field: &'static str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some("22003")
    {
        return DomainError::out_of_range(field).into();
    }
    StoreError::Database(err)
}

/// Locks a material row, checks the change against its stock and applies it.
async fn apply_stock_change(conn: &mut PgConnection, id: MaterialId, delta: i64) -> Result<()> {
    let available: Option<i64> =
        sqlx::query_scalar("SELECT count_left FROM materials WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?;
    let available = available.ok_or_else(|| DomainError::not_found("material", id))?;
    let count_left = stock_after(id, available, delta)?;

    sqlx::query("UPDATE materials SET count_left = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(count_left)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Locks a versioned row, checks it is still at `expected` and returns the
/// version the write will store.
async fn lock_version(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
    expected: Version,
) -> Result<Version> {
    let current: Option<i64> =
        sqlx::query_scalar(&format!("SELECT version FROM {table} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    let actual = Version::new(current.ok_or_else(|| DomainError::not_found(entity, id))?);
    if actual != expected {
        return Err(StoreError::concurrency_conflict(entity, id, expected, actual));
    }
    Ok(actual.next())
}

async fn write_product_children(conn: &mut PgConnection, product: &Product) -> Result<()> {
    let material_ids: Vec<Uuid> = product.material_ids().map(|id| id.as_uuid()).collect();
    let known: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM materials WHERE id = ANY($1)")
        .bind(&material_ids)
        .fetch_all(&mut *conn)
        .await?;
    if let Some(missing) = material_ids.iter().find(|id| !known.contains(id)) {
        return Err(DomainError::not_found("material", missing).into());
    }

    for (position, entry) in product.bom.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO product_materials (id, product_id, material_id, units_per_material,
                                           position)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(entry.material_id.as_uuid())
        .bind(i64::from(entry.units_per_material))
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }

    for (position, tier) in product.price_tiers.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO price_tiers (id, product_id, start_quantity, end_quantity, price,
                                     description, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(tier.id.as_uuid())
        .bind(product.id.as_uuid())
        .bind(i64::from(tier.start))
        .bind(i64::from(tier.end))
        .bind(tier.price.minor())
        .bind(&tier.description)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn write_order_children(conn: &mut PgConnection, order: &Order) -> Result<()> {
    for (position, line) in order.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_lines (id, order_id, product_id, product_name, quantity,
                                     unit_price, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(order.id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(&line.product_name)
        .bind(i64::from(line.quantity))
        .bind(line.unit_price.minor())
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;

        for (position, usage) in line.usages.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO material_usages (id, line_id, material_id, units_per_material,
                                             material_price, budgeted_usage, actual_usage,
                                             position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(usage.id.as_uuid())
            .bind(line.id.as_uuid())
            .bind(usage.material_id.as_uuid())
            .bind(i64::from(usage.units_per_material))
            .bind(usage.material_price.minor())
            .bind(i64::from(usage.budgeted_usage))
            .bind(i64::from(usage.actual_usage))
            .bind(position as i32)
            .execute(&mut *conn)
            .await?;
        }
    }

    for (position, cost) in order.costs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO additional_costs (id, order_id, amount, description, position)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(cost.id.as_uuid())
        .bind(order.id.as_uuid())
        .bind(cost.amount.minor())
        .bind(&cost.description)
        .bind(position as i32)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn to_u32(table: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::invalid_row(table, format!("{value} out of range")))
}
