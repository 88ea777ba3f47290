//! Materials and products administration.

use common::{BomEntryId, MaterialId, PriceTierId, ProductId};
use domain::{
    DomainError, Material, MaterialUpdate, NewMaterial, NewPriceTier, NewProduct, PriceTierUpdate,
    Product, ProductUpdate,
};
use store::{Listing, MaterialFilter, MaterialKey, Page, ProductFilter, ProductKey, Store};

use crate::error::Result;

/// Service for the material and product catalog.
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -- Materials --

    /// Creates a material. A material with the same name, type, detail and
    /// description is a conflict.
    #[tracing::instrument(skip(self))]
    pub async fn create_material(&self, input: NewMaterial) -> Result<Material> {
        let material = Material::new(input)?;
        if self.store.find_material(material_key(&material)).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "material {} ({}) already exists",
                material.name, material.material_type
            ))
            .into());
        }

        self.store.insert_material(&material).await?;
        tracing::info!(material_id = %material.id, "material created");
        Ok(material)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_material(&self, id: MaterialId) -> Result<Material> {
        self.store
            .get_material(id)
            .await?
            .ok_or_else(|| DomainError::not_found("material", id).into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_materials(
        &self,
        filter: &MaterialFilter,
        page: Page,
    ) -> Result<Listing<Material>> {
        Ok(self.store.list_materials(filter, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_material(
        &self,
        id: MaterialId,
        update: MaterialUpdate,
    ) -> Result<Material> {
        let mut material = self.get_material(id).await?;
        material.apply_update(update)?;
        if let Some(existing) = self.store.find_material(material_key(&material)).await?
            && existing.id != id
        {
            return Err(DomainError::conflict(format!(
                "material {} ({}) already exists",
                material.name, material.material_type
            ))
            .into());
        }

        material.version = self
            .store
            .update_material(&material, material.version)
            .await?;
        Ok(material)
    }

    /// Receives (positive) or writes off (negative) stock outside any order.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, id: MaterialId, delta: i64) -> Result<Material> {
        let material = self.store.adjust_stock(id, delta).await?;
        tracing::info!(
            material_id = %id,
            delta,
            count_left = material.count_left,
            "stock adjusted"
        );
        Ok(material)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_material(&self, id: MaterialId) -> Result<()> {
        self.store.delete_material(id).await?;
        tracing::info!(material_id = %id, "material deleted");
        Ok(())
    }

    // -- Products --

    #[tracing::instrument(skip(self))]
    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let product = Product::new(input)?;
        if self.store.find_product(product_key(&product)).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "product {} ({}) already exists",
                product.name, product.size
            ))
            .into());
        }

        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", id).into())
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        page: Page,
    ) -> Result<Listing<Product>> {
        Ok(self.store.list_products(filter, page).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        product.apply_update(update)?;
        if let Some(existing) = self.store.find_product(product_key(&product)).await?
            && existing.id != id
        {
            return Err(DomainError::conflict(format!(
                "product {} ({}) already exists",
                product.name, product.size
            ))
            .into());
        }

        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.store.delete_product(id).await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    /// Adds an existing material to a product's bill-of-materials.
    #[tracing::instrument(skip(self))]
    pub async fn add_bom_entry(
        &self,
        product_id: ProductId,
        material_id: MaterialId,
        units_per_material: u32,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        self.get_material(material_id).await?;
        product.add_bom_entry(material_id, units_per_material)?;
        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_bom_entry(
        &self,
        product_id: ProductId,
        entry_id: BomEntryId,
        units_per_material: u32,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        product.update_bom_entry(entry_id, units_per_material)?;
        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_bom_entry(
        &self,
        product_id: ProductId,
        entry_id: BomEntryId,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        product.remove_bom_entry(entry_id)?;
        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_price_tier(
        &self,
        product_id: ProductId,
        tier: NewPriceTier,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        product.add_price_tier(tier)?;
        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_price_tier(
        &self,
        product_id: ProductId,
        tier_id: PriceTierId,
        update: PriceTierUpdate,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        product.update_price_tier(tier_id, update)?;
        self.save_product(product).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_price_tier(
        &self,
        product_id: ProductId,
        tier_id: PriceTierId,
    ) -> Result<Product> {
        let mut product = self.get_product(product_id).await?;
        product.remove_price_tier(tier_id)?;
        self.save_product(product).await
    }

    /// Writes an edited product back. Fails with a concurrency conflict if
    /// another edit was saved since it was loaded.
    async fn save_product(&self, mut product: Product) -> Result<Product> {
        product.version = self.store.update_product(&product, product.version).await?;
        tracing::debug!(product_id = %product.id, version = %product.version, "product saved");
        Ok(product)
    }
}

fn material_key(material: &Material) -> MaterialKey<'_> {
    MaterialKey {
        name: &material.name,
        material_type: &material.material_type,
        detail: material.detail.as_deref(),
        description: material.description.as_deref(),
    }
}

fn product_key(product: &Product) -> ProductKey<'_> {
    ProductKey {
        name: &product.name,
        size: &product.size,
        detail: product.detail.as_deref(),
        description: product.description.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use common::Money;
    use store::InMemoryStore;

    fn service() -> CatalogService<InMemoryStore> {
        CatalogService::new(InMemoryStore::new())
    }

    fn oak() -> NewMaterial {
        NewMaterial {
            name: "Oak board".to_string(),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(9000),
            units_per_pack: 3,
            count_left: 6,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_material_is_conflict() {
        let service = service();
        service.create_material(oak()).await.unwrap();
        let err = service.create_material(oak()).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_material_keeps_stock() {
        let service = service();
        let material = service.create_material(oak()).await.unwrap();
        let updated = service
            .update_material(
                material.id,
                MaterialUpdate {
                    pack_price: Some(Money::from_minor(12_000)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.unit_price.minor(), 4000);
        assert_eq!(updated.count_left, 6);
    }

    #[tokio::test]
    async fn test_adjust_stock_refuses_overdraw() {
        let service = service();
        let material = service.create_material(oak()).await.unwrap();
        let err = service.adjust_stock(material.id, -7).await.unwrap_err();
        assert!(err.is_insufficient_stock());
        assert_eq!(service.adjust_stock(material.id, 4).await.unwrap().count_left, 10);
    }

    #[tokio::test]
    async fn test_bom_entry_requires_existing_material() {
        let service = service();
        let product = service
            .create_product(NewProduct {
                name: "Stool".to_string(),
                size: "M".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = service
            .add_bom_entry(product.id, MaterialId::new(), 2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::NotFound { entity: "material", .. })
        ));

        let material = service.create_material(oak()).await.unwrap();
        let product = service.add_bom_entry(product.id, material.id, 2).await.unwrap();
        let entry = product.bom[0].id;
        let product = service.update_bom_entry(product.id, entry, 3).await.unwrap();
        assert_eq!(product.bom[0].units_per_material, 3);

        let stored = service.get_product(product.id).await.unwrap();
        assert_eq!(stored.bom, product.bom);

        let product = service.remove_bom_entry(product.id, entry).await.unwrap();
        assert!(product.bom.is_empty());
    }

    #[tokio::test]
    async fn test_price_tiers_must_not_overlap() {
        let service = service();
        let product = service
            .create_product(NewProduct {
                name: "Stool".to_string(),
                size: "M".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let product = service
            .add_price_tier(
                product.id,
                NewPriceTier {
                    start: 1,
                    end: 10,
                    price: Money::from_minor(2000),
                    description: None,
                },
            )
            .await
            .unwrap();

        let err = service
            .add_price_tier(
                product.id,
                NewPriceTier {
                    start: 10,
                    end: 20,
                    price: Money::from_minor(1800),
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InvalidInput { field: "price_tier", .. })
        ));

        let tier = product.price_tiers[0].id;
        let product = service
            .update_price_tier(
                product.id,
                tier,
                PriceTierUpdate {
                    price: Some(Money::from_minor(2200)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(product.price_for(5).minor(), 2200);

        let product = service.remove_price_tier(product.id, tier).await.unwrap();
        assert_eq!(product.price_for(5), Money::zero());
    }
}
