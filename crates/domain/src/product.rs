//! Products, their bill-of-materials and price tiers.

use chrono::{DateTime, Utc};
use common::{BomEntryId, MaterialId, Money, PriceTierId, ProductId, Version};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::pricing::{self, PriceTier};

/// Whether a product is offered for new orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Inactive,
    #[default]
    Active,
}

impl ProductStatus {
    pub fn code(&self) -> i16 {
        match self {
            ProductStatus::Inactive => 0,
            ProductStatus::Active => 1,
        }
    }

    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(ProductStatus::Inactive),
            1 => Ok(ProductStatus::Active),
            other => Err(DomainError::invalid_input(
                "status",
                format!("unknown product status code {other}"),
            )),
        }
    }
}

/// One bill-of-materials entry.
///
/// `units_per_material` is a capacity: how many product units a single
/// material unit yields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomEntry {
    pub id: BomEntryId,
    pub material_id: MaterialId,
    pub units_per_material: u32,
}

/// A product built from materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Bumped by every saved edit, including BOM and tier changes.
    pub version: Version,
    pub name: String,
    pub size: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub bom: Vec<BomEntry>,
    pub price_tiers: Vec<PriceTier>,
}

/// Input for creating a product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub size: String,
    pub detail: Option<String>,
    pub description: Option<String>,
}

/// Partial update of a product's descriptive fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductUpdate {
    pub status: Option<ProductStatus>,
    pub name: Option<String>,
    pub size: Option<String>,
    pub detail: Option<String>,
    pub description: Option<String>,
}

/// Input for a new price tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPriceTier {
    pub start: u32,
    pub end: u32,
    pub price: Money,
    pub description: Option<String>,
}

/// Partial update of a price tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTierUpdate {
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub price: Option<Money>,
    pub description: Option<String>,
}

impl Product {
    /// Creates an active product with an empty bill-of-materials and no tiers.
    pub fn new(input: NewProduct) -> Result<Self> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid_input("name", "must not be empty"));
        }

        Ok(Self {
            id: ProductId::new(),
            version: Version::initial(),
            name: name.to_string(),
            size: input.size.trim().to_string(),
            detail: input.detail,
            description: input.description,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            bom: Vec::new(),
            price_tiers: Vec::new(),
        })
    }

    pub fn apply_update(&mut self, update: ProductUpdate) -> Result<()> {
        if update.status.is_none()
            && update.name.is_none()
            && update.size.is_none()
            && update.detail.is_none()
            && update.description.is_none()
        {
            return Err(DomainError::invalid_input("update", "no fields to update provided"));
        }
        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(DomainError::invalid_input("name", "must not be empty"));
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(size) = update.size {
            self.size = size.trim().to_string();
        }
        if let Some(detail) = update.detail {
            self.detail = Some(detail);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }

    /// Unit price for an order of `quantity` units.
    pub fn price_for(&self, quantity: u32) -> Money {
        pricing::price_for(&self.price_tiers, quantity)
    }

    /// Materials referenced by the bill-of-materials.
    pub fn material_ids(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.bom.iter().map(|entry| entry.material_id)
    }

    /// Adds a material to the bill-of-materials.
    pub fn add_bom_entry(
        &mut self,
        material_id: MaterialId,
        units_per_material: u32,
    ) -> Result<BomEntryId> {
        validate_ratio(units_per_material)?;
        if self.bom.iter().any(|e| e.material_id == material_id) {
            return Err(DomainError::conflict(format!(
                "material {material_id} already in product {}",
                self.id
            )));
        }

        let entry = BomEntry {
            id: BomEntryId::new(),
            material_id,
            units_per_material,
        };
        let id = entry.id;
        self.bom.push(entry);
        Ok(id)
    }

    pub fn update_bom_entry(
        &mut self,
        entry_id: BomEntryId,
        units_per_material: u32,
    ) -> Result<()> {
        validate_ratio(units_per_material)?;
        let entry = self
            .bom
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| DomainError::not_found("bill-of-materials entry", entry_id))?;
        entry.units_per_material = units_per_material;
        Ok(())
    }

    pub fn remove_bom_entry(&mut self, entry_id: BomEntryId) -> Result<BomEntry> {
        let index = self
            .bom
            .iter()
            .position(|e| e.id == entry_id)
            .ok_or_else(|| DomainError::not_found("bill-of-materials entry", entry_id))?;
        Ok(self.bom.remove(index))
    }

    /// Adds a price tier, rejecting ranges that overlap existing ones.
    pub fn add_price_tier(&mut self, input: NewPriceTier) -> Result<PriceTierId> {
        let tier = PriceTier {
            id: PriceTierId::new(),
            start: input.start,
            end: input.end,
            price: input.price,
            description: input.description,
        };
        pricing::validate_tier(&self.price_tiers, &tier)?;
        let id = tier.id;
        self.price_tiers.push(tier);
        Ok(id)
    }

    pub fn update_price_tier(
        &mut self,
        tier_id: PriceTierId,
        update: PriceTierUpdate,
    ) -> Result<()> {
        let current = self
            .price_tiers
            .iter()
            .find(|t| t.id == tier_id)
            .ok_or_else(|| DomainError::not_found("price tier", tier_id))?;

        let updated = PriceTier {
            id: tier_id,
            start: update.start.unwrap_or(current.start),
            end: update.end.unwrap_or(current.end),
            price: update.price.unwrap_or(current.price),
            description: update.description.or_else(|| current.description.clone()),
        };
        pricing::validate_tier(&self.price_tiers, &updated)?;

        if let Some(slot) = self.price_tiers.iter_mut().find(|t| t.id == tier_id) {
            *slot = updated;
        }
        Ok(())
    }

    pub fn remove_price_tier(&mut self, tier_id: PriceTierId) -> Result<PriceTier> {
        let index = self
            .price_tiers
            .iter()
            .position(|t| t.id == tier_id)
            .ok_or_else(|| DomainError::not_found("price tier", tier_id))?;
        Ok(self.price_tiers.remove(index))
    }
}

fn validate_ratio(units_per_material: u32) -> Result<()> {
    if units_per_material == 0 {
        return Err(DomainError::invalid_input("units_per_material", "must be greater than 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chair() -> Product {
        Product::new(NewProduct {
            name: "Chair".to_string(),
            size: "M".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn tier(start: u32, end: u32, price: i64) -> NewPriceTier {
        NewPriceTier {
            start,
            end,
            price: Money::from_minor(price),
            description: None,
        }
    }

    #[test]
    fn test_new_product_is_empty_and_active() {
        let product = chair();
        assert!(product.is_active());
        assert!(product.bom.is_empty());
        assert_eq!(product.price_for(10), Money::zero());
    }

    #[test]
    fn test_add_bom_entry_rejects_duplicate_material() {
        let mut product = chair();
        let material = MaterialId::new();
        product.add_bom_entry(material, 5).unwrap();
        let err = product.add_bom_entry(material, 2).unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
        assert_eq!(product.bom.len(), 1);
    }

    #[test]
    fn test_add_bom_entry_rejects_zero_ratio() {
        let mut product = chair();
        let err = product.add_bom_entry(MaterialId::new(), 0).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidInput {
                field: "units_per_material",
                ..
            }
        ));
    }

    #[test]
    fn test_update_and_remove_bom_entry() {
        let mut product = chair();
        let entry = product.add_bom_entry(MaterialId::new(), 5).unwrap();
        product.update_bom_entry(entry, 8).unwrap();
        assert_eq!(product.bom[0].units_per_material, 8);
        assert!(product.update_bom_entry(entry, 0).is_err());

        product.remove_bom_entry(entry).unwrap();
        assert!(product.bom.is_empty());
        assert!(matches!(
            product.remove_bom_entry(entry),
            Err(DomainError::NotFound { .. })
        ));
    }

    #[test]
    fn test_price_tiers() {
        let mut product = chair();
        product.add_price_tier(tier(1, 9, 1000)).unwrap();
        let bulk = product.add_price_tier(tier(10, 100, 800)).unwrap();
        assert_eq!(product.price_for(10).minor(), 800);

        assert!(product.add_price_tier(tier(5, 12, 900)).is_err());
        assert_eq!(product.price_tiers.len(), 2);

        product
            .update_price_tier(
                bulk,
                PriceTierUpdate {
                    price: Some(Money::from_minor(750)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(product.price_for(20).minor(), 750);

        let err = product
            .update_price_tier(
                bulk,
                PriceTierUpdate {
                    start: Some(9),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput { .. }));

        product.remove_price_tier(bulk).unwrap();
        assert_eq!(product.price_tiers.len(), 1);
    }

    #[test]
    fn test_update_product_fields() {
        let mut product = chair();
        product
            .apply_update(ProductUpdate {
                size: Some("XL".to_string()),
                status: Some(ProductStatus::Inactive),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(product.size, "XL");
        assert!(!product.is_active());
        assert!(product.apply_update(ProductUpdate::default()).is_err());
    }
}
