//! Stock materials and their single-row ledger operations.

use chrono::{DateTime, Utc};
use common::{MaterialId, Money, Version};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// Whether a material is offered for new products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    Inactive,
    #[default]
    Active,
}

impl MaterialStatus {
    /// Stored integer code.
    pub fn code(&self) -> i16 {
        match self {
            MaterialStatus::Inactive => 0,
            MaterialStatus::Active => 1,
        }
    }

    /// Parses a stored integer code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(MaterialStatus::Inactive),
            1 => Ok(MaterialStatus::Active),
            other => Err(DomainError::invalid_input(
                "status",
                format!("unknown material status code {other}"),
            )),
        }
    }
}

/// A raw stock material.
///
/// `count_left` is measured in material units (one sheet, one spool) and is
/// never negative. Only [`Material::deduct`] and [`Material::restore`]
/// change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    /// Bumped by descriptive and pricing edits. Stock moves do not touch it.
    pub version: Version,
    pub name: String,
    pub material_type: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub status: MaterialStatus,
    /// Price of one pack.
    pub pack_price: Money,
    /// Price of one material unit, derived from the pack price.
    pub unit_price: Money,
    pub units_per_pack: u32,
    pub count_left: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    pub material_type: String,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub pack_price: Money,
    pub units_per_pack: u32,
    pub count_left: i64,
}

/// Partial update of a material's descriptive and pricing fields.
///
/// Stock is not part of it: use the ledger operations instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialUpdate {
    pub status: Option<MaterialStatus>,
    pub name: Option<String>,
    pub material_type: Option<String>,
    pub detail: Option<String>,
    pub description: Option<String>,
    pub pack_price: Option<Money>,
    pub units_per_pack: Option<u32>,
}

impl MaterialUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.name.is_none()
            && self.material_type.is_none()
            && self.detail.is_none()
            && self.description.is_none()
            && self.pack_price.is_none()
            && self.units_per_pack.is_none()
    }
}

impl Material {
    /// Validates the input and creates an active material.
    pub fn new(input: NewMaterial) -> Result<Self> {
        let name = required_text("name", &input.name)?;
        let material_type = required_text("material_type", &input.material_type)?;
        if input.pack_price.is_negative() {
            return Err(DomainError::invalid_input("pack_price", "must not be negative"));
        }
        if input.count_left < 0 {
            return Err(DomainError::invalid_input("count_left", "must not be negative"));
        }

        Ok(Self {
            id: MaterialId::new(),
            version: Version::initial(),
            name,
            material_type,
            detail: input.detail,
            description: input.description,
            status: MaterialStatus::Active,
            pack_price: input.pack_price,
            unit_price: Self::unit_price_for(input.pack_price, input.units_per_pack),
            units_per_pack: input.units_per_pack,
            count_left: input.count_left,
            created_at: Utc::now(),
        })
    }

    /// Per-unit price of a pack, rounded half to even. Zero when either the
    /// pack price or the pack size is zero.
    pub fn unit_price_for(pack_price: Money, units_per_pack: u32) -> Money {
        pack_price.split(units_per_pack)
    }

    /// Applies a partial update and re-derives the unit price.
    pub fn apply_update(&mut self, update: MaterialUpdate) -> Result<()> {
        if update.is_empty() {
            return Err(DomainError::invalid_input("update", "no fields to update provided"));
        }
        if let Some(price) = update.pack_price
            && price.is_negative()
        {
            return Err(DomainError::invalid_input("pack_price", "must not be negative"));
        }

        let name = update
            .name
            .as_deref()
            .map(|n| required_text("name", n))
            .transpose()?;
        let material_type = update
            .material_type
            .as_deref()
            .map(|t| required_text("material_type", t))
            .transpose()?;

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(material_type) = material_type {
            self.material_type = material_type;
        }
        if let Some(detail) = update.detail {
            self.detail = Some(detail);
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(pack_price) = update.pack_price {
            self.pack_price = pack_price;
        }
        if let Some(units_per_pack) = update.units_per_pack {
            self.units_per_pack = units_per_pack;
        }
        self.unit_price = Self::unit_price_for(self.pack_price, self.units_per_pack);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == MaterialStatus::Active
    }

    /// Removes `amount` units from stock.
    ///
    /// Fails without touching the stock when fewer than `amount` units are
    /// left.
    pub fn deduct(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(DomainError::invalid_input("amount", "deduction must not be negative"));
        }
        if self.count_left < amount {
            return Err(DomainError::InsufficientStock {
                material: self.id,
                needed: amount,
                available: self.count_left,
            });
        }
        self.count_left -= amount;
        Ok(())
    }

    /// Puts `amount` units back into stock.
    pub fn restore(&mut self, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(DomainError::invalid_input("amount", "restore must not be negative"));
        }
        self.count_left = self
            .count_left
            .checked_add(amount)
            .ok_or_else(|| DomainError::out_of_range("delta"))?;
        Ok(())
    }

    /// Applies a signed stock change: negative deltas deduct, positive restore.
    pub fn apply_delta(&mut self, delta: i64) -> Result<()> {
        self.count_left = stock_after(self.id, self.count_left, delta)?;
        Ok(())
    }
}

/// Stock left once `delta` is applied to `available` units.
///
/// A deduction larger than the stock fails with `InsufficientStock`; a delta
/// that leaves the `i64` range fails with `InvalidInput` on `delta`.
pub fn stock_after(material: MaterialId, available: i64, delta: i64) -> Result<i64> {
    if delta < 0 {
        let needed = delta
            .checked_neg()
            .ok_or_else(|| DomainError::out_of_range("delta"))?;
        if available < needed {
            return Err(DomainError::InsufficientStock {
                material,
                needed,
                available,
            });
        }
        Ok(available - needed)
    } else {
        available
            .checked_add(delta)
            .ok_or_else(|| DomainError::out_of_range("delta"))
    }
}

pub(crate) fn required_text(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::invalid_input(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(count_left: i64) -> Material {
        Material::new(NewMaterial {
            name: "Plywood sheet".to_string(),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(100_000),
            units_per_pack: 10,
            count_left,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_derives_unit_price() {
        let material = sheet(5);
        assert_eq!(material.unit_price.minor(), 10_000);
        assert!(material.is_active());
    }

    #[test]
    fn test_unit_price_zero_pack() {
        assert_eq!(
            Material::unit_price_for(Money::from_minor(500), 0),
            Money::zero()
        );
        assert_eq!(Material::unit_price_for(Money::zero(), 4), Money::zero());
    }

    #[test]
    fn test_new_rejects_negative_stock() {
        let result = Material::new(NewMaterial {
            name: "Glue".to_string(),
            material_type: "chemicals".to_string(),
            count_left: -1,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(DomainError::InvalidInput {
                field: "count_left",
                ..
            })
        ));
    }

    #[test]
    fn test_new_rejects_blank_name() {
        let result = Material::new(NewMaterial {
            name: "   ".to_string(),
            material_type: "wood".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(DomainError::InvalidInput { field: "name", .. })
        ));
    }

    #[test]
    fn test_deduct_and_restore() {
        let mut material = sheet(10);
        material.deduct(3).unwrap();
        assert_eq!(material.count_left, 7);
        material.restore(2).unwrap();
        assert_eq!(material.count_left, 9);
    }

    #[test]
    fn test_deduct_insufficient_leaves_stock() {
        let mut material = sheet(2);
        let err = material.deduct(3).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                material: material.id,
                needed: 3,
                available: 2,
            }
        );
        assert_eq!(material.count_left, 2);
    }

    #[test]
    fn test_deduct_exact_stock_reaches_zero() {
        let mut material = sheet(4);
        material.deduct(4).unwrap();
        assert_eq!(material.count_left, 0);
    }

    #[test]
    fn test_apply_delta() {
        let mut material = sheet(5);
        material.apply_delta(-5).unwrap();
        material.apply_delta(2).unwrap();
        assert_eq!(material.count_left, 2);
        assert!(material.apply_delta(-3).is_err());
        assert_eq!(material.count_left, 2);
    }

    #[test]
    fn test_apply_delta_at_i64_extremes() {
        let mut material = sheet(5);
        assert!(matches!(
            material.apply_delta(i64::MIN),
            Err(DomainError::InvalidInput { field: "delta", .. })
        ));
        assert!(matches!(
            material.apply_delta(i64::MAX),
            Err(DomainError::InvalidInput { field: "delta", .. })
        ));
        assert_eq!(material.count_left, 5);

        material.apply_delta(-5).unwrap();
        material.apply_delta(i64::MAX).unwrap();
        assert_eq!(material.count_left, i64::MAX);
        assert!(matches!(
            material.apply_delta(-i64::MAX - 1),
            Err(DomainError::InvalidInput { field: "delta", .. })
        ));
    }

    #[test]
    fn test_update_recomputes_unit_price() {
        let mut material = sheet(5);
        material
            .apply_update(MaterialUpdate {
                units_per_pack: Some(4),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(material.unit_price.minor(), 25_000);

        material
            .apply_update(MaterialUpdate {
                status: Some(MaterialStatus::Inactive),
                ..Default::default()
            })
            .unwrap();
        assert!(!material.is_active());
    }

    #[test]
    fn test_empty_update_rejected() {
        let mut material = sheet(5);
        let err = material.apply_update(MaterialUpdate::default()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput { field: "update", .. }));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(MaterialStatus::Active.code(), 1);
        assert_eq!(MaterialStatus::from_code(0).unwrap(), MaterialStatus::Inactive);
        assert!(MaterialStatus::from_code(7).is_err());
    }
}
