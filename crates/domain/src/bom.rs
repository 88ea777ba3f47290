//! Bill-of-materials resolution.

use common::{MaterialId, Money};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{DomainError, Result};
use crate::product::Product;

/// The material need of one bill-of-materials entry for a given quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUsage {
    pub material_id: MaterialId,
    pub units_per_material: u32,
    /// Material unit price at resolution time.
    pub material_price: Money,
    pub budgeted_usage: u32,
}

/// Material units required to produce `quantity` product units when one
/// material unit yields `units_per_material` product units.
///
/// A single material unit is always consumed, even for a zero quantity.
pub fn material_units_needed(units_per_material: u32, quantity: u32) -> Result<u32> {
    if units_per_material == 0 {
        return Err(DomainError::invalid_input("units_per_material", "must be greater than 0"));
    }
    if units_per_material >= quantity {
        return Ok(1);
    }
    Ok(quantity.div_ceil(units_per_material))
}

/// Resolves the budgeted material usage for `quantity` units of `product`.
///
/// Every material in the bill-of-materials must be present in the catalog.
pub fn resolve(product: &Product, quantity: u32, catalog: &Catalog) -> Result<Vec<ResolvedUsage>> {
    product
        .bom
        .iter()
        .map(|entry| {
            let material = catalog.material(entry.material_id)?;
            Ok(ResolvedUsage {
                material_id: entry.material_id,
                units_per_material: entry.units_per_material,
                material_price: material.unit_price,
                budgeted_usage: material_units_needed(entry.units_per_material, quantity)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Material, NewMaterial};
    use crate::product::NewProduct;

    fn material(unit_price: i64) -> Material {
        Material::new(NewMaterial {
            name: "Oak board".to_string(),
            material_type: "wood".to_string(),
            pack_price: Money::from_minor(unit_price),
            units_per_pack: 1,
            count_left: 10,
            ..Default::default()
        })
        .unwrap()
    }

    fn product_with(material: &Material, ratio: u32) -> Product {
        let mut product = Product::new(NewProduct {
            name: "Shelf".to_string(),
            ..Default::default()
        })
        .unwrap();
        product.add_bom_entry(material.id, ratio).unwrap();
        product
    }

    #[test]
    fn test_units_needed() {
        assert_eq!(material_units_needed(5, 12).unwrap(), 3);
        assert_eq!(material_units_needed(5, 8).unwrap(), 2);
        assert_eq!(material_units_needed(5, 30).unwrap(), 6);
        assert_eq!(material_units_needed(5, 10).unwrap(), 2);
    }

    #[test]
    fn test_units_needed_capacity_covers_quantity() {
        assert_eq!(material_units_needed(5, 5).unwrap(), 1);
        assert_eq!(material_units_needed(5, 1).unwrap(), 1);
        assert_eq!(material_units_needed(5, 0).unwrap(), 1);
    }

    #[test]
    fn test_units_needed_zero_ratio() {
        assert!(matches!(
            material_units_needed(0, 3),
            Err(DomainError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_resolve_copies_prices() {
        let board = material(450);
        let product = product_with(&board, 5);
        let catalog = Catalog::new().with_material(board.clone());

        let usages = resolve(&product, 12, &catalog).unwrap();
        assert_eq!(
            usages,
            vec![ResolvedUsage {
                material_id: board.id,
                units_per_material: 5,
                material_price: Money::from_minor(450),
                budgeted_usage: 3,
            }]
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let board = material(450);
        let product = product_with(&board, 4);
        let catalog = Catalog::new().with_material(board);
        assert_eq!(
            resolve(&product, 17, &catalog).unwrap(),
            resolve(&product, 17, &catalog).unwrap()
        );
    }

    #[test]
    fn test_resolve_missing_material() {
        let board = material(450);
        let product = product_with(&board, 4);
        let err = resolve(&product, 3, &Catalog::new()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::NotFound {
                entity: "material",
                ..
            }
        ));
    }
}
