//! Inventory ledger: planned stock movements.

use std::collections::BTreeMap;

use common::MaterialId;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{DomainError, Result};
use crate::material::stock_after;

/// A signed change of a material's `count_left`. Negative deducts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub material_id: MaterialId,
    pub delta: i64,
}

impl StockChange {
    pub fn deduct(material_id: MaterialId, amount: u32) -> Self {
        Self {
            material_id,
            delta: -i64::from(amount),
        }
    }

    pub fn restore(material_id: MaterialId, amount: u32) -> Self {
        Self {
            material_id,
            delta: i64::from(amount),
        }
    }

    /// Change that moves stock from `before` to `after` units of usage.
    pub fn between(material_id: MaterialId, before: u32, after: u32) -> Self {
        Self {
            material_id,
            delta: i64::from(before) - i64::from(after),
        }
    }
}

/// Merges `changes` per material and checks every net deduction against the
/// stock loaded in `catalog`.
///
/// Either every material has enough stock and the merged changes are
/// returned ordered by material id, or the first shortfall is reported.
/// Zero net changes are dropped.
pub fn plan(
    catalog: &Catalog,
    changes: impl IntoIterator<Item = StockChange>,
) -> Result<Vec<StockChange>> {
    let mut merged: BTreeMap<MaterialId, i64> = BTreeMap::new();
    for change in changes {
        let delta = merged.entry(change.material_id).or_default();
        *delta = delta
            .checked_add(change.delta)
            .ok_or_else(|| DomainError::out_of_range("delta"))?;
    }

    let mut planned = Vec::with_capacity(merged.len());
    for (material_id, delta) in merged {
        if delta == 0 {
            continue;
        }
        if delta < 0 {
            let material = catalog.material(material_id)?;
            stock_after(material_id, material.count_left, delta)?;
        }
        planned.push(StockChange { material_id, delta });
    }
    Ok(planned)
}
