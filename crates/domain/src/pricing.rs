//! Quantity-based price tiers.

use common::{Money, PriceTierId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// A quantity range `[start, end]` (both inclusive) mapped to a unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub id: PriceTierId,
    pub start: u32,
    pub end: u32,
    pub price: Money,
    pub description: Option<String>,
}

impl PriceTier {
    /// Returns true if `quantity` falls inside the tier.
    pub fn contains(&self, quantity: u32) -> bool {
        self.start <= quantity && quantity <= self.end
    }

    fn overlaps(&self, other: &PriceTier) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Picks the unit price for `quantity`.
///
/// The first tier containing the quantity wins. Without a match the
/// cheapest tier applies, and a product without tiers costs nothing.
pub fn price_for(tiers: &[PriceTier], quantity: u32) -> Money {
    tiers
        .iter()
        .find(|tier| tier.contains(quantity))
        .or_else(|| tiers.iter().min_by_key(|tier| tier.price))
        .map(|tier| tier.price)
        .unwrap_or_default()
}

/// Checks a tier before it is stored next to `existing`.
///
/// A tier with the candidate's own id is ignored, so the same check covers
/// updates.
pub fn validate_tier(existing: &[PriceTier], candidate: &PriceTier) -> Result<()> {
    if candidate.start > candidate.end {
        return Err(DomainError::invalid_input(
            "price_tier",
            format!("start {} is greater than end {}", candidate.start, candidate.end),
        ));
    }
    if candidate.price.is_negative() {
        return Err(DomainError::invalid_input("price", "must not be negative"));
    }
    if let Some(clash) = existing
        .iter()
        .filter(|tier| tier.id != candidate.id)
        .find(|tier| tier.overlaps(candidate))
    {
        return Err(DomainError::invalid_input(
            "price_tier",
            format!(
                "range {}..={} overlaps existing tier {}..={}",
                candidate.start, candidate.end, clash.start, clash.end
            ),
        ));
    }
    Ok(())
}
