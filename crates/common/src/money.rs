//! Money in minor currency units, plus the two boundary conversions.
//!
//! Inside the system every amount is an integer number of minor units
//! (tiyin, cents, ...). Conversion to and from major units happens only at
//! the HTTP boundary through [`to_minor`] and [`to_major`].

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of minor units in one major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// Money amount represented in minor units to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Multiplies by a quantity, `None` on overflow.
    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn saturating_sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }

    pub fn saturating_mul(self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }

    /// Sums the amounts, `None` as soon as the total leaves the `i64` range.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Integer division, truncating toward zero.
    pub fn halve(&self) -> Money {
        Money(self.0 / 2)
    }

    /// Divides by a count rounding half to even, the way a pack price is
    /// split into a per-unit price. Division by zero yields zero.
    pub fn split(&self, parts: u32) -> Money {
        if parts == 0 {
            return Money::zero();
        }
        let parts = i64::from(parts);
        let quotient = self.0 / parts;
        let remainder = (self.0 % parts).abs();
        let sign = if self.0 < 0 { -1 } else { 1 };
        let rounded = match (2 * remainder).cmp(&parts) {
            std::cmp::Ordering::Greater => quotient + sign,
            std::cmp::Ordering::Equal if quotient % 2 != 0 => quotient + sign,
            _ => quotient,
        };
        Money(rounded)
    }

    /// Returns the larger of the amount and zero.
    pub fn clamp_non_negative(&self) -> Money {
        Money(self.0.max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / per, abs % per)
    }
}

/// Errors converting a major-unit amount into [`Money`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount {0} does not fit into minor units")]
    OutOfRange(Decimal),
}

/// Converts a major-unit amount (e.g. `100.50`) into minor units.
///
/// Fractions of a minor unit are rounded half to even.
pub fn to_minor(major: Decimal) -> Result<Money, MoneyError> {
    let scaled = major
        .checked_mul(Decimal::from(MINOR_PER_MAJOR))
        .ok_or(MoneyError::OutOfRange(major))?;
    scaled
        .round()
        .to_i64()
        .map(Money::from_minor)
        .ok_or(MoneyError::OutOfRange(major))
}

/// Converts minor units back into a major-unit amount with two decimals.
pub fn to_major(money: Money) -> Decimal {
    Decimal::new(money.minor(), 2)
}
