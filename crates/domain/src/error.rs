//! Domain error types.

use common::{MaterialId, Money};
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors produced by the business rules.
///
/// Every variant carries enough detail (ids, states, amounts) for a caller
/// to render an actionable message. None of them is ever corrected silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A referenced entity does not exist (or does not belong to the order).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation would break a uniqueness or consistency rule.
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// The order is not in a state that allows the operation.
    #[error("Invalid state transition: cannot {attempted} from {current} state")]
    InvalidState {
        current: OrderStatus,
        attempted: &'static str,
    },

    /// Not enough stock of a material.
    #[error("Insufficient stock of material {material}: needed {needed}, available {available}")]
    InsufficientStock {
        material: MaterialId,
        needed: i64,
        available: i64,
    },

    /// The order cannot be completed before it is fully paid.
    #[error("Order is not fully paid, remains {remains}")]
    Unpaid { remains: Money },

    /// A payment larger than the outstanding amount.
    #[error("Payment {payment} exceeds the remaining amount {remains}")]
    Overpayment { remains: Money, payment: Money },

    /// Rejected input value.
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        DomainError::Conflict {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        DomainError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// An amount or count that arithmetic on it would overflow.
    pub fn out_of_range(field: &'static str) -> Self {
        Self::invalid_input(field, "value is out of range")
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;
