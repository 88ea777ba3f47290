//! Order state machine.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► InProgress ──► Ready ──┬──► Shipped ──► Completed
///    │            │            │     └──────────────► Completed
///    └────────────┴────────────┴──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order is being put together, lines can be replaced wholesale.
    #[default]
    Created,

    /// Materials have been deducted, the order is in production.
    InProgress,

    /// Production finished, awaiting pickup or shipment.
    Ready,

    /// Handed to a carrier.
    Shipped,

    /// Paid and delivered (terminal state).
    Completed,

    /// Order was canceled (terminal state).
    Canceled,
}

impl OrderStatus {
    /// Stored integer code. Code 1 is reserved and never produced.
    pub fn code(&self) -> i16 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::InProgress => 2,
            OrderStatus::Ready => 3,
            OrderStatus::Shipped => 4,
            OrderStatus::Completed => 5,
            OrderStatus::Canceled => 6,
        }
    }

    /// Parses a stored integer code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(OrderStatus::Created),
            2 => Ok(OrderStatus::InProgress),
            3 => Ok(OrderStatus::Ready),
            4 => Ok(OrderStatus::Shipped),
            5 => Ok(OrderStatus::Completed),
            6 => Ok(OrderStatus::Canceled),
            other => Err(DomainError::invalid_input(
                "status",
                format!("unknown order status code {other}"),
            )),
        }
    }

    /// Returns true if the full line set can be replaced in this state.
    pub fn can_set_lines(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if single lines and additional costs can change.
    pub fn can_modify_lines(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Created)
    }

    /// Returns true if a payment can be recorded in this state.
    pub fn can_accept_payment(&self) -> bool {
        matches!(
            self,
            OrderStatus::InProgress | OrderStatus::Ready | OrderStatus::Shipped
        )
    }

    pub fn can_adjust_usage(&self) -> bool {
        matches!(self, OrderStatus::InProgress)
    }

    pub fn can_mark_ready(&self) -> bool {
        matches!(self, OrderStatus::InProgress)
    }

    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Ready)
    }

    pub fn can_complete(&self) -> bool {
        matches!(self, OrderStatus::Ready | OrderStatus::Shipped)
    }

    /// Returns true if the order can be canceled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::InProgress | OrderStatus::Ready
        )
    }

    /// Returns true once materials have been deducted for the order.
    pub fn materials_deducted(&self) -> bool {
        !matches!(self, OrderStatus::Created | OrderStatus::Canceled)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Canceled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Ready => "READY",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
