//! Order aggregate, its line management and lifecycle.

mod aggregate;
mod lifecycle;
mod state;

pub use aggregate::{
    AdditionalCost, LineRequest, MaterialUsage, NewOrder, Order, OrderLine, Transition,
    UsageAdjustment, order_total,
};
pub use lifecycle::CancellationPolicy;
pub use state::OrderStatus;
