//! Metric names and recording helpers.
//!
//! - `orders_confirmed_total` - Orders moved to IN_PROGRESS
//! - `orders_completed_total` - Orders moved to COMPLETED
//! - `orders_canceled_total` - Orders moved to CANCELED
//! - `stock_rejections_total` - Operations refused for lack of stock
//! - `payments_recorded_total` - Accepted payments
//! - `expenses_recorded_total` - Booked expenses
//! - `order_transition_seconds` - Load, transition and commit latency (by operation, outcome)

use std::time::Instant;

use metrics::{counter, histogram};

pub const ORDERS_CONFIRMED: &str = "orders_confirmed_total";
pub const ORDERS_COMPLETED: &str = "orders_completed_total";
pub const ORDERS_CANCELED: &str = "orders_canceled_total";
pub const STOCK_REJECTIONS: &str = "stock_rejections_total";
pub const PAYMENTS_RECORDED: &str = "payments_recorded_total";
pub const EXPENSES_RECORDED: &str = "expenses_recorded_total";
pub const ORDER_TRANSITION_SECONDS: &str = "order_transition_seconds";

pub(crate) fn record_transition(operation: &'static str, started: Instant, ok: bool) {
    histogram!(
        ORDER_TRANSITION_SECONDS,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .record(started.elapsed().as_secs_f64());
}

pub(crate) fn record_stock_rejection(operation: &'static str) {
    counter!(STOCK_REJECTIONS, "operation" => operation).increment(1);
}

/// Counts a successful lifecycle step, if it is one we track.
pub(crate) fn record_success(operation: &'static str) {
    let name = match operation {
        "confirm" => ORDERS_CONFIRMED,
        "complete" => ORDERS_COMPLETED,
        "cancel" => ORDERS_CANCELED,
        "record_payment" => PAYMENTS_RECORDED,
        _ => return,
    };
    counter!(name).increment(1);
}

pub(crate) fn record_expense() {
    counter!(EXPENSES_RECORDED).increment(1);
}
