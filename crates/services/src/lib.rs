//! Service layer of the workshop CRM.
//!
//! Wraps a [`store::Store`] and runs every mutation as one
//! load -> transition -> commit cycle, with tracing spans and metrics.

pub mod catalog;
pub mod config;
pub mod error;
pub mod expenses;
pub mod orders;
pub mod telemetry;

pub use catalog::CatalogService;
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use expenses::ExpenseService;
pub use orders::OrderService;
