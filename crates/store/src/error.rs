use common::Version;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order or catalog entry changed since it was loaded.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A business rule checked under lock failed (missing row, stock
    /// shortfall, row still referenced).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A stored row could not be turned back into a domain value.
    #[error("Invalid {table} row: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn concurrency_conflict(
        entity: &'static str,
        id: impl ToString,
        expected: Version,
        actual: Version,
    ) -> Self {
        StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected,
            actual,
        }
    }

    pub(crate) fn invalid_row(table: &'static str, reason: impl ToString) -> Self {
        StoreError::InvalidRow {
            table,
            reason: reason.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
