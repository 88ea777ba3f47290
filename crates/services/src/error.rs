use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A business rule rejected the operation, either in memory or when
    /// re-checked by the store under lock.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persistence failure or concurrent modification.
    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn is_insufficient_stock(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::InsufficientStock { .. })
        )
    }

    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::Store(StoreError::ConcurrencyConflict { .. })
        )
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(err) => ServiceError::Domain(err),
            other => ServiceError::Store(other),
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
