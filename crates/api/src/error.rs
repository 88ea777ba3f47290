//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{MoneyError, to_major};
use domain::DomainError;
use serde_json::{Map, Value, json};
use services::ServiceError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or body value.
    BadRequest(String),
    /// Business or persistence failure from the service layer.
    Service(ServiceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Service(ServiceError::Domain(err)) => domain_error_to_response(err),
            ApiError::Service(ServiceError::Store(err)) => store_error_to_response(err),
        };
        (status, axum::Json(Value::Object(body))).into_response()
    }
}

fn error_body(message: impl Into<String>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("error".to_string(), Value::String(message.into()));
    body
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, Map<String, Value>) {
    let mut body = error_body(err.to_string());
    let status = match &err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Conflict { .. } | DomainError::InvalidState { .. } => StatusCode::CONFLICT,
        DomainError::InsufficientStock {
            material,
            needed,
            available,
        } => {
            body.insert("material_id".to_string(), json!(material));
            body.insert("needed".to_string(), json!(needed));
            body.insert("available".to_string(), json!(available));
            StatusCode::CONFLICT
        }
        DomainError::Unpaid { remains } => {
            body.insert("remains".to_string(), json!(to_major(*remains)));
            StatusCode::PAYMENT_REQUIRED
        }
        DomainError::Overpayment { remains, .. } => {
            body.insert("remains".to_string(), json!(to_major(*remains)));
            StatusCode::BAD_REQUEST
        }
        DomainError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, body)
}

fn store_error_to_response(err: StoreError) -> (StatusCode, Map<String, Value>) {
    match err {
        StoreError::ConcurrencyConflict { .. } => {
            (StatusCode::CONFLICT, error_body(err.to_string()))
        }
        StoreError::Domain(err) => domain_error_to_response(err),
        other => {
            tracing::error!(error = %other, "internal server error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal server error"),
            )
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<MoneyError> for ApiError {
    fn from(err: MoneyError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
