use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::application::error::{StorageError, ValidationError};

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            StorageError::Validation(ref e) => {
                warn!("Validation failed: {}", e);
                let status = match e {
                    ValidationError::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string())
            }
            StorageError::QuotaExceeded { ref scope, .. } => {
                warn!("Quota exceeded for {}", scope);
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    "Insufficient storage quota".to_string(),
                )
            }
            StorageError::NotFound(ref what) => {
                warn!("Resource not found: {}", what);
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            StorageError::Busy(ref msg) => {
                warn!("Storage busy: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage busy".to_string())
            }
            StorageError::ProviderUnavailable { .. } | StorageError::CircuitOpen(_) => {
                error!("{}", self);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Storage provider unavailable".to_string(),
                )
            }
            StorageError::Backend(ref e) => {
                error!("Storage backend error: {}", e);
                (StatusCode::BAD_GATEWAY, "Storage backend error".to_string())
            }
            StorageError::Configuration(ref msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            StorageError::Database(ref msg) => {
                error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            StorageError::Internal(ref msg) => {
                error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
