use thiserror::Error;

use crate::{resilience::retry::RetryClassify, services::error::BackendError};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("file type '{extension}' is not allowed in folder '{folder}'")]
    TypeNotAllowed { folder: String, extension: String },

    #[error("file size {size} exceeds the maximum of {max_size} bytes for folder '{folder}'")]
    SizeExceeded {
        folder: String,
        size: u64,
        max_size: u64,
    },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("no storage provider available (attempted: {}): {message}", attempted.join(", "))]
    ProviderUnavailable {
        message: String,
        attempted: Vec<String>,
    },

    #[error("quota exceeded for {scope}: {used} of {limit} bytes used, {requested} requested")]
    QuotaExceeded {
        scope: String,
        limit: u64,
        used: u64,
        requested: u64,
    },

    #[error("storage busy: {0}")]
    Busy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("circuit breaker open for provider '{0}'")]
    CircuitOpen(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    pub fn is_backend_not_found(&self) -> bool {
        matches!(self, StorageError::Backend(e) if e.is_not_found())
    }
}

impl RetryClassify for StorageError {
    fn retryable(&self) -> Option<bool> {
        match self {
            StorageError::Backend(e) => e.retryable_hint(),
            StorageError::Validation(_)
            | StorageError::QuotaExceeded { .. }
            | StorageError::NotFound(_)
            | StorageError::Configuration(_)
            | StorageError::CircuitOpen(_)
            | StorageError::ProviderUnavailable { .. }
            | StorageError::Busy(_) => Some(false),
            StorageError::Database(_) | StorageError::Internal(_) => None,
        }
    }

    fn code(&self) -> Option<&str> {
        match self {
            StorageError::Backend(e) => e.code.as_deref(),
            _ => None,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            StorageError::Backend(e) => e.status,
            _ => None,
        }
    }
}
