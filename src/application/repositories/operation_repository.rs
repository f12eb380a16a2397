use async_trait::async_trait;

use crate::{application::error::StorageError, domain::models::operation::StorageOperation};

#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn record_operation(&self, operation: StorageOperation) -> Result<(), StorageError>;
    /// Newest first.
    async fn recent_operations(&self, limit: usize) -> Result<Vec<StorageOperation>, StorageError>;
}
