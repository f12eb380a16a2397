use async_trait::async_trait;
use sqlx::{query, query_as};

use crate::{
    application::{error::StorageError, repositories::operation_repository::OperationRepository},
    domain::models::operation::StorageOperation,
};

pub struct PgOperationRepository {
    pool: sqlx::PgPool,
}

impl PgOperationRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationRepository for PgOperationRepository {
    async fn record_operation(&self, operation: StorageOperation) -> Result<(), StorageError> {
        let query_str = r#"
            INSERT INTO storage.operations (
                id, kind, path, user_id, timestamp, success, error, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#;

        query(query_str)
            .bind(operation.id)
            .bind(operation.kind.as_str())
            .bind(&operation.path)
            .bind(&operation.user_id)
            .bind(operation.timestamp)
            .bind(operation.success)
            .bind(&operation.error)
            .bind(&operation.metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn recent_operations(&self, limit: usize) -> Result<Vec<StorageOperation>, StorageError> {
        let query_str = "SELECT * FROM storage.operations ORDER BY timestamp DESC LIMIT $1";

        query_as::<_, StorageOperation>(query_str)
            .bind(std::cmp::min(limit, i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}
