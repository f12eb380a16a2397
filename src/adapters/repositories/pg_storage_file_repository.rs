use async_trait::async_trait;
use sqlx::{query, query_as, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{
        dto::storage_file_dto::StorageFileDTO, error::StorageError,
        repositories::file_repository::StorageFileRepository,
    },
    domain::models::file::StorageFile,
};

pub struct PgStorageFileRepository {
    pool: sqlx::PgPool,
}

impl PgStorageFileRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageFileRepository for PgStorageFileRepository {
    async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError> {
        let query = r#"
            INSERT INTO storage.files (
                id, original_name, stored_filename, folder, relative_path,
                provider, provider_path, size, mime_type, description,
                uploaded_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
        "#;

        let created: StorageFileDTO = query_as::<_, StorageFileDTO>(query)
            .bind(file.id)
            .bind(&file.original_name)
            .bind(&file.stored_filename)
            .bind(&file.folder)
            .bind(&file.relative_path)
            .bind(&file.provider)
            .bind(&file.provider_path)
            .bind(std::cmp::min(file.size, i64::MAX as u64) as i64)
            .bind(&file.mime_type)
            .bind(&file.description)
            .bind(&file.uploaded_by)
            .bind(&file.updated_by)
            .bind(file.created_at)
            .bind(file.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(created.into())
    }

    async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        let query = "SELECT * FROM storage.files WHERE id = $1";

        let fetched: Option<StorageFileDTO> = query_as::<_, StorageFileDTO>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(fetched.map(Into::into))
    }

    async fn get_storage_files_by_folder(
        &self,
        folder: &str,
    ) -> Result<Vec<StorageFile>, StorageError> {
        let query = "SELECT * FROM storage.files WHERE folder = $1 ORDER BY created_at DESC";

        let rows: Vec<StorageFileDTO> = query_as::<_, StorageFileDTO>(query)
            .bind(folder)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_all_storage_files(&self) -> Result<Vec<StorageFile>, StorageError> {
        let query = "SELECT * FROM storage.files ORDER BY created_at DESC";

        let rows: Vec<StorageFileDTO> = query_as::<_, StorageFileDTO>(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_storage_file(
        &self,
        id: Uuid,
        update: StorageFileDTO,
    ) -> Result<Option<StorageFile>, StorageError> {
        let mut update = update;
        update.sanitize();

        if update.is_empty() {
            return self.get_storage_file_by_id(id).await;
        }

        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("UPDATE storage.files SET ");
        let mut separated = builder.separated(", ");

        if let Some(original_name) = &update.original_name {
            separated.push("original_name = ");
            separated.push_bind_unseparated(original_name);
        }
        if let Some(stored_filename) = &update.stored_filename {
            separated.push("stored_filename = ");
            separated.push_bind_unseparated(stored_filename);
        }
        if let Some(folder) = &update.folder {
            separated.push("folder = ");
            separated.push_bind_unseparated(folder);
        }
        if let Some(relative_path) = &update.relative_path {
            separated.push("relative_path = ");
            separated.push_bind_unseparated(relative_path);
        }
        if let Some(provider) = &update.provider {
            separated.push("provider = ");
            separated.push_bind_unseparated(provider);
        }
        if let Some(provider_path) = &update.provider_path {
            separated.push("provider_path = ");
            separated.push_bind_unseparated(provider_path);
        }
        if let Some(size) = update.size {
            separated.push("size = ");
            separated.push_bind_unseparated(size as i64);
        }
        if let Some(mime_type) = &update.mime_type {
            separated.push("mime_type = ");
            separated.push_bind_unseparated(mime_type);
        }
        if update.description.is_some() {
            separated.push("description = ");
            separated.push_bind_unseparated(&update.description);
        }
        if let Some(uploaded_by) = &update.uploaded_by {
            separated.push("uploaded_by = ");
            separated.push_bind_unseparated(uploaded_by);
        }
        if update.updated_by.is_some() {
            separated.push("updated_by = ");
            separated.push_bind_unseparated(&update.updated_by);
        }
        separated.push("updated_at = ");
        separated.push_bind_unseparated(update.updated_at.unwrap_or_else(chrono::Utc::now));

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING *");

        let updated = builder
            .build_query_as::<StorageFileDTO>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(updated.map(Into::into))
    }

    async fn delete_storage_file(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = query("DELETE FROM storage.files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!("Deleted {} row(s) for file {}", result.rows_affected(), id);
        Ok(result.rows_affected() > 0)
    }
}
