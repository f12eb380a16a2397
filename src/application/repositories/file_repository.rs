use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::{dto::storage_file_dto::StorageFileDTO, error::StorageError},
    domain::models::file::StorageFile,
};

#[async_trait]
pub trait StorageFileRepository: Send + Sync {
    async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError>;
    async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError>;
    async fn get_storage_files_by_folder(
        &self,
        folder: &str,
    ) -> Result<Vec<StorageFile>, StorageError>;
    async fn get_all_storage_files(&self) -> Result<Vec<StorageFile>, StorageError>;
    /// Returns `None` when no row has the given id.
    async fn update_storage_file(
        &self,
        id: Uuid,
        update: StorageFileDTO,
    ) -> Result<Option<StorageFile>, StorageError>;
    /// Returns whether a row was removed.
    async fn delete_storage_file(&self, id: Uuid) -> Result<bool, StorageError>;
}
