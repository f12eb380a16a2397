use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::{
        dto::storage_file_dto::StorageFileDTO,
        error::StorageError,
        repositories::{
            file_repository::StorageFileRepository, operation_repository::OperationRepository,
        },
    },
    domain::models::{file::StorageFile, operation::StorageOperation},
};

/// File rows kept in process memory. Used when no database is configured.
#[derive(Default)]
pub struct InMemoryStorageFileRepository {
    files: Mutex<HashMap<Uuid, StorageFile>>,
}

impl InMemoryStorageFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first(mut files: Vec<StorageFile>) -> Vec<StorageFile> {
    files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    files
}

#[async_trait]
impl StorageFileRepository for InMemoryStorageFileRepository {
    async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError> {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        if files.contains_key(&file.id) {
            return Err(StorageError::Database(format!(
                "duplicate key value violates unique constraint: id {}",
                file.id
            )));
        }
        files.insert(file.id, file.clone());
        Ok(file)
    }

    async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        Ok(files.get(&id).cloned())
    }

    async fn get_storage_files_by_folder(
        &self,
        folder: &str,
    ) -> Result<Vec<StorageFile>, StorageError> {
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        Ok(newest_first(
            files.values().filter(|f| f.folder == folder).cloned().collect(),
        ))
    }

    async fn get_all_storage_files(&self) -> Result<Vec<StorageFile>, StorageError> {
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        Ok(newest_first(files.values().cloned().collect()))
    }

    async fn update_storage_file(
        &self,
        id: Uuid,
        update: StorageFileDTO,
    ) -> Result<Option<StorageFile>, StorageError> {
        let mut update = update;
        update.sanitize();

        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let Some(current) = files.get(&id).cloned() else {
            return Ok(None);
        };
        if update.is_empty() {
            return Ok(Some(current));
        }
        let updated = update.merge_into(current);
        files.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete_storage_file(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        Ok(files.remove(&id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryOperationRepository {
    operations: Mutex<Vec<StorageOperation>>,
}

impl InMemoryOperationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<StorageOperation> {
        self.operations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn record_operation(&self, operation: StorageOperation) -> Result<(), StorageError> {
        self.operations
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(operation);
        Ok(())
    }

    async fn recent_operations(&self, limit: usize) -> Result<Vec<StorageOperation>, StorageError> {
        let operations = self.operations.lock().unwrap_or_else(|p| p.into_inner());
        Ok(operations.iter().rev().take(limit).cloned().collect())
    }
}
