use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        dto::storage_file_dto::StorageFileDTO,
        error::StorageError,
        repositories::{
            file_repository::StorageFileRepository, operation_repository::OperationRepository,
        },
    },
    domain::{
        config::storage::{RetentionAction, StorageFolder},
        models::{
            file::StorageFile,
            operation::{OperationKind, StorageOperation},
        },
    },
    resilience::failover::{ProviderCandidate, StorageFailoverManager},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LifecycleAction {
    pub file_id: Uuid,
    pub folder: String,
    pub action: RetentionAction,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LifecycleReport {
    pub actions: Vec<LifecycleAction>,
}

impl LifecycleReport {
    pub fn expired(&self) -> usize {
        self.count(RetentionAction::Delete)
    }

    pub fn archived(&self) -> usize {
        self.count(RetentionAction::Archive)
    }

    fn count(&self, action: RetentionAction) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action == action && a.success)
            .count()
    }
}

/// Applies folder retention windows: rows older than `retention_days` are
/// deleted or moved into the folder's archive folder.
pub struct LifecycleManager {
    repository: Arc<dyn StorageFileRepository>,
    operations: Arc<dyn OperationRepository>,
}

impl LifecycleManager {
    pub fn new(
        repository: Arc<dyn StorageFileRepository>,
        operations: Arc<dyn OperationRepository>,
    ) -> Self {
        Self {
            repository,
            operations,
        }
    }

    pub async fn run(
        &self,
        folders: &HashMap<String, StorageFolder>,
        providers: &[ProviderCandidate],
        failover: &StorageFailoverManager,
        now: DateTime<Utc>,
    ) -> Result<LifecycleReport, StorageError> {
        let mut report = LifecycleReport::default();

        let mut names: Vec<&String> = folders.keys().collect();
        names.sort();

        for name in names {
            let folder = &folders[name];
            let Some(days) = folder.retention_days else {
                continue;
            };
            let cutoff = now - ChronoDuration::days(i64::from(days));

            let expired: Vec<StorageFile> = self
                .repository
                .get_storage_files_by_folder(name)
                .await?
                .into_iter()
                .filter(|f| f.created_at < cutoff)
                .collect();

            if expired.is_empty() {
                continue;
            }
            info!(
                "{} file(s) in folder '{}' passed the {} day retention window",
                expired.len(),
                name,
                days
            );

            for file in expired {
                let Some(candidate) = providers.iter().find(|p| p.name == file.provider) else {
                    warn!(
                        "Skipping retention for file {}: provider '{}' is not available",
                        file.id, file.provider
                    );
                    continue;
                };

                let (kind, result) = match folder.retention_action {
                    RetentionAction::Delete => (
                        OperationKind::Expire,
                        self.expire(&file, candidate, failover).await,
                    ),
                    RetentionAction::Archive => {
                        let target = folder
                            .archive_folder
                            .as_ref()
                            .and_then(|target| folders.get(target).map(|f| (target, f)));
                        match target {
                            Some((target_name, target_folder)) => (
                                OperationKind::Archive,
                                self.archive(&file, target_name, target_folder, candidate, failover)
                                    .await,
                            ),
                            None => (
                                OperationKind::Archive,
                                Err(StorageError::Configuration(format!(
                                    "folder '{}' has no usable archive folder",
                                    name
                                ))),
                            ),
                        }
                    }
                };

                let operation = StorageOperation::new(kind, &file.relative_path, None)
                    .with_metadata("fileId", file.id.to_string())
                    .with_metadata("provider", file.provider.clone())
                    .with_metadata("size", file.size);
                let operation = match &result {
                    Ok(()) => operation,
                    Err(e) => operation.failed(e),
                };
                if let Err(e) = self.operations.record_operation(operation).await {
                    warn!("Failed to record {} operation for {}: {}", kind, file.id, e);
                }

                report.actions.push(LifecycleAction {
                    file_id: file.id,
                    folder: name.clone(),
                    action: folder.retention_action,
                    success: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                });
            }
        }

        Ok(report)
    }

    async fn expire(
        &self,
        file: &StorageFile,
        candidate: &ProviderCandidate,
        failover: &StorageFailoverManager,
    ) -> Result<(), StorageError> {
        let locator = file.provider_path.clone();
        let deleted = failover
            .execute(
                OperationKind::Expire,
                &file.folder,
                std::slice::from_ref(candidate),
                |backend| {
                    let locator = locator.clone();
                    async move { backend.delete(&locator).await }
                },
            )
            .await;
        match deleted {
            Ok(_) => {}
            Err(e) if e.is_backend_not_found() => {}
            Err(e) => return Err(e),
        }

        self.repository.delete_storage_file(file.id).await?;
        info!("Expired file {} from folder '{}'", file.id, file.folder);
        Ok(())
    }

    /// Copies the object under the archive folder on the same provider,
    /// repoints the row, then removes the old object.
    async fn archive(
        &self,
        file: &StorageFile,
        target_name: &str,
        target: &StorageFolder,
        candidate: &ProviderCandidate,
        failover: &StorageFailoverManager,
    ) -> Result<(), StorageError> {
        let providers = std::slice::from_ref(candidate);
        let source = file.provider_path.clone();

        let content = failover
            .execute(OperationKind::Archive, &file.folder, providers, |backend| {
                let source = source.clone();
                async move { backend.get(&source).await }
            })
            .await?
            .value;

        let relative_path = format!("{}/{}", target.path.trim_end_matches('/'), file.stored_filename);
        let key = relative_path.clone();
        let mime_type = file.mime_type.clone();
        let new_locator = failover
            .execute(OperationKind::Archive, target_name, providers, |backend| {
                let key = key.clone();
                let content = content.clone();
                let mime_type = mime_type.clone();
                async move { backend.put(&key, content, &mime_type).await }
            })
            .await?
            .value;

        let update = StorageFileDTO::relocation(file.id, target_name, &relative_path, &new_locator);
        if self.repository.update_storage_file(file.id, update).await?.is_none() {
            return Err(StorageError::NotFound(format!("file {}", file.id)));
        }

        if new_locator != file.provider_path {
            let removed = failover
                .execute(OperationKind::Archive, &file.folder, providers, |backend| {
                    let source = source.clone();
                    async move { backend.delete(&source).await }
                })
                .await;
            if let Err(e) = removed {
                if !e.is_backend_not_found() {
                    warn!(
                        "Archived file {} but could not remove {}: {}",
                        file.id, file.provider_path, e
                    );
                }
            }
        }

        info!(
            "Archived file {} from '{}' to '{}'",
            file.id, file.folder, target_name
        );
        Ok(())
    }
}
