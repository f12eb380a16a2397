use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        error::StorageError,
        repositories::{
            file_repository::StorageFileRepository, operation_repository::OperationRepository,
        },
    },
    domain::{
        config::storage::{OrphanPolicy, StorageFolder},
        models::operation::{OperationKind, StorageOperation},
    },
    resilience::failover::{ProviderCandidate, StorageFailoverManager},
};

/// Backend object with no metadata row.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrphanObject {
    pub provider: String,
    pub folder: String,
    pub locator: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Metadata row whose backend object is gone.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DanglingRecord {
    pub file_id: Uuid,
    pub provider: String,
    pub folder: String,
    pub provider_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub policy: OrphanPolicy,
    pub started_at: DateTime<Utc>,
    pub orphans: Vec<OrphanObject>,
    pub dangling: Vec<DanglingRecord>,
    pub removed_orphans: usize,
    pub removed_dangling: usize,
    pub errors: Vec<String>,
}

impl CleanupReport {
    fn new(policy: OrphanPolicy) -> Self {
        Self {
            policy,
            started_at: Utc::now(),
            orphans: Vec::new(),
            dangling: Vec::new(),
            removed_orphans: 0,
            removed_dangling: 0,
            errors: Vec::new(),
        }
    }
}

/// Reconciles backend listings with metadata rows in both directions.
pub struct OrphanedFileCleaner {
    repository: Arc<dyn StorageFileRepository>,
    operations: Arc<dyn OperationRepository>,
    policy: OrphanPolicy,
    grace: ChronoDuration,
}

impl OrphanedFileCleaner {
    pub fn new(
        repository: Arc<dyn StorageFileRepository>,
        operations: Arc<dyn OperationRepository>,
        policy: OrphanPolicy,
        grace: std::time::Duration,
    ) -> Self {
        Self {
            repository,
            operations,
            policy,
            grace: ChronoDuration::from_std(grace).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    pub async fn run(
        &self,
        folders: &HashMap<String, StorageFolder>,
        providers: &[ProviderCandidate],
        failover: &StorageFailoverManager,
    ) -> Result<CleanupReport, StorageError> {
        let mut report = CleanupReport::new(self.policy);
        let cutoff = report.started_at - self.grace;

        let rows = self.repository.get_all_storage_files().await?;
        let known: HashSet<(&str, &str)> = rows
            .iter()
            .map(|f| (f.provider.as_str(), f.provider_path.as_str()))
            .collect();

        let mut folder_names: Vec<&String> = folders.keys().collect();
        folder_names.sort();

        for name in folder_names {
            let folder = &folders[name];
            for provider in providers {
                let objects = match provider.backend.list(&folder.path).await {
                    Ok(objects) => objects,
                    Err(e) => {
                        warn!(
                            "Cannot list folder '{}' on provider '{}': {}",
                            name, provider.name, e
                        );
                        report
                            .errors
                            .push(format!("list {} on {}: {}", name, provider.name, e));
                        continue;
                    }
                };

                let listed: HashSet<&str> = objects.iter().map(|o| o.locator.as_str()).collect();

                for object in &objects {
                    if known.contains(&(provider.name.as_str(), object.locator.as_str())) {
                        continue;
                    }
                    if object.last_modified.is_some_and(|modified| modified > cutoff) {
                        continue;
                    }
                    report.orphans.push(OrphanObject {
                        provider: provider.name.clone(),
                        folder: name.clone(),
                        locator: object.locator.clone(),
                        size: object.size,
                        last_modified: object.last_modified,
                    });
                }

                for row in rows
                    .iter()
                    .filter(|f| f.folder == *name && f.provider == provider.name)
                {
                    if !listed.contains(row.provider_path.as_str()) {
                        report.dangling.push(DanglingRecord {
                            file_id: row.id,
                            provider: row.provider.clone(),
                            folder: row.folder.clone(),
                            provider_path: row.provider_path.clone(),
                        });
                    }
                }
            }
        }

        info!(
            "Cleanup found {} orphaned object(s) and {} dangling record(s)",
            report.orphans.len(),
            report.dangling.len()
        );

        if self.policy == OrphanPolicy::Delete {
            self.remove(&mut report, providers, failover).await;
        }

        let summary = StorageOperation::new(OperationKind::OrphanCleanup, "*", None)
            .with_metadata("policy", format!("{:?}", self.policy).to_lowercase())
            .with_metadata("orphans", report.orphans.len())
            .with_metadata("dangling", report.dangling.len())
            .with_metadata("removedOrphans", report.removed_orphans)
            .with_metadata("removedDangling", report.removed_dangling);
        let summary = if report.errors.is_empty() {
            summary
        } else {
            summary.failed(report.errors.join("; "))
        };
        if let Err(e) = self.operations.record_operation(summary).await {
            warn!("Failed to record cleanup operation: {}", e);
        }

        Ok(report)
    }

    async fn remove(
        &self,
        report: &mut CleanupReport,
        providers: &[ProviderCandidate],
        failover: &StorageFailoverManager,
    ) {
        for orphan in &report.orphans {
            let Some(candidate) = providers.iter().find(|p| p.name == orphan.provider) else {
                continue;
            };
            let locator = orphan.locator.clone();
            let result = failover
                .execute(
                    OperationKind::OrphanCleanup,
                    &orphan.folder,
                    std::slice::from_ref(candidate),
                    |backend| {
                        let locator = locator.clone();
                        async move { backend.delete(&locator).await }
                    },
                )
                .await;
            match result {
                Ok(_) => report.removed_orphans += 1,
                Err(e) if e.is_backend_not_found() => report.removed_orphans += 1,
                Err(e) => report
                    .errors
                    .push(format!("delete orphan {}: {}", orphan.locator, e)),
            }
        }

        for record in &report.dangling {
            match self.repository.delete_storage_file(record.file_id).await {
                Ok(_) => report.removed_dangling += 1,
                Err(e) => report
                    .errors
                    .push(format!("delete record {}: {}", record.file_id, e)),
            }
        }
    }
}
