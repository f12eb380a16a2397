use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    application::{error::StorageError, repositories::file_repository::StorageFileRepository},
    domain::models::{file::StorageFile, quota::QuotaScope},
};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct UsageSummary {
    pub file_count: u64,
    pub total_bytes: u64,
}

impl UsageSummary {
    fn add(&mut self, size: u64) {
        self.file_count += 1;
        self.total_bytes = self.total_bytes.saturating_add(size);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub generated_at: DateTime<Utc>,
    pub total: UsageSummary,
    pub folders: BTreeMap<String, UsageSummary>,
    pub uploaders: BTreeMap<String, UsageSummary>,
    pub providers: BTreeMap<String, UsageSummary>,
}

impl UsageReport {
    pub fn from_files<'a>(files: impl IntoIterator<Item = &'a StorageFile>) -> Self {
        let mut report = UsageReport {
            generated_at: Utc::now(),
            total: UsageSummary::default(),
            folders: BTreeMap::new(),
            uploaders: BTreeMap::new(),
            providers: BTreeMap::new(),
        };
        for file in files {
            report.total.add(file.size);
            report.folders.entry(file.folder.clone()).or_default().add(file.size);
            report
                .uploaders
                .entry(file.uploaded_by.clone())
                .or_default()
                .add(file.size);
            report
                .providers
                .entry(file.provider.clone())
                .or_default()
                .add(file.size);
        }
        report
    }

    /// Byte totals per quota scope, used to seed the quota counters.
    pub fn quota_totals(&self) -> Vec<(QuotaScope, u64)> {
        self.folders
            .iter()
            .map(|(name, usage)| (QuotaScope::Folder(name.clone()), usage.total_bytes))
            .chain(
                self.uploaders
                    .iter()
                    .map(|(name, usage)| (QuotaScope::Uploader(name.clone()), usage.total_bytes)),
            )
            .collect()
    }
}

pub struct UsageReporter {
    repository: Arc<dyn StorageFileRepository>,
}

impl UsageReporter {
    pub fn new(repository: Arc<dyn StorageFileRepository>) -> Self {
        Self { repository }
    }

    pub async fn report(&self) -> Result<UsageReport, StorageError> {
        let files = self.repository.get_all_storage_files().await?;
        Ok(UsageReport::from_files(&files))
    }
}
