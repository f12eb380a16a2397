use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
    application::error::StorageError,
    domain::config::{
        credentials::ProviderCredentials,
        storage::{ProviderSettings, ProviderType},
    },
    services::error::BackendError,
};

/// One object as seen by a backend listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendObject {
    pub locator: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Physical storage surface. `put` returns the backend-specific locator that
/// every later call takes.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn name(&self) -> &str;
    fn provider_type(&self) -> ProviderType;
    async fn put(&self, key: &str, content: Bytes, mime_type: &str) -> Result<String, BackendError>;
    async fn get(&self, locator: &str) -> Result<Bytes, BackendError>;
    async fn delete(&self, locator: &str) -> Result<(), BackendError>;
    async fn exists(&self, locator: &str) -> Result<bool, BackendError>;
    /// Objects whose key starts with `prefix` (a folder path).
    async fn list(&self, prefix: &str) -> Result<Vec<BackendObject>, BackendError>;
    /// Cheap connectivity probe.
    async fn health_check(&self) -> Result<(), BackendError>;
}

/// Builds and probes the backend for one configured provider.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// `folders` are the folder paths the backend will serve; backends that
    /// need per-folder setup (directories) create them here.
    async fn create_backend(
        &self,
        name: &str,
        settings: &ProviderSettings,
        credentials: ProviderCredentials,
        folders: &[String],
    ) -> Result<Arc<dyn StorageBackend>, StorageError>;
}
