pub mod azure_storage;
pub mod error;
pub mod local_storage;
pub mod s3_storage;

pub use azure_storage::AzureStorageBackend;
pub use error::{BackendError, BackendErrorKind};
pub use local_storage::LocalStorageBackend;
pub use s3_storage::{S3Settings, S3StorageBackend};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    application::{
        error::StorageError,
        services::storage_backend::{BackendFactory, StorageBackend},
    },
    domain::config::{credentials::ProviderCredentials, storage::ProviderSettings},
};

fn init_error(name: &str, error: BackendError) -> StorageError {
    StorageError::Configuration(format!("provider '{}' failed to initialize: {}", name, error))
}

/// Builds the backend described by `settings` and checks that it is usable:
/// local directories are created, S3 buckets and Azure containers are probed.
pub async fn create_storage_backend(
    name: &str,
    settings: &ProviderSettings,
    credentials: ProviderCredentials,
    folders: &[String],
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend: Arc<dyn StorageBackend> = match settings {
        ProviderSettings::Local { base_path } => {
            let backend = LocalStorageBackend::new(name, base_path.clone());
            backend
                .prepare(folders.iter().map(String::as_str))
                .await
                .map_err(|e| init_error(name, e))?;
            Arc::new(backend)
        }
        ProviderSettings::S3 {
            bucket,
            region,
            endpoint,
            force_path_style,
            prefix,
        } => {
            let ProviderCredentials::S3(credentials) = credentials else {
                return Err(StorageError::Configuration(format!(
                    "S3 credentials not found for provider '{}'",
                    name
                )));
            };
            let backend = S3StorageBackend::new(
                name,
                S3Settings {
                    bucket: bucket.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                    force_path_style: *force_path_style,
                    prefix: prefix.clone(),
                },
                credentials,
            );
            backend.health_check().await.map_err(|e| init_error(name, e))?;
            Arc::new(backend)
        }
        ProviderSettings::Azure {
            account,
            container,
            endpoint,
        } => {
            let ProviderCredentials::Azure(credentials) = credentials else {
                return Err(StorageError::Configuration(format!(
                    "Azure credentials not found for provider '{}'",
                    name
                )));
            };
            let backend =
                AzureStorageBackend::new(name, account, container, endpoint.as_deref(), credentials)
                    .map_err(|e| init_error(name, e))?;
            backend.health_check().await.map_err(|e| init_error(name, e))?;
            Arc::new(backend)
        }
    };

    info!(
        "Storage provider '{}' ({}) initialized",
        name,
        settings.provider_type()
    );
    Ok(backend)
}

/// Factory used in production: delegates to [`create_storage_backend`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn create_backend(
        &self,
        name: &str,
        settings: &ProviderSettings,
        credentials: ProviderCredentials,
        folders: &[String],
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        create_storage_backend(name, settings, credentials, folders).await
    }
}
