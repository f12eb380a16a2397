use async_trait::async_trait;

use crate::{
    application::error::StorageError,
    domain::config::{credentials::ProviderCredentials, storage::ProviderType},
};

/// Source of backend secrets. A missing secret for a provider type is a
/// [`StorageError::Configuration`].
#[async_trait]
pub trait CredentialManager: Send + Sync {
    async fn get_credentials(
        &self,
        provider_type: ProviderType,
    ) -> Result<ProviderCredentials, StorageError>;
}
