use async_trait::async_trait;
use sqlx::query_as;
use tracing::{debug, info};

use crate::{
    adapters::dto::credentials_dto::CredentialsRow,
    application::{error::StorageError, repositories::credential_repository::CredentialManager},
    domain::config::{credentials::ProviderCredentials, storage::ProviderType},
};

/// Reads backend secrets from `config.storage_credentials`, one row per
/// provider type.
pub struct PgCredentialManager {
    pool: sqlx::PgPool,
}

impl PgCredentialManager {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialManager for PgCredentialManager {
    async fn get_credentials(
        &self,
        provider_type: ProviderType,
    ) -> Result<ProviderCredentials, StorageError> {
        if provider_type == ProviderType::Local {
            return Ok(ProviderCredentials::Local);
        }

        debug!("Fetching {} credentials from database", provider_type);
        let query = "SELECT * FROM config.storage_credentials WHERE provider_type = $1 LIMIT 1";
        let row: Option<CredentialsRow> = query_as::<_, CredentialsRow>(query)
            .bind(provider_type.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let credentials = row
            .and_then(|row| row.into_credentials(provider_type))
            .ok_or_else(|| {
                StorageError::Configuration(format!(
                    "no usable credentials stored for provider type '{}'",
                    provider_type
                ))
            })?;

        info!("Credentials loaded for provider type '{}'", provider_type);
        Ok(credentials)
    }
}
