use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    application::{error::StorageError, repositories::credential_repository::CredentialManager},
    domain::config::{
        credentials::{AzureCredentials, ProviderCredentials, S3Credentials},
        storage::ProviderType,
    },
};

pub const S3_ACCESS_KEY_ID: &str = "STORAGE_S3_ACCESS_KEY_ID";
pub const S3_SECRET_ACCESS_KEY: &str = "STORAGE_S3_SECRET_ACCESS_KEY";
pub const S3_SESSION_TOKEN: &str = "STORAGE_S3_SESSION_TOKEN";
pub const AZURE_SAS_TOKEN: &str = "STORAGE_AZURE_SAS_TOKEN";

/// Credentials taken from environment variables, captured when the manager is
/// built.
pub struct EnvCredentialManager {
    vars: HashMap<String, String>,
}

impl EnvCredentialManager {
    pub fn from_env() -> Self {
        let vars = [S3_ACCESS_KEY_ID, S3_SECRET_ACCESS_KEY, S3_SESSION_TOKEN, AZURE_SAS_TOKEN]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { vars }
    }

    pub fn with_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str, provider_type: ProviderType) -> Result<String, StorageError> {
        self.var(key).ok_or_else(|| {
            StorageError::Configuration(format!(
                "{} must be set to use a {} provider",
                key, provider_type
            ))
        })
    }
}

#[async_trait]
impl CredentialManager for EnvCredentialManager {
    async fn get_credentials(
        &self,
        provider_type: ProviderType,
    ) -> Result<ProviderCredentials, StorageError> {
        debug!("Resolving {} credentials from environment", provider_type);
        match provider_type {
            ProviderType::Local => Ok(ProviderCredentials::Local),
            ProviderType::S3 => Ok(ProviderCredentials::S3(S3Credentials {
                access_key_id: self.required(S3_ACCESS_KEY_ID, provider_type)?,
                secret_access_key: self.required(S3_SECRET_ACCESS_KEY, provider_type)?,
                session_token: self.var(S3_SESSION_TOKEN),
            })),
            ProviderType::Azure => Ok(ProviderCredentials::Azure(AzureCredentials {
                sas_token: self.required(AZURE_SAS_TOKEN, provider_type)?,
            })),
        }
    }
}
