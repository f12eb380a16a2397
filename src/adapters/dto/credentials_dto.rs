use sqlx::{postgres::PgRow, FromRow, Row};

use crate::domain::config::{
    credentials::{AzureCredentials, ProviderCredentials, S3Credentials},
    storage::ProviderType,
};

/// One row of `config.storage_credentials`. Columns that do not apply to the
/// provider type are null.
#[derive(Debug)]
pub struct CredentialsRow {
    pub provider_type: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub sas_token: Option<String>,
}

impl FromRow<'_, PgRow> for CredentialsRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(CredentialsRow {
            provider_type: row.try_get("provider_type")?,
            access_key_id: row.try_get("access_key_id")?,
            secret_access_key: row.try_get("secret_access_key")?,
            session_token: row.try_get("session_token")?,
            sas_token: row.try_get("sas_token")?,
        })
    }
}

impl CredentialsRow {
    pub fn sanitize(&mut self) {
        for value in [
            &mut self.access_key_id,
            &mut self.secret_access_key,
            &mut self.session_token,
            &mut self.sas_token,
        ] {
            if let Some(v) = value {
                *v = v.trim().to_string();
            }
            if value.as_deref() == Some("") {
                *value = None;
            }
        }
    }

    /// `None` when a column required by the provider type is missing.
    pub fn into_credentials(mut self, provider_type: ProviderType) -> Option<ProviderCredentials> {
        self.sanitize();
        match provider_type {
            ProviderType::Local => Some(ProviderCredentials::Local),
            ProviderType::S3 => Some(ProviderCredentials::S3(S3Credentials {
                access_key_id: self.access_key_id?,
                secret_access_key: self.secret_access_key?,
                session_token: self.session_token,
            })),
            ProviderType::Azure => Some(ProviderCredentials::Azure(AzureCredentials {
                sas_token: self.sas_token?,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CredentialsRow {
        CredentialsRow {
            provider_type: "s3".to_string(),
            access_key_id: Some(" AKIA ".to_string()),
            secret_access_key: Some("secret".to_string()),
            session_token: Some("".to_string()),
            sas_token: None,
        }
    }

    #[test]
    fn test_s3_row_converts() {
        match row().into_credentials(ProviderType::S3) {
            Some(ProviderCredentials::S3(creds)) => {
                assert_eq!(creds.access_key_id, "AKIA");
                assert_eq!(creds.session_token, None);
            }
            other => panic!("unexpected credentials: {:?}", other),
        }
    }

    #[test]
    fn test_missing_column_yields_none() {
        assert!(row().into_credentials(ProviderType::Azure).is_none());
    }
}
