use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct S3Credentials {
    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "sessionToken", default)]
    pub session_token: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AzureCredentials {
    #[serde(rename = "sasToken")]
    pub sas_token: String,
}

/// Secret bundle for one provider type.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderCredentials {
    Local,
    S3(S3Credentials),
    Azure(AzureCredentials),
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderCredentials::Local => write!(f, "ProviderCredentials::Local"),
            ProviderCredentials::S3(creds) => f
                .debug_struct("ProviderCredentials::S3")
                .field("access_key_id", &creds.access_key_id)
                .field("secret_access_key", &"<redacted>")
                .field("session_token", &creds.session_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            ProviderCredentials::Azure(_) => f
                .debug_struct("ProviderCredentials::Azure")
                .field("sas_token", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = ProviderCredentials::S3(S3Credentials {
            access_key_id: "AKIA123".to_string(),
            secret_access_key: "top-secret".to_string(),
            session_token: None,
        });
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("AKIA123"));
        assert!(!rendered.contains("top-secret"));
    }
}
