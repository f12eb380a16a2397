use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderType {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "azure")]
    Azure,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Local => write!(f, "local"),
            ProviderType::S3 => write!(f, "s3"),
            ProviderType::Azure => write!(f, "azure"),
        }
    }
}

/// Connection settings for one physical backend. Secrets are not part of this
/// struct; they are resolved through the credential manager.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderSettings {
    Local {
        base_path: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        force_path_style: bool,
        #[serde(default)]
        prefix: Option<String>,
    },
    Azure {
        account: String,
        container: String,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::Local { .. } => ProviderType::Local,
            ProviderSettings::S3 { .. } => ProviderType::S3,
            ProviderSettings::Azure { .. } => ProviderType::Azure,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionAction {
    #[default]
    Delete,
    Archive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StorageFolder {
    pub path: String,
    /// Lowercase extensions without the leading dot. Empty means any type.
    #[serde(default)]
    pub allowed_types: Vec<String>,
    pub max_size: String,
    #[serde(default)]
    pub quota: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub retention_action: RetentionAction,
    #[serde(default)]
    pub archive_folder: Option<String>,
}

impl StorageFolder {
    pub fn new(path: impl Into<String>, allowed_types: &[&str], max_size: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allowed_types: allowed_types.iter().map(|t| t.to_string()).collect(),
            max_size: max_size.into(),
            quota: None,
            max_concurrency: None,
            retention_days: None,
            retention_action: RetentionAction::Delete,
            archive_folder: None,
        }
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        if self.allowed_types.is_empty() {
            return true;
        }
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        !extension.is_empty() && self.allowed_types.iter().any(|t| *t == extension)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            retryable_errors: vec![
                "RequestTimeout".to_string(),
                "SlowDown".to_string(),
                "ServerBusy".to_string(),
                "InternalError".to_string(),
                "OperationTimedOut".to_string(),
            ],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ResilienceSettings {
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub failover_enabled: bool,
    pub max_concurrent_per_provider: usize,
    pub queue_timeout_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            failover_enabled: true,
            max_concurrent_per_provider: 16,
            queue_timeout_ms: 30_000,
            attempt_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct QuotaSettings {
    pub default_uploader_limit: Option<String>,
    pub uploader_limits: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub redis_url: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
            redis_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    Delete,
    #[default]
    Report,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CleanupSettings {
    pub orphan_policy: OrphanPolicy,
    pub orphan_grace_secs: u64,
    /// Zero disables the background schedule.
    pub interval_secs: u64,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::Report,
            orphan_grace_secs: 3_600,
            interval_secs: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    pub providers: HashMap<String, ProviderSettings>,
    pub active_provider: String,
    #[serde(default)]
    pub failover_order: Vec<String>,
    pub folders: HashMap<String, StorageFolder>,
    #[serde(default)]
    pub resilience: ResilienceSettings,
    #[serde(default)]
    pub quotas: QuotaSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub cleanup: CleanupSettings,
}

impl StorageConfig {
    /// Active provider first, then the configured failover order, without
    /// duplicates.
    pub fn provider_priority(&self) -> Vec<String> {
        let mut order = vec![self.active_provider.clone()];
        for name in &self.failover_order {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
        order
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "local".to_string(),
            ProviderSettings::Local {
                base_path: PathBuf::from("./storage"),
            },
        );

        Self {
            providers,
            active_provider: "local".to_string(),
            failover_order: Vec::new(),
            folders: HashMap::new(),
            resilience: ResilienceSettings::default(),
            quotas: QuotaSettings::default(),
            cache: CacheSettings::default(),
            cleanup: CleanupSettings::default(),
        }
    }
}
