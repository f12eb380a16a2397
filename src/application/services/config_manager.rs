use std::{
    path::{Component, Path},
    sync::RwLock,
};

use tracing::{info, warn};

use crate::{
    application::{dto::storage_config_dto::StorageConfigDTO, error::StorageError},
    domain::config::{
        size::parse_size,
        storage::{RetentionAction, StorageConfig, StorageFolder},
    },
};

pub const CONFIG_PATH_ENV: &str = "STORAGE_CONFIG_PATH";

/// Holds the active storage configuration. Every configuration that gets
/// stored here has passed [`StorageConfigManager::validate`].
#[derive(Debug)]
pub struct StorageConfigManager {
    config: RwLock<StorageConfig>,
}

impl StorageConfigManager {
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        Ok(Self {
            config: RwLock::new(Self::validate(config)?),
        })
    }

    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<StorageConfig, StorageError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            StorageError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: StorageConfig = serde_json::from_str(&raw).map_err(|e| {
            StorageError::Configuration(format!("invalid config in {}: {}", path.display(), e))
        })?;
        info!("Loaded storage configuration from {}", path.display());
        Ok(config)
    }

    /// Reads the file named by `STORAGE_CONFIG_PATH`, falling back to the
    /// default single local provider when the variable is unset.
    pub async fn load_from_env() -> Result<StorageConfig, StorageError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(path).await,
            Err(_) => {
                warn!(
                    "{} not set, using default local storage configuration",
                    CONFIG_PATH_ENV
                );
                Ok(StorageConfig::default())
            }
        }
    }

    pub fn current(&self) -> StorageConfig {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn folder(&self, name: &str) -> Option<StorageFolder> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .folders
            .get(name)
            .cloned()
    }

    /// Merges `update` into the current configuration and validates the
    /// result without storing it.
    pub fn preview(&self, update: StorageConfigDTO) -> Result<StorageConfig, StorageError> {
        let mut update = update;
        update.sanitize();
        let merged = update.apply_to(&self.current());
        Self::validate(merged)
    }

    pub fn replace(&self, config: StorageConfig) {
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = config;
    }

    /// Checks cross references and size strings, and normalizes allowed
    /// types to lowercase extensions without a dot.
    pub fn validate(config: StorageConfig) -> Result<StorageConfig, StorageError> {
        let mut config = config;
        let invalid = |msg: String| StorageError::Configuration(msg);

        if config.providers.is_empty() {
            return Err(invalid("at least one storage provider is required".to_string()));
        }
        if !config.providers.contains_key(&config.active_provider) {
            return Err(invalid(format!(
                "active provider '{}' is not configured",
                config.active_provider
            )));
        }
        for name in &config.failover_order {
            if !config.providers.contains_key(name) {
                return Err(invalid(format!(
                    "failover provider '{}' is not configured",
                    name
                )));
            }
        }

        let folder_names: Vec<String> = config.folders.keys().cloned().collect();
        for (name, folder) in config.folders.iter_mut() {
            if !is_safe_relative(&folder.path) {
                return Err(invalid(format!(
                    "folder '{}' has an invalid path '{}'",
                    name, folder.path
                )));
            }
            parse_size(&folder.max_size)
                .map_err(|e| invalid(format!("folder '{}' max_size: {}", name, e)))?;
            if let Some(quota) = &folder.quota {
                parse_size(quota).map_err(|e| invalid(format!("folder '{}' quota: {}", name, e)))?;
            }
            if folder.max_concurrency == Some(0) {
                return Err(invalid(format!(
                    "folder '{}' max_concurrency must be at least 1",
                    name
                )));
            }
            if folder.retention_action == RetentionAction::Archive && folder.retention_days.is_some()
            {
                match &folder.archive_folder {
                    Some(target) if target == name => {
                        return Err(invalid(format!(
                            "folder '{}' cannot archive into itself",
                            name
                        )))
                    }
                    Some(target) if folder_names.contains(target) => {}
                    Some(target) => {
                        return Err(invalid(format!(
                            "archive folder '{}' of folder '{}' is not configured",
                            target, name
                        )))
                    }
                    None => {
                        return Err(invalid(format!(
                            "folder '{}' archives expired files but has no archive_folder",
                            name
                        )))
                    }
                }
            }

            folder.allowed_types = folder
                .allowed_types
                .iter()
                .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }

        if let Some(limit) = &config.quotas.default_uploader_limit {
            parse_size(limit).map_err(|e| invalid(format!("default uploader quota: {}", e)))?;
        }
        for (user, limit) in &config.quotas.uploader_limits {
            parse_size(limit)
                .map_err(|e| invalid(format!("quota for uploader '{}': {}", user, e)))?;
        }

        let retry = &config.resilience.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1".to_string()));
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(invalid("retry.backoff_multiplier must be at least 1.0".to_string()));
        }
        if config.resilience.circuit_breaker.failure_threshold == 0 {
            return Err(invalid(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if config.resilience.max_concurrent_per_provider == 0 {
            return Err(invalid(
                "max_concurrent_per_provider must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }
}

fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
