use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::config::storage::{
    CacheSettings, CleanupSettings, ProviderSettings, QuotaSettings, ResilienceSettings,
    StorageConfig, StorageFolder,
};

/// Partial configuration update. Present sections replace the corresponding
/// section of the current configuration as a whole; `folders` entries are
/// merged by name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfigDTO {
    pub providers: Option<HashMap<String, ProviderSettings>>,
    pub active_provider: Option<String>,
    pub failover_order: Option<Vec<String>>,
    pub folders: Option<HashMap<String, StorageFolder>>,
    pub resilience: Option<ResilienceSettings>,
    pub quotas: Option<QuotaSettings>,
    pub cache: Option<CacheSettings>,
    pub cleanup: Option<CleanupSettings>,
}

impl StorageConfigDTO {
    pub fn is_empty(&self) -> bool {
        self.providers.is_none()
            && self.active_provider.is_none()
            && self.failover_order.is_none()
            && self.folders.is_none()
            && self.resilience.is_none()
            && self.quotas.is_none()
            && self.cache.is_none()
            && self.cleanup.is_none()
    }

    pub fn sanitize(&mut self) {
        if let Some(active) = &self.active_provider {
            self.active_provider = Some(active.trim().to_string());
        }
        if let Some(order) = &mut self.failover_order {
            for name in order.iter_mut() {
                *name = name.trim().to_string();
            }
            order.retain(|name| !name.is_empty());
        }
    }

    pub fn apply_to(self, current: &StorageConfig) -> StorageConfig {
        let mut merged = current.clone();
        if let Some(providers) = self.providers {
            merged.providers = providers;
        }
        if let Some(active) = self.active_provider {
            merged.active_provider = active;
        }
        if let Some(order) = self.failover_order {
            merged.failover_order = order;
        }
        if let Some(folders) = self.folders {
            merged.folders.extend(folders);
        }
        if let Some(resilience) = self.resilience {
            merged.resilience = resilience;
        }
        if let Some(quotas) = self.quotas {
            merged.quotas = quotas;
        }
        if let Some(cache) = self.cache {
            merged.cache = cache;
        }
        if let Some(cleanup) = self.cleanup {
            merged.cleanup = cleanup;
        }
        merged
    }
}
