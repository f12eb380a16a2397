use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use tracing::{debug, warn};

use crate::{
    application::error::StorageError,
    domain::{
        config::{size::parse_size, storage::StorageConfig},
        models::quota::{Quota, QuotaScope},
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ScopeUsage {
    used: u64,
    reserved: u64,
}

type UsageMap = Arc<Mutex<HashMap<QuotaScope, ScopeUsage>>>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct QuotaLimits {
    folders: HashMap<String, u64>,
    uploaders: HashMap<String, u64>,
    default_uploader: Option<u64>,
}

impl QuotaLimits {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let parse = |value: &str, what: &str| {
            parse_size(value)
                .map_err(|e| StorageError::Configuration(format!("invalid quota for {}: {}", what, e)))
        };

        let mut limits = QuotaLimits::default();
        for (name, folder) in &config.folders {
            if let Some(quota) = &folder.quota {
                limits
                    .folders
                    .insert(name.clone(), parse(quota, &format!("folder '{}'", name))?);
            }
        }
        for (user, quota) in &config.quotas.uploader_limits {
            limits
                .uploaders
                .insert(user.clone(), parse(quota, &format!("uploader '{}'", user))?);
        }
        if let Some(default) = &config.quotas.default_uploader_limit {
            limits.default_uploader = Some(parse(default, "default uploader")?);
        }
        Ok(limits)
    }

    pub fn with_folder_limit(mut self, folder: &str, bytes: u64) -> Self {
        self.folders.insert(folder.to_string(), bytes);
        self
    }

    pub fn with_uploader_limit(mut self, uploader: &str, bytes: u64) -> Self {
        self.uploaders.insert(uploader.to_string(), bytes);
        self
    }

    pub fn limit_for(&self, scope: &QuotaScope) -> Option<u64> {
        match scope {
            QuotaScope::Folder(name) => self.folders.get(name).copied(),
            QuotaScope::Uploader(name) => self
                .uploaders
                .get(name)
                .copied()
                .or(self.default_uploader),
        }
    }
}

/// Bytes held for an in-flight upload. [`QuotaReservation::commit`] turns
/// them into usage; dropping the reservation gives them back.
#[must_use]
#[derive(Debug)]
pub struct QuotaReservation {
    usage: UsageMap,
    scopes: Vec<QuotaScope>,
    bytes: u64,
    settled: bool,
}

impl QuotaReservation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn commit(mut self) {
        self.settled = true;
        let mut usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        for scope in &self.scopes {
            let entry = usage.entry(scope.clone()).or_default();
            entry.reserved = entry.reserved.saturating_sub(self.bytes);
            entry.used = entry.used.saturating_add(self.bytes);
        }
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        for scope in &self.scopes {
            if let Some(entry) = usage.get_mut(scope) {
                entry.reserved = entry.reserved.saturating_sub(self.bytes);
            }
        }
        debug!("Released quota reservation of {} bytes", self.bytes);
    }
}

#[derive(Debug, Default)]
pub struct QuotaManager {
    limits: RwLock<QuotaLimits>,
    usage: UsageMap,
}

impl QuotaManager {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            limits: RwLock::new(limits),
            usage: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set_limits(&self, limits: QuotaLimits) {
        *self.limits.write().unwrap_or_else(|p| p.into_inner()) = limits;
    }

    /// Atomically checks every scope and reserves `bytes` in all of them, or
    /// reserves nothing.
    pub fn check_and_reserve(
        &self,
        scopes: &[QuotaScope],
        bytes: u64,
    ) -> Result<QuotaReservation, StorageError> {
        let limits = self.limits.read().unwrap_or_else(|p| p.into_inner());
        let mut usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());

        for scope in scopes {
            if let Some(limit) = limits.limit_for(scope) {
                let current = usage.get(scope).copied().unwrap_or_default();
                let committed = current.used.saturating_add(current.reserved);
                if committed.saturating_add(bytes) > limit {
                    warn!(
                        "Quota exceeded for {}: {} + {} > {}",
                        scope, committed, bytes, limit
                    );
                    return Err(StorageError::QuotaExceeded {
                        scope: scope.to_string(),
                        limit,
                        used: committed,
                        requested: bytes,
                    });
                }
            }
        }

        for scope in scopes {
            let entry = usage.entry(scope.clone()).or_default();
            entry.reserved = entry.reserved.saturating_add(bytes);
        }

        Ok(QuotaReservation {
            usage: self.usage.clone(),
            scopes: scopes.to_vec(),
            bytes,
            settled: false,
        })
    }

    /// Gives back bytes of a deleted file.
    pub fn release(&self, scopes: &[QuotaScope], bytes: u64) {
        let mut usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        for scope in scopes {
            if let Some(entry) = usage.get_mut(scope) {
                entry.used = entry.used.saturating_sub(bytes);
            }
        }
    }

    /// Replaces committed usage with measured totals. Outstanding
    /// reservations are kept.
    pub fn seed_usage(&self, totals: impl IntoIterator<Item = (QuotaScope, u64)>) {
        let mut usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        for entry in usage.values_mut() {
            entry.used = 0;
        }
        for (scope, bytes) in totals {
            usage.entry(scope).or_default().used = bytes;
        }
    }

    pub fn quota(&self, scope: &QuotaScope) -> Quota {
        let limits = self.limits.read().unwrap_or_else(|p| p.into_inner());
        let usage = self.usage.lock().unwrap_or_else(|p| p.into_inner());
        Quota {
            scope: scope.clone(),
            limit_bytes: limits.limit_for(scope),
            used_bytes: usage.get(scope).map(|u| u.used).unwrap_or(0),
        }
    }

    pub fn quotas(&self) -> Vec<Quota> {
        let scopes: Vec<QuotaScope> = self
            .usage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        let mut quotas: Vec<Quota> = scopes.iter().map(|scope| self.quota(scope)).collect();
        quotas.sort_by_key(|q| q.scope.to_string());
        quotas
    }
}
