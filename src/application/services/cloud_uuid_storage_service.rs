use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, Weak},
    time::Duration,
};

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        dto::{storage_config_dto::StorageConfigDTO, storage_file_dto::StorageFileDTO},
        error::{StorageError, ValidationError},
        repositories::{
            credential_repository::CredentialManager, file_repository::StorageFileRepository,
            operation_repository::OperationRepository,
        },
        services::{
            config_manager::StorageConfigManager,
            health_checker::{HealthReport, StorageHealthChecker},
            idempotency::{Claim, IdempotencyClaim, IdempotencyRegistry},
            lifecycle_manager::{LifecycleManager, LifecycleReport},
            metadata_cache::{
                CacheStats, InMemoryMetadataCache, MetadataCache, StorageMetadataCacheAdapter,
            },
            metrics_collector::{MetricEntry, MetricsCollector},
            orphan_cleaner::{CleanupReport, OrphanedFileCleaner},
            quota_manager::{QuotaLimits, QuotaManager},
            storage_backend::{BackendFactory, StorageBackend},
            usage_reporter::{UsageReport, UsageReporter},
        },
    },
    domain::{
        config::{
            size::parse_size,
            storage::{ProviderSettings, StorageConfig, StorageFolder},
        },
        models::{
            file::{FileUpdate, StorageFile, UploadRequest, UploadResult},
            operation::{OperationKind, StorageOperation},
            quota::{Quota, QuotaScope},
        },
    },
    resilience::{
        circuit_breaker::{CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerState},
        concurrency::{folder_key, provider_key, ConcurrencyLimiter},
        failover::{ProviderCandidate, StorageFailoverManager},
        retry::{RetryConfig, RetryManager},
    },
};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators the storage service is built from.
pub struct StorageDependencies {
    pub files: Arc<dyn StorageFileRepository>,
    pub operations: Arc<dyn OperationRepository>,
    pub credentials: Arc<dyn CredentialManager>,
    pub backends: Arc<dyn BackendFactory>,
    /// Shared cache (e.g. Redis). When unset and caching is enabled, an
    /// in-process TTL map is used.
    pub cache: Option<Arc<dyn MetadataCache>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageMetricsReport {
    pub operations: Vec<MetricEntry>,
    pub circuits: Vec<CircuitBreakerState>,
    pub quotas: Vec<Quota>,
    #[serde(rename = "inFlight")]
    pub in_flight: BTreeMap<String, usize>,
    pub cache: Option<CacheStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub lifecycle: LifecycleReport,
    pub cleanup: CleanupReport,
}

/// Backends and resilience stack built from one configuration snapshot.
/// Swapped as a whole when the configuration changes.
struct StorageRuntime {
    config: StorageConfig,
    active_provider: String,
    /// Every initialized provider, priority order first.
    providers: Vec<ProviderCandidate>,
    /// Initialized providers eligible for writes: active first, then the
    /// failover order.
    write_order: Vec<ProviderCandidate>,
    failover: StorageFailoverManager,
    health: StorageHealthChecker,
}

impl StorageRuntime {
    fn provider(&self, name: &str) -> Result<&ProviderCandidate, StorageError> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StorageError::ProviderUnavailable {
                message: format!("provider '{}' is not initialized", name),
                attempted: Vec::new(),
            })
    }

    fn folder(&self, name: &str) -> Result<&StorageFolder, StorageError> {
        self.config
            .folders
            .get(name)
            .ok_or_else(|| StorageError::NotFound(format!("folder '{}'", name)))
    }
}

/// File-lifecycle API over a set of storage providers. Uploads get a fresh
/// UUID and are written through the failover stack; metadata lives in the
/// file repository and every mutating call leaves an audit record.
pub struct CloudUuidStorageService {
    config: StorageConfigManager,
    backend_factory: Arc<dyn BackendFactory>,
    credentials: Arc<dyn CredentialManager>,
    files: Arc<dyn StorageFileRepository>,
    cache: Option<Arc<StorageMetadataCacheAdapter>>,
    operations: Arc<dyn OperationRepository>,
    metrics: Arc<MetricsCollector>,
    quota: QuotaManager,
    usage: UsageReporter,
    lifecycle: LifecycleManager,
    runtime: RwLock<Option<Arc<StorageRuntime>>>,
    reload: tokio::sync::Mutex<()>,
    /// Held shared while a row change and its quota update happen together,
    /// exclusively while counters are reseeded from the rows.
    quota_gate: tokio::sync::RwLock<()>,
    idempotency: IdempotencyRegistry,
}

impl CloudUuidStorageService {
    pub fn new(config: StorageConfig, deps: StorageDependencies) -> Result<Self, StorageError> {
        let config = StorageConfigManager::new(config)?;
        let current = config.current();
        let quota = QuotaManager::new(QuotaLimits::from_config(&current)?);

        let cache: Option<Arc<dyn MetadataCache>> = match deps.cache {
            Some(cache) => Some(cache),
            None if current.cache.enabled => Some(Arc::new(InMemoryMetadataCache::new(
                Duration::from_secs(current.cache.ttl_secs),
                current.cache.max_entries,
            ))),
            None => None,
        };
        let cache = cache.map(|cache| {
            Arc::new(StorageMetadataCacheAdapter::new(deps.files.clone(), cache))
        });
        let files: Arc<dyn StorageFileRepository> = match &cache {
            Some(adapter) => adapter.clone() as Arc<dyn StorageFileRepository>,
            None => deps.files,
        };

        Ok(Self {
            config,
            backend_factory: deps.backends,
            credentials: deps.credentials,
            usage: UsageReporter::new(files.clone()),
            lifecycle: LifecycleManager::new(files.clone(), deps.operations.clone()),
            files,
            cache,
            operations: deps.operations,
            metrics: Arc::new(MetricsCollector::new()),
            quota,
            runtime: RwLock::new(None),
            reload: tokio::sync::Mutex::new(()),
            quota_gate: tokio::sync::RwLock::new(()),
            idempotency: IdempotencyRegistry::default(),
        })
    }

    /// Builds every configured backend and seeds the quota counters. A
    /// failing active provider is fatal; failing secondary providers are left
    /// out of failover.
    pub async fn initialize(&self) -> Result<(), StorageError> {
        let _guard = self.reload.lock().await;
        let config = self.config.current();
        self.quota.set_limits(QuotaLimits::from_config(&config)?);
        let runtime = self.build_runtime(config).await?;
        self.install(runtime);
        self.refresh_quota_usage().await
    }

    async fn build_runtime(&self, config: StorageConfig) -> Result<StorageRuntime, StorageError> {
        let folder_paths: Vec<String> = config.folders.values().map(|f| f.path.clone()).collect();
        let priority = config.provider_priority();

        let mut names = priority.clone();
        let mut others: Vec<&String> = config
            .providers
            .keys()
            .filter(|name| !priority.contains(name))
            .collect();
        others.sort();
        names.extend(others.into_iter().cloned());

        let mut providers = Vec::with_capacity(names.len());
        for name in names {
            let Some(settings) = config.providers.get(&name) else {
                continue;
            };
            match self.create_backend(&name, settings, &folder_paths).await {
                Ok(backend) => providers.push(ProviderCandidate { name, backend }),
                Err(e) if name == config.active_provider => {
                    error!("Active storage provider '{}' failed to initialize: {}", name, e);
                    return Err(StorageError::Configuration(format!(
                        "active provider '{}' failed to initialize: {}",
                        name, e
                    )));
                }
                Err(e) => {
                    warn!(
                        "Storage provider '{}' failed to initialize and is excluded from failover: {}",
                        name, e
                    );
                }
            }
        }

        let write_order: Vec<ProviderCandidate> = providers
            .iter()
            .filter(|p| priority.contains(&p.name))
            .cloned()
            .collect();

        let resilience = &config.resilience;
        let breakers = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig::from(
            &resilience.circuit_breaker,
        )));
        let limiter = Arc::new(ConcurrencyLimiter::new(
            resilience.max_concurrent_per_provider,
            Duration::from_millis(resilience.queue_timeout_ms),
        ));
        for (name, folder) in &config.folders {
            if let Some(limit) = folder.max_concurrency {
                limiter.set_limit(&folder_key(name), limit);
            }
        }
        let attempt_timeout =
            Some(resilience.attempt_timeout_ms).filter(|ms| *ms > 0).map(Duration::from_millis);

        let failover = StorageFailoverManager::new(
            RetryManager::new(RetryConfig::from(&resilience.retry)),
            breakers.clone(),
            limiter,
            self.metrics.clone(),
            resilience.failover_enabled,
            attempt_timeout,
        );

        info!(
            "Storage runtime ready: active provider '{}', write order {:?}",
            config.active_provider,
            write_order.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
        );

        Ok(StorageRuntime {
            active_provider: config.active_provider.clone(),
            providers,
            write_order,
            failover,
            health: StorageHealthChecker::new(HEALTH_CHECK_TIMEOUT, breakers),
            config,
        })
    }

    async fn create_backend(
        &self,
        name: &str,
        settings: &ProviderSettings,
        folder_paths: &[String],
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        let credentials = self
            .credentials
            .get_credentials(settings.provider_type())
            .await?;
        self.backend_factory
            .create_backend(name, settings, credentials, folder_paths)
            .await
    }

    fn install(&self, runtime: StorageRuntime) {
        *self.runtime.write().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(runtime));
    }

    fn runtime(&self) -> Result<Arc<StorageRuntime>, StorageError> {
        self.runtime
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| {
                StorageError::Configuration("storage service is not initialized".to_string())
            })
    }

    async fn refresh_quota_usage(&self) -> Result<(), StorageError> {
        let _gate = self.quota_gate.write().await;
        let report = self.usage.report().await?;
        self.quota.seed_usage(report.quota_totals());
        debug!(
            "Quota counters seeded from {} stored file(s)",
            report.total.file_count
        );
        Ok(())
    }

    async fn audit(&self, operation: StorageOperation) {
        let kind = operation.kind;
        if let Err(e) = self.operations.record_operation(operation).await {
            warn!("Failed to record {} operation: {}", kind, e);
        }
    }

    pub async fn upload_file(&self, request: UploadRequest) -> UploadResult {
        match self.try_upload_file(request).await {
            Ok(file) => UploadResult::ok(file),
            Err(e) => UploadResult::failed(e.to_string()),
        }
    }

    /// Same as [`upload_file`](Self::upload_file) with the typed error.
    pub async fn try_upload_file(&self, request: UploadRequest) -> Result<StorageFile, StorageError> {
        let operation = StorageOperation::new(
            OperationKind::Upload,
            format!("{}/{}", request.folder, request.file.original_name),
            Some(request.uploaded_by.clone()),
        )
        .with_metadata("folder", request.folder.clone())
        .with_metadata("size", request.file.size());

        let result = self.store_upload(request).await;

        let operation = match &result {
            Ok((file, attempted)) => {
                let mut operation = operation
                    .with_metadata("fileId", file.id.to_string())
                    .with_metadata("provider", file.provider.clone())
                    .with_metadata("attemptedProviders", attempted.clone());
                operation.path = file.relative_path.clone();
                operation
            }
            Err(e) => {
                let operation = match e {
                    StorageError::ProviderUnavailable { attempted, .. } => {
                        operation.with_metadata("attemptedProviders", attempted.clone())
                    }
                    _ => operation,
                };
                operation.failed(e)
            }
        };
        self.audit(operation).await;

        result.map(|(file, _)| file)
    }

    async fn store_upload(
        &self,
        request: UploadRequest,
    ) -> Result<(StorageFile, Vec<String>), StorageError> {
        let runtime = self.runtime()?;
        let folder = runtime.folder(&request.folder)?;

        let claim = match &request.idempotency_key {
            Some(key) => match self.claim_idempotency_key(&request.folder, key).await? {
                Ok(claim) => Some(claim),
                Err(existing) => {
                    info!(
                        "Upload with idempotency key {:?} already stored as {}",
                        key, existing.id
                    );
                    return Ok((existing, Vec::new()));
                }
            },
            None => None,
        };

        let size = request.file.size();
        validate_upload(&request, folder)?;

        let scopes = [
            QuotaScope::Folder(request.folder.clone()),
            QuotaScope::Uploader(request.uploaded_by.clone()),
        ];
        let reservation = self.quota.check_and_reserve(&scopes, size)?;

        let id = Uuid::new_v4();
        let stored_filename = request.file.stored_filename(&id);
        let relative_path = format!("{}/{}", folder.path.trim_end_matches('/'), stored_filename);

        let content = request.file.content.clone();
        let mime_type = request.file.mime_type.clone();
        let put = runtime.failover.execute(
            OperationKind::Upload,
            &request.folder,
            &runtime.write_order,
            |backend| {
                let key = relative_path.clone();
                let content = content.clone();
                let mime_type = mime_type.clone();
                async move { backend.put(&key, content, &mime_type).await }
            },
        );
        let outcome = if folder.max_concurrency.is_some() {
            runtime
                .failover
                .limiter()
                .run(&folder_key(&request.folder), put)
                .await?
        } else {
            put.await?
        };

        let now = Utc::now();
        let gate = self.quota_gate.read().await;
        let file = StorageFile {
            id,
            original_name: request.file.original_name.clone(),
            stored_filename,
            folder: request.folder.clone(),
            relative_path,
            provider: outcome.provider.clone(),
            provider_path: outcome.value.clone(),
            size,
            mime_type: request.file.mime_type.clone(),
            description: request
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            uploaded_by: request.uploaded_by.clone(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        let created = match self.files.create_storage_file(file).await {
            Ok(created) => created,
            Err(e) => {
                drop(gate);
                error!(
                    "Failed to save metadata for upload {}, removing stored object: {}",
                    id, e
                );
                if let Err(cleanup) = self
                    .delete_object(
                        &runtime,
                        &outcome.provider,
                        &request.folder,
                        &outcome.value,
                        OperationKind::Upload,
                    )
                    .await
                {
                    warn!(
                        "Could not remove object {} on '{}': {}",
                        outcome.value, outcome.provider, cleanup
                    );
                }
                return Err(e);
            }
        };
        reservation.commit();
        drop(gate);

        if let Some(claim) = claim {
            claim.complete(created.id);
        }

        info!(
            "Uploaded {} ({} bytes) to folder '{}' on provider '{}' as {}",
            created.original_name, created.size, created.folder, created.provider, created.id
        );
        Ok((created, outcome.attempted))
    }

    /// Claims `key` for a new upload, or returns the file an earlier upload
    /// with the same key produced.
    async fn claim_idempotency_key(
        &self,
        folder: &str,
        key: &str,
    ) -> Result<Result<IdempotencyClaim<'_>, StorageFile>, StorageError> {
        let in_progress = || {
            StorageError::Busy(format!(
                "an upload with idempotency key '{}' is in progress",
                key
            ))
        };

        let id = match self.idempotency.claim(folder, key) {
            Claim::Fresh(claim) => return Ok(Ok(claim)),
            Claim::InProgress => return Err(in_progress()),
            Claim::Stored(id) => id,
        };

        if let Some(existing) = self.files.get_storage_file_by_id(id).await? {
            return Ok(Err(existing));
        }

        debug!("File {} for idempotency key '{}' is gone", id, key);
        self.idempotency.forget(folder, key);
        match self.idempotency.claim(folder, key) {
            Claim::Fresh(claim) => Ok(Ok(claim)),
            _ => Err(in_progress()),
        }
    }

    /// Deletes a backend object through the resilience stack of its
    /// provider. A missing object counts as deleted.
    async fn delete_object(
        &self,
        runtime: &StorageRuntime,
        provider: &str,
        folder: &str,
        locator: &str,
        kind: OperationKind,
    ) -> Result<(), StorageError> {
        let candidate = runtime.provider(provider)?;
        let result = runtime
            .failover
            .execute(kind, folder, std::slice::from_ref(candidate), |backend| {
                let locator = locator.to_string();
                async move { backend.delete(&locator).await }
            })
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_backend_not_found() => {
                debug!("Object {} on '{}' was already gone", locator, provider);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_file_by_id(&self, id: Uuid) -> Result<StorageFile, StorageError> {
        self.files
            .get_storage_file_by_id(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("file {}", id)))
    }

    pub async fn get_file_content(&self, id: Uuid) -> Result<Bytes, StorageError> {
        let file = self.get_file_by_id(id).await?;
        let runtime = self.runtime()?;
        let candidate = runtime.provider(&file.provider)?;

        let locator = file.provider_path.clone();
        let result = runtime
            .failover
            .execute(
                OperationKind::Download,
                &file.folder,
                std::slice::from_ref(candidate),
                |backend| {
                    let locator = locator.clone();
                    async move { backend.get(&locator).await }
                },
            )
            .await;

        match result {
            Ok(outcome) => Ok(outcome.value),
            Err(e) if e.is_backend_not_found() => {
                warn!(
                    "File {} has a metadata row but no object on '{}'",
                    id, file.provider
                );
                Err(StorageError::NotFound(format!("content of file {}", id)))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_files(&self, folder: &str) -> Result<Vec<StorageFile>, StorageError> {
        let runtime = self.runtime()?;
        runtime.folder(folder)?;
        self.files.get_storage_files_by_folder(folder).await
    }

    /// Removes the object first, then the row. A crash in between leaves a
    /// dangling row for the cleaner.
    pub async fn delete_file(&self, id: Uuid, user_id: Option<&str>) -> Result<(), StorageError> {
        let operation = StorageOperation::new(
            OperationKind::Delete,
            id.to_string(),
            user_id.map(str::to_string),
        );

        let result = self.remove_file(id).await;

        let operation = match &result {
            Ok(file) => {
                let mut operation = operation
                    .with_metadata("fileId", id.to_string())
                    .with_metadata("provider", file.provider.clone())
                    .with_metadata("size", file.size);
                operation.path = file.relative_path.clone();
                operation
            }
            Err(e) => operation.failed(e),
        };
        self.audit(operation).await;

        result.map(|_| ())
    }

    async fn remove_file(&self, id: Uuid) -> Result<StorageFile, StorageError> {
        let file = self.get_file_by_id(id).await?;
        let runtime = self.runtime()?;

        self.delete_object(
            &runtime,
            &file.provider,
            &file.folder,
            &file.provider_path,
            OperationKind::Delete,
        )
        .await?;

        let gate = self.quota_gate.read().await;
        if !self.files.delete_storage_file(id).await? {
            return Err(StorageError::NotFound(format!("file {}", id)));
        }
        self.quota.release(
            &[
                QuotaScope::Folder(file.folder.clone()),
                QuotaScope::Uploader(file.uploaded_by.clone()),
            ],
            file.size,
        );
        drop(gate);
        self.idempotency.forget_file(id);

        info!("Deleted file {} from folder '{}'", id, file.folder);
        Ok(file)
    }

    pub async fn update_file(&self, id: Uuid, update: FileUpdate) -> Result<StorageFile, StorageError> {
        let user_id = update.updated_by.clone();
        let mut dto = StorageFileDTO::from_update(id, update);
        dto.sanitize();

        let result = if dto.is_empty() {
            self.get_file_by_id(id).await
        } else {
            match self.files.update_storage_file(id, dto).await {
                Ok(Some(file)) => Ok(file),
                Ok(None) => Err(StorageError::NotFound(format!("file {}", id))),
                Err(e) => Err(e),
            }
        };

        let operation = StorageOperation::new(OperationKind::Update, id.to_string(), user_id)
            .with_metadata("fileId", id.to_string());
        let operation = match &result {
            Ok(file) => {
                let mut operation = operation;
                operation.path = file.relative_path.clone();
                operation
            }
            Err(e) => operation.failed(e),
        };
        self.audit(operation).await;

        result
    }

    pub async fn recent_operations(&self, limit: usize) -> Result<Vec<StorageOperation>, StorageError> {
        self.operations.recent_operations(limit).await
    }

    pub fn get_config(&self) -> StorageConfig {
        self.config.current()
    }

    /// Validates the merged configuration and rebuilds the backends from it.
    /// On any failure the previous configuration and backends stay active.
    pub async fn update_config(&self, update: StorageConfigDTO) -> Result<StorageConfig, StorageError> {
        let _guard = self.reload.lock().await;

        let config = self.config.preview(update)?;
        let limits = QuotaLimits::from_config(&config)?;
        let runtime = self.build_runtime(config.clone()).await?;

        self.config.replace(config.clone());
        self.quota.set_limits(limits);
        self.install(runtime);
        info!(
            "Storage configuration updated, active provider '{}'",
            config.active_provider
        );
        Ok(config)
    }

    pub async fn health(&self) -> Result<HealthReport, StorageError> {
        let runtime = self.runtime()?;
        Ok(runtime
            .health
            .check(&runtime.active_provider, &runtime.providers)
            .await)
    }

    pub fn metrics(&self) -> StorageMetricsReport {
        let runtime = self.runtime().ok();
        let (circuits, in_flight) = match &runtime {
            Some(runtime) => {
                let limiter = runtime.failover.limiter();
                let mut in_flight = BTreeMap::new();
                for provider in &runtime.providers {
                    let key = provider_key(&provider.name);
                    in_flight.insert(key.clone(), limiter.in_flight(&key));
                }
                for (name, folder) in &runtime.config.folders {
                    if folder.max_concurrency.is_some() {
                        let key = folder_key(name);
                        in_flight.insert(key.clone(), limiter.in_flight(&key));
                    }
                }
                (runtime.failover.breakers().states(), in_flight)
            }
            None => (Vec::new(), BTreeMap::new()),
        };

        StorageMetricsReport {
            operations: self.metrics.snapshot(),
            circuits,
            quotas: self.quota.quotas(),
            in_flight,
            cache: self.cache.as_ref().map(|c| c.stats()),
        }
    }

    pub fn reset_circuit(&self, provider: &str) -> Result<(), StorageError> {
        let runtime = self.runtime()?;
        runtime.provider(provider)?;
        runtime.failover.breakers().reset(provider);
        info!("Circuit breaker for provider '{}' reset", provider);
        Ok(())
    }

    pub async fn usage(&self) -> Result<UsageReport, StorageError> {
        self.usage.report().await
    }

    /// Applies retention windows, reconciles backends with metadata, then
    /// re-measures quota usage.
    pub async fn run_cleanup(&self) -> Result<MaintenanceReport, StorageError> {
        let runtime = self.runtime()?;
        let settings = &runtime.config.cleanup;

        let lifecycle = self
            .lifecycle
            .run(
                &runtime.config.folders,
                &runtime.providers,
                &runtime.failover,
                Utc::now(),
            )
            .await?;

        let cleaner = OrphanedFileCleaner::new(
            self.files.clone(),
            self.operations.clone(),
            settings.orphan_policy,
            Duration::from_secs(settings.orphan_grace_secs),
        );
        let cleanup = cleaner
            .run(&runtime.config.folders, &runtime.providers, &runtime.failover)
            .await?;

        self.refresh_quota_usage().await?;

        info!(
            "Maintenance finished: {} expired, {} archived, {} orphan(s), {} dangling",
            lifecycle.expired(),
            lifecycle.archived(),
            cleanup.orphans.len(),
            cleanup.dangling.len()
        );
        Ok(MaintenanceReport { lifecycle, cleanup })
    }

    /// Runs [`run_cleanup`](Self::run_cleanup) every `cleanup.interval_secs`.
    /// Returns `None` when the interval is zero. The task stops once the
    /// service is dropped.
    pub fn start_background_tasks(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval_secs = self.config.current().cleanup.interval_secs;
        if interval_secs == 0 {
            info!("Background cleanup disabled");
            return None;
        }

        let service: Weak<Self> = Arc::downgrade(self);
        info!("Background cleanup scheduled every {}s", interval_secs);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                if let Err(e) = service.run_cleanup().await {
                    error!("Background cleanup failed: {}", e);
                }
            }
        }))
    }
}

/// Checks that need no I/O: file name, extension and size.
fn validate_upload(request: &UploadRequest, folder: &StorageFolder) -> Result<(), StorageError> {
    let name = request.file.original_name.trim();
    if name.is_empty() || name.ends_with('/') || name.ends_with('\\') {
        return Err(ValidationError::InvalidFileName(request.file.original_name.clone()).into());
    }

    let extension = request.file.extension();
    if !folder.allows_extension(&extension) {
        return Err(ValidationError::TypeNotAllowed {
            folder: request.folder.clone(),
            extension,
        }
        .into());
    }

    let max_size = parse_size(&folder.max_size).map_err(|e| {
        StorageError::Configuration(format!("folder '{}' max_size: {}", request.folder, e))
    })?;
    let size = request.file.size();
    if size > max_size {
        return Err(ValidationError::SizeExceeded {
            folder: request.folder.clone(),
            size,
            max_size,
        }
        .into());
    }
    Ok(())
}
