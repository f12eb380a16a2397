#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use civic_storage::{
    adapters::repositories::{InMemoryOperationRepository, InMemoryStorageFileRepository},
    application::{
        dto::storage_file_dto::StorageFileDTO,
        error::StorageError,
        repositories::{
            credential_repository::CredentialManager, file_repository::StorageFileRepository,
        },
        services::{
            BackendFactory, BackendObject, CloudUuidStorageService, StorageBackend,
            StorageDependencies,
        },
    },
    domain::{
        config::{
            credentials::{AzureCredentials, ProviderCredentials, S3Credentials},
            storage::{ProviderSettings, ProviderType, StorageConfig, StorageFolder},
        },
        models::file::{FileUpload, StorageFile, UploadRequest},
    },
    services::error::BackendError,
};
use tokio::sync::Notify;
use uuid::Uuid;

/// In-memory backend whose faults can be switched on and off.
pub struct MemoryBackend {
    name: String,
    objects: Mutex<HashMap<String, Bytes>>,
    failing: AtomicBool,
    disk_full: AtomicBool,
    healthy: AtomicBool,
    puts: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            objects: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            disk_full: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            puts: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Writes fail with a non-transient i/o error.
    pub fn set_disk_full(&self, disk_full: bool) {
        self.disk_full.store(disk_full, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.objects.lock().unwrap().contains_key(locator)
    }

    pub fn insert(&self, locator: &str, content: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(locator.to_string(), Bytes::from_static(content));
    }

    pub fn remove(&self, locator: &str) {
        self.objects.lock().unwrap().remove(locator);
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::network(&self.name, "connection reset by peer"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::S3
    }

    async fn put(&self, key: &str, content: Bytes, _mime_type: &str) -> Result<String, BackendError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.disk_full.load(Ordering::SeqCst) {
            return Err(BackendError::from_io(
                &self.name,
                std::io::Error::other("No space left on device (os error 28)"),
            ));
        }
        self.objects.lock().unwrap().insert(key.to_string(), content);
        Ok(key.to_string())
    }

    async fn get(&self, locator: &str) -> Result<Bytes, BackendError> {
        self.check()?;
        self.objects
            .lock()
            .unwrap()
            .get(locator)
            .cloned()
            .ok_or_else(|| BackendError::not_found(&self.name, locator))
    }

    async fn delete(&self, locator: &str) -> Result<(), BackendError> {
        self.check()?;
        match self.objects.lock().unwrap().remove(locator) {
            Some(_) => Ok(()),
            None => Err(BackendError::not_found(&self.name, locator)),
        }
    }

    async fn exists(&self, locator: &str) -> Result<bool, BackendError> {
        self.check()?;
        Ok(self.contains(locator))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BackendObject>, BackendError> {
        self.check()?;
        let objects = self.objects.lock().unwrap();
        let mut listed: Vec<BackendObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, content)| BackendObject {
                locator: key.clone(),
                size: content.len() as u64,
                last_modified: None,
            })
            .collect();
        listed.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(listed)
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::network(&self.name, "connection refused"))
        }
    }
}

/// Hands out pre-built [`MemoryBackend`]s by provider name.
pub struct FakeBackendFactory {
    backends: HashMap<String, Arc<MemoryBackend>>,
    broken: HashSet<String>,
}

#[async_trait]
impl BackendFactory for FakeBackendFactory {
    async fn create_backend(
        &self,
        name: &str,
        _settings: &ProviderSettings,
        _credentials: ProviderCredentials,
        _folders: &[String],
    ) -> Result<Arc<dyn StorageBackend>, StorageError> {
        if self.broken.contains(name) {
            return Err(StorageError::Configuration(format!(
                "bucket for '{}' does not exist",
                name
            )));
        }
        self.backends
            .get(name)
            .map(|b| b.clone() as Arc<dyn StorageBackend>)
            .ok_or_else(|| StorageError::Configuration(format!("unknown provider '{}'", name)))
    }
}

pub struct StaticCredentials;

#[async_trait]
impl CredentialManager for StaticCredentials {
    async fn get_credentials(
        &self,
        provider_type: ProviderType,
    ) -> Result<ProviderCredentials, StorageError> {
        Ok(match provider_type {
            ProviderType::Local => ProviderCredentials::Local,
            ProviderType::S3 => ProviderCredentials::S3(S3Credentials {
                access_key_id: "test".to_string(),
                secret_access_key: "test".to_string(),
                session_token: None,
            }),
            ProviderType::Azure => ProviderCredentials::Azure(AzureCredentials {
                sas_token: "sv=test".to_string(),
            }),
        })
    }
}

/// `providers[0]` is active, the rest form the failover order. Folders:
/// `public` (pdf/docx, 10MB) and `private` (any type, 1MB).
pub fn config(providers: &[&str]) -> StorageConfig {
    let mut config = StorageConfig::default();
    config.providers.clear();
    for name in providers {
        config.providers.insert(
            name.to_string(),
            ProviderSettings::S3 {
                bucket: format!("{}-bucket", name),
                region: "us-east-1".to_string(),
                endpoint: None,
                force_path_style: false,
                prefix: None,
            },
        );
    }
    config.active_provider = providers[0].to_string();
    config.failover_order = providers[1..].iter().map(|p| p.to_string()).collect();
    config.folders.insert(
        "public".to_string(),
        StorageFolder::new("public", &["pdf", "docx"], "10MB"),
    );
    config.folders.insert(
        "private".to_string(),
        StorageFolder::new("private", &[], "1MB"),
    );
    config.resilience.retry.max_attempts = 2;
    config.resilience.retry.initial_delay_ms = 1;
    config.resilience.retry.max_delay_ms = 5;
    config.resilience.circuit_breaker.failure_threshold = 3;
    config.cleanup.orphan_grace_secs = 0;
    config
}

pub struct Harness {
    pub service: Arc<CloudUuidStorageService>,
    pub files: Arc<InMemoryStorageFileRepository>,
    pub operations: Arc<InMemoryOperationRepository>,
    pub backends: HashMap<String, Arc<MemoryBackend>>,
}

/// File repository that, once armed, pauses the next insert right after the
/// row is written until [`resume`](Self::resume) is notified.
pub struct PausingFiles {
    pub inner: Arc<InMemoryStorageFileRepository>,
    armed: AtomicBool,
    pub created: Notify,
    pub resume: Notify,
}

impl PausingFiles {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageFileRepository for PausingFiles {
    async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError> {
        let created = self.inner.create_storage_file(file).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.created.notify_one();
            self.resume.notified().await;
        }
        Ok(created)
    }

    async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        self.inner.get_storage_file_by_id(id).await
    }

    async fn get_storage_files_by_folder(
        &self,
        folder: &str,
    ) -> Result<Vec<StorageFile>, StorageError> {
        self.inner.get_storage_files_by_folder(folder).await
    }

    async fn get_all_storage_files(&self) -> Result<Vec<StorageFile>, StorageError> {
        self.inner.get_all_storage_files().await
    }

    async fn update_storage_file(
        &self,
        id: Uuid,
        update: StorageFileDTO,
    ) -> Result<Option<StorageFile>, StorageError> {
        self.inner.update_storage_file(id, update).await
    }

    async fn delete_storage_file(&self, id: Uuid) -> Result<bool, StorageError> {
        self.inner.delete_storage_file(id).await
    }
}

impl Harness {
    /// Service over in-memory backends, not yet initialized.
    pub fn build(config: StorageConfig, broken: &[&str]) -> Self {
        let files = Arc::new(InMemoryStorageFileRepository::new());
        Self::assemble(config, broken, files.clone(), files)
    }

    /// Initialized service whose row inserts can be paused.
    pub async fn start_pausing(config: StorageConfig) -> (Self, Arc<PausingFiles>) {
        let files = Arc::new(InMemoryStorageFileRepository::new());
        let pausing = Arc::new(PausingFiles {
            inner: files.clone(),
            armed: AtomicBool::new(false),
            created: Notify::new(),
            resume: Notify::new(),
        });
        let harness = Self::assemble(config, &[], files, pausing.clone());
        harness.service.initialize().await.unwrap();
        (harness, pausing)
    }

    fn assemble(
        config: StorageConfig,
        broken: &[&str],
        files: Arc<InMemoryStorageFileRepository>,
        repository: Arc<dyn StorageFileRepository>,
    ) -> Self {
        let backends: HashMap<String, Arc<MemoryBackend>> = config
            .providers
            .keys()
            .map(|name| (name.clone(), MemoryBackend::new(name)))
            .collect();
        let operations = Arc::new(InMemoryOperationRepository::new());

        let service = CloudUuidStorageService::new(
            config,
            StorageDependencies {
                files: repository,
                operations: operations.clone(),
                credentials: Arc::new(StaticCredentials),
                backends: Arc::new(FakeBackendFactory {
                    backends: backends.clone(),
                    broken: broken.iter().map(|b| b.to_string()).collect(),
                }),
                cache: None,
            },
        )
        .unwrap();

        Self {
            service: Arc::new(service),
            files,
            operations,
            backends,
        }
    }

    pub async fn start(config: StorageConfig) -> Self {
        let harness = Self::build(config, &[]);
        harness.service.initialize().await.unwrap();
        harness
    }

    pub fn backend(&self, name: &str) -> &Arc<MemoryBackend> {
        &self.backends[name]
    }

    pub fn total_puts(&self) -> usize {
        self.backends.values().map(|b| b.put_count()).sum()
    }
}

/// Deterministic, non-uniform content of `size` bytes.
pub fn content(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

pub fn upload(folder: &str, name: &str, size: usize, user: &str) -> UploadRequest {
    UploadRequest::new(
        FileUpload::new(content(size), name, "application/pdf"),
        folder,
        user,
    )
}

pub fn local_config(base_path: PathBuf) -> StorageConfig {
    let mut config = config(&["local"]);
    config.providers.clear();
    config
        .providers
        .insert("local".to_string(), ProviderSettings::Local { base_path });
    config
}
