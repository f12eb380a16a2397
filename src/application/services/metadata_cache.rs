use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    application::{
        dto::storage_file_dto::StorageFileDTO, error::StorageError,
        repositories::file_repository::StorageFileRepository,
    },
    domain::models::file::StorageFile,
};

#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError>;
    async fn put(&self, file: &StorageFile) -> Result<(), StorageError>;
    async fn invalidate(&self, id: Uuid) -> Result<(), StorageError>;
}

struct CachedEntry {
    file: StorageFile,
    inserted_at: Instant,
}

/// Process-local cache with a fixed TTL and an entry cap. When full, expired
/// entries are dropped first, then the oldest one.
pub struct InMemoryMetadataCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<Uuid, CachedEntry>>,
}

impl InMemoryMetadataCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    async fn get(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(&id) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Ok(Some(entry.file.clone())),
            Some(_) => {
                entries.remove(&id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, file: &StorageFile) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        if entries.len() >= self.max_entries && !entries.contains_key(&file.id) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(id, _)| *id);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            file.id,
            CachedEntry {
                file: file.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Read-through cache in front of a [`StorageFileRepository`]. Lookups by id
/// are served from the cache; writes go to the repository and then refresh or
/// invalidate the cached entry. A failing cache only costs a warning.
pub struct StorageMetadataCacheAdapter {
    inner: Arc<dyn StorageFileRepository>,
    cache: Arc<dyn MetadataCache>,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Bumped after every write, striped by id. A read-through fill whose
    /// stripe moved while it was in flight is evicted again.
    generations: [AtomicU64; GENERATION_STRIPES],
}

const GENERATION_STRIPES: usize = 64;

impl StorageMetadataCacheAdapter {
    pub fn new(inner: Arc<dyn StorageFileRepository>, cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            generations: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn generation(&self, id: Uuid) -> &AtomicU64 {
        &self.generations[(id.as_u128() % GENERATION_STRIPES as u128) as usize]
    }

    /// Marks `id` as written, then drops the cached entry.
    async fn invalidate_after_write(&self, id: Uuid) {
        self.generation(id).fetch_add(1, Ordering::SeqCst);
        self.evict(id).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn populate(&self, file: &StorageFile) {
        if let Err(e) = self.cache.put(file).await {
            warn!("Failed to cache metadata for file {}: {}", file.id, e);
        }
    }

    async fn evict(&self, id: Uuid) {
        if let Err(e) = self.cache.invalidate(id).await {
            warn!("Failed to invalidate cached metadata for file {}: {}", id, e);
        }
    }
}

#[async_trait]
impl StorageFileRepository for StorageMetadataCacheAdapter {
    async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError> {
        let created = self.inner.create_storage_file(file).await?;
        self.populate(&created).await;
        Ok(created)
    }

    async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        match self.cache.get(id).await {
            Ok(Some(file)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Metadata cache hit for file {}", id);
                return Ok(Some(file));
            }
            Ok(None) => {}
            Err(e) => warn!("Metadata cache lookup failed for file {}: {}", id, e),
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation(id).load(Ordering::SeqCst);
        let file = self.inner.get_storage_file_by_id(id).await?;
        if let Some(file) = &file {
            self.populate(file).await;
            if self.generation(id).load(Ordering::SeqCst) != generation {
                debug!("File {} changed during a cache fill, evicting", id);
                self.evict(id).await;
            }
        }
        Ok(file)
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
        let updated = self.inner.update_storage_file(id, update).await;
        self.invalidate_after_write(id).await;
        updated
    }

    async fn delete_storage_file(&self, id: Uuid) -> Result<bool, StorageError> {
        let deleted = self.inner.delete_storage_file(id).await;
        self.invalidate_after_write(id).await;
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::repositories::InMemoryStorageFileRepository;
    use chrono::Utc;

    fn sample(folder: &str) -> StorageFile {
        let now = Utc::now();
        let id = Uuid::new_v4();
        StorageFile {
            id,
            original_name: "minutes.pdf".to_string(),
            stored_filename: format!("minutes.{}.pdf", id),
            folder: folder.to_string(),
            relative_path: format!("{}/minutes.{}.pdf", folder, id),
            provider: "local".to_string(),
            provider_path: format!("{}/minutes.{}.pdf", folder, id),
            size: 42,
            mime_type: "application/pdf".to_string(),
            description: None,
            uploaded_by: "clerk".to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl MetadataCache for BrokenCache {
        async fn get(&self, _id: Uuid) -> Result<Option<StorageFile>, StorageError> {
            Err(StorageError::Internal("cache down".to_string()))
        }

        async fn put(&self, _file: &StorageFile) -> Result<(), StorageError> {
            Err(StorageError::Internal("cache down".to_string()))
        }

        async fn invalidate(&self, _id: Uuid) -> Result<(), StorageError> {
            Err(StorageError::Internal("cache down".to_string()))
        }
    }

    // ==================== InMemoryMetadataCache Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = InMemoryMetadataCache::new(Duration::from_secs(60), 10);
        let file = sample("public");
        cache.put(&file).await.unwrap();
        assert_eq!(cache.get(file.id).await.unwrap(), Some(file.clone()));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(file.id).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_entry_evicted_when_full() {
        let cache = InMemoryMetadataCache::new(Duration::from_secs(60), 2);
        let first = sample("public");
        let second = sample("public");
        let third = sample("public");

        cache.put(&first).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put(&second).await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put(&third).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(first.id).await.unwrap(), None);
        assert!(cache.get(third.id).await.unwrap().is_some());
    }

    // ==================== Adapter Tests ====================

    #[tokio::test]
    async fn test_read_through_and_invalidation() {
        let repo = Arc::new(InMemoryStorageFileRepository::new());
        let adapter = StorageMetadataCacheAdapter::new(
            repo.clone(),
            Arc::new(InMemoryMetadataCache::new(Duration::from_secs(60), 10)),
        );

        let file = adapter.create_storage_file(sample("public")).await.unwrap();
        assert!(adapter.get_storage_file_by_id(file.id).await.unwrap().is_some());
        assert_eq!(adapter.stats(), CacheStats { hits: 1, misses: 0 });

        let update = StorageFileDTO {
            id: file.id,
            description: Some("Updated".to_string()),
            ..Default::default()
        };
        adapter.update_storage_file(file.id, update).await.unwrap();
        let fetched = adapter.get_storage_file_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(fetched.description.as_deref(), Some("Updated"));
        assert_eq!(adapter.stats().misses, 1);

        assert!(adapter.delete_storage_file(file.id).await.unwrap());
        assert!(adapter.get_storage_file_by_id(file.id).await.unwrap().is_none());
    }

    /// Pauses lookups after reading the row, while armed.
    struct PausingRepository {
        inner: InMemoryStorageFileRepository,
        armed: std::sync::atomic::AtomicBool,
        read_done: tokio::sync::Notify,
        resume: tokio::sync::Notify,
    }

    #[async_trait]
    impl StorageFileRepository for PausingRepository {
        async fn create_storage_file(&self, file: StorageFile) -> Result<StorageFile, StorageError> {
            self.inner.create_storage_file(file).await
        }

        async fn get_storage_file_by_id(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
            let file = self.inner.get_storage_file_by_id(id).await?;
            if self.armed.load(Ordering::SeqCst) {
                self.read_done.notify_one();
                self.resume.notified().await;
            }
            Ok(file)
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

    #[tokio::test]
    async fn test_fill_racing_delete_does_not_resurrect_row() {
        let repo = Arc::new(PausingRepository {
            inner: InMemoryStorageFileRepository::new(),
            armed: std::sync::atomic::AtomicBool::new(false),
            read_done: tokio::sync::Notify::new(),
            resume: tokio::sync::Notify::new(),
        });
        let cache = Arc::new(InMemoryMetadataCache::new(Duration::from_secs(60), 10));
        let adapter = Arc::new(StorageMetadataCacheAdapter::new(repo.clone(), cache.clone()));

        let file = repo.create_storage_file(sample("public")).await.unwrap();
        repo.armed.store(true, Ordering::SeqCst);

        let reader = tokio::spawn({
            let adapter = adapter.clone();
            let id = file.id;
            async move { adapter.get_storage_file_by_id(id).await }
        });
        repo.read_done.notified().await;
        repo.armed.store(false, Ordering::SeqCst);

        assert!(adapter.delete_storage_file(file.id).await.unwrap());
        repo.resume.notify_one();

        // The lookup that started first still sees the old row ...
        assert!(reader.await.unwrap().unwrap().is_some());
        // ... but does not leave it behind in the cache.
        assert_eq!(cache.get(file.id).await.unwrap(), None);
        assert!(adapter.get_storage_file_by_id(file.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_faults_do_not_fail_calls() {
        let repo = Arc::new(InMemoryStorageFileRepository::new());
        let adapter = StorageMetadataCacheAdapter::new(repo, Arc::new(BrokenCache));

        let file = adapter.create_storage_file(sample("public")).await.unwrap();
        let fetched = adapter.get_storage_file_by_id(file.id).await.unwrap();
        assert_eq!(fetched.map(|f| f.id), Some(file.id));
        assert!(adapter.delete_storage_file(file.id).await.unwrap());
    }
}
