use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

use crate::{
    application::{error::StorageError, services::metadata_cache::MetadataCache},
    domain::models::file::StorageFile,
};

/// File metadata cached in Redis as JSON under `storage_file:{id}`.
pub struct RedisMetadataCache {
    client: redis::aio::ConnectionManager,
    ttl_seconds: u64,
}

impl RedisMetadataCache {
    pub fn new(client: redis::aio::ConnectionManager, ttl_seconds: u64) -> Self {
        Self {
            client,
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    fn get_redis_key(id: &Uuid) -> String {
        format!("storage_file:{}", id)
    }
}

#[async_trait]
impl MetadataCache for RedisMetadataCache {
    async fn get(&self, id: Uuid) -> Result<Option<StorageFile>, StorageError> {
        let key = Self::get_redis_key(&id);
        let mut conn = self.client.clone();

        let value: Option<String> = conn.get(&key).await.map_err(|e| {
            StorageError::Internal(format!("Failed to read cached metadata: {}", e))
        })?;

        match value {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<StorageFile>(&raw) {
                Ok(file) => Ok(Some(file)),
                Err(e) => {
                    debug!("Discarding undecodable cache entry '{}': {}", key, e);
                    let _: Result<(), _> = conn.del(&key).await;
                    Ok(None)
                }
            },
        }
    }

    async fn put(&self, file: &StorageFile) -> Result<(), StorageError> {
        let key = Self::get_redis_key(&file.id);
        let value = serde_json::to_string(file).map_err(|e| {
            StorageError::Internal(format!("Failed to encode metadata for cache: {}", e))
        })?;
        let mut conn = self.client.clone();

        conn.set_ex::<_, _, ()>(&key, &value, self.ttl_seconds)
            .await
            .map_err(|e| StorageError::Internal(format!("Failed to cache metadata: {}", e)))?;

        debug!("Cached metadata under '{}'", key);
        Ok(())
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), StorageError> {
        let key = Self::get_redis_key(&id);
        let mut conn = self.client.clone();

        conn.del::<_, ()>(&key).await.map_err(|e| {
            StorageError::Internal(format!("Failed to invalidate cached metadata: {}", e))
        })?;
        Ok(())
    }
}
