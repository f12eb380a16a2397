mod redis_metadata_cache;

pub use redis_metadata_cache::RedisMetadataCache;
