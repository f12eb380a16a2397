pub mod cloud_uuid_storage_service;
pub mod config_manager;
pub mod health_checker;
pub mod idempotency;
pub mod lifecycle_manager;
pub mod metadata_cache;
pub mod metrics_collector;
pub mod orphan_cleaner;
pub mod quota_manager;
pub mod storage_backend;
pub mod usage_reporter;

pub use cloud_uuid_storage_service::{CloudUuidStorageService, StorageDependencies};
pub use storage_backend::{BackendFactory, BackendObject, StorageBackend};
