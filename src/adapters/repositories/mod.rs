mod env_credential_manager;
mod memory_repository;
mod pg_credential_manager;
mod pg_operation_repository;
mod pg_storage_file_repository;

pub use env_credential_manager::{
    EnvCredentialManager, AZURE_SAS_TOKEN, S3_ACCESS_KEY_ID, S3_SECRET_ACCESS_KEY,
    S3_SESSION_TOKEN,
};
pub use memory_repository::{InMemoryOperationRepository, InMemoryStorageFileRepository};
pub use pg_credential_manager::PgCredentialManager;
pub use pg_operation_repository::PgOperationRepository;
pub use pg_storage_file_repository::PgStorageFileRepository;
