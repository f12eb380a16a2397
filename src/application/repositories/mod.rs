pub mod credential_repository;
pub mod file_repository;
pub mod operation_repository;
