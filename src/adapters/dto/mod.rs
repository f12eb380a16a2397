pub mod credentials_dto;
pub mod storage_file_dto;
pub mod storage_operation_dto;
