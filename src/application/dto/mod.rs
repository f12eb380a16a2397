pub mod storage_config_dto;
pub mod storage_file_dto;
