pub mod storage_controller;
