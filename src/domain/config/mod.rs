pub mod credentials;
pub mod size;
pub mod storage;
