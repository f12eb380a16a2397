pub mod file;
pub mod operation;
pub mod quota;
