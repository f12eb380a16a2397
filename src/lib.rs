pub mod adapters;
pub mod application;
pub mod domain;
pub mod resilience;
pub mod services;
