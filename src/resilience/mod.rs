pub mod circuit_breaker;
pub mod concurrency;
pub mod failover;
pub mod retry;
