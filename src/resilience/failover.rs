//! Composition of limiter, retry and circuit breaker across an ordered list
//! of providers.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    application::{
        error::StorageError,
        services::{metrics_collector::MetricsCollector, storage_backend::StorageBackend},
    },
    domain::models::operation::OperationKind,
    resilience::{
        circuit_breaker::CircuitBreakerManager,
        concurrency::{provider_key, ConcurrencyLimiter},
        retry::RetryManager,
    },
    services::error::BackendError,
};

/// A provider eligible to serve a request, in priority order.
#[derive(Clone)]
pub struct ProviderCandidate {
    pub name: String,
    pub backend: Arc<dyn StorageBackend>,
}

#[derive(Debug)]
pub struct FailoverOutcome<T> {
    pub value: T,
    pub provider: String,
    pub attempted: Vec<String>,
}

pub struct StorageFailoverManager {
    retry: RetryManager,
    breakers: Arc<CircuitBreakerManager>,
    limiter: Arc<ConcurrencyLimiter>,
    metrics: Arc<MetricsCollector>,
    failover_enabled: bool,
    attempt_timeout: Option<Duration>,
}

impl StorageFailoverManager {
    pub fn new(
        retry: RetryManager,
        breakers: Arc<CircuitBreakerManager>,
        limiter: Arc<ConcurrencyLimiter>,
        metrics: Arc<MetricsCollector>,
        failover_enabled: bool,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            retry,
            breakers,
            limiter,
            metrics,
            failover_enabled,
            attempt_timeout,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    /// Whether `error` says something about the provider's health, as
    /// opposed to the request itself. Every backend fault except a missing
    /// object counts, retryable or not.
    pub fn is_provider_fault(&self, error: &StorageError) -> bool {
        match error {
            StorageError::CircuitOpen(_) => true,
            StorageError::Backend(e) => !e.is_not_found(),
            _ => false,
        }
    }

    /// Runs `operation` against the first candidate whose breaker admits
    /// calls, moving on to the next one when the provider keeps failing.
    /// Errors that are not provider faults are returned unchanged; once every
    /// eligible provider is exhausted the result is
    /// [`StorageError::ProviderUnavailable`].
    pub async fn execute<T, F, Fut>(
        &self,
        kind: OperationKind,
        folder: &str,
        candidates: &[ProviderCandidate],
        operation: F,
    ) -> Result<FailoverOutcome<T>, StorageError>
    where
        F: Fn(Arc<dyn StorageBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let limit = if self.failover_enabled {
            candidates.len()
        } else {
            candidates.len().min(1)
        };

        let mut attempted: Vec<String> = Vec::new();
        let mut last_error: Option<StorageError> = None;

        for candidate in candidates.iter().take(limit) {
            let breaker = self.breakers.breaker(&candidate.name);
            if !breaker.allows_requests() {
                debug!(
                    "Skipping provider '{}' for {}: circuit open",
                    candidate.name, kind
                );
                last_error = Some(StorageError::CircuitOpen(candidate.name.clone()));
                continue;
            }

            attempted.push(candidate.name.clone());
            let started = Instant::now();

            let result = self
                .limiter
                .run(
                    &provider_key(&candidate.name),
                    self.retry.with_retry(|| {
                        let backend = candidate.backend.clone();
                        let breaker = breaker.clone();
                        let operation = &operation;
                        let name = candidate.name.as_str();
                        async move {
                            breaker
                                .call(self.attempt(name, operation(backend)), |e| {
                                    self.is_provider_fault(e)
                                })
                                .await
                        }
                    }),
                )
                .await;

            let success = result.is_ok();
            self.metrics
                .record(&candidate.name, folder, kind, started.elapsed(), success);

            match result {
                Ok(value) => {
                    if attempted.len() > 1 {
                        info!(
                            "{} in folder '{}' served by failover provider '{}' after {:?}",
                            kind, folder, candidate.name, attempted
                        );
                    }
                    return Ok(FailoverOutcome {
                        value,
                        provider: candidate.name.clone(),
                        attempted,
                    });
                }
                Err(error) if self.is_provider_fault(&error) => {
                    warn!(
                        "Provider '{}' failed {} in folder '{}': {}",
                        candidate.name, kind, folder, error
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no storage provider configured".to_string());
        Err(StorageError::ProviderUnavailable { message, attempted })
    }

    async fn attempt<T, Fut>(&self, provider: &str, operation: Fut) -> Result<T, StorageError>
    where
        Fut: Future<Output = Result<T, BackendError>>,
    {
        match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(result) => result.map_err(StorageError::from),
                Err(_) => Err(StorageError::Backend(BackendError::timeout(
                    provider,
                    format!("attempt timed out after {:?}", limit),
                ))),
            },
            None => operation.await.map_err(StorageError::from),
        }
    }
}
