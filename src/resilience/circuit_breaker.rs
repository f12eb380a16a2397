//! Per-provider circuit breakers.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, RwLock},
    time::Duration,
};

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{application::error::StorageError, domain::config::storage::CircuitBreakerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive provider faults that open the circuit.
    pub failure_threshold: u32,
    /// Time spent OPEN before a probe is admitted.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfig::from(&CircuitBreakerSettings::default())
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            cooldown: Duration::from_millis(settings.cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerState {
    pub provider: String,
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
    pub cooldown_remaining_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    phase: CircuitPhase,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    probe_in_flight: bool,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Admission ticket for one call. Settle it with [`BreakerPermit::success`]
/// or [`BreakerPermit::failure`]; dropping it unsettled (the call was
/// cancelled) records nothing and frees the half-open probe slot.
#[must_use]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

impl CircuitBreaker {
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            inner: Mutex::new(BreakerInner {
                phase: CircuitPhase::Closed,
                consecutive_failures: 0,
                open_until: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, StorageError> {
        let mut inner = self.lock();

        let probe = match inner.phase {
            CircuitPhase::Closed => false,
            CircuitPhase::Open => {
                let cooled_down = inner
                    .open_until
                    .map(|until| Instant::now() >= until)
                    .unwrap_or(true);
                if !cooled_down {
                    return Err(StorageError::CircuitOpen(self.key.clone()));
                }
                debug!("Circuit breaker '{}' transitioning from Open to HalfOpen", self.key);
                inner.phase = CircuitPhase::HalfOpen;
                inner.probe_in_flight = true;
                true
            }
            CircuitPhase::HalfOpen => {
                if inner.probe_in_flight {
                    return Err(StorageError::CircuitOpen(self.key.clone()));
                }
                inner.probe_in_flight = true;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Runs `operation` behind the breaker. `is_fault` decides which errors
    /// count against the provider; everything else counts as a healthy
    /// response.
    pub async fn call<T, F, C>(&self, operation: F, is_fault: C) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
        C: Fn(&StorageError) -> bool,
    {
        let permit = self.try_acquire()?;

        match operation.await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(error) => {
                if is_fault(&error) {
                    permit.failure();
                } else {
                    permit.success();
                }
                Err(error)
            }
        }
    }

    fn record_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe {
            info!("Circuit breaker '{}' closed after successful probe", self.key);
            inner.phase = CircuitPhase::Closed;
            inner.open_until = None;
            inner.probe_in_flight = false;
            inner.consecutive_failures = 0;
        } else if inner.phase == CircuitPhase::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if probe {
            warn!("Circuit breaker '{}' probe failed, reopening", self.key);
            inner.phase = CircuitPhase::Open;
            inner.open_until = Some(Instant::now() + self.config.cooldown);
            inner.probe_in_flight = false;
            return;
        }

        if inner.phase == CircuitPhase::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            warn!(
                "Circuit breaker '{}' opening after {} consecutive failures",
                self.key, inner.consecutive_failures
            );
            inner.phase = CircuitPhase::Open;
            inner.open_until = Some(Instant::now() + self.config.cooldown);
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.phase == CircuitPhase::HalfOpen {
            debug!("Circuit breaker '{}' probe cancelled", self.key);
            inner.probe_in_flight = false;
        }
    }

    /// Whether a call issued now would be admitted. Does not change state.
    pub fn allows_requests(&self) -> bool {
        let inner = self.lock();
        match inner.phase {
            CircuitPhase::Closed => true,
            CircuitPhase::Open => inner
                .open_until
                .map(|until| Instant::now() >= until)
                .unwrap_or(true),
            CircuitPhase::HalfOpen => !inner.probe_in_flight,
        }
    }

    pub fn phase(&self) -> CircuitPhase {
        self.lock().phase
    }

    pub fn state(&self) -> CircuitBreakerState {
        let inner = self.lock();
        let cooldown_remaining_ms = match inner.phase {
            CircuitPhase::Open => inner.open_until.map(|until| {
                until
                    .saturating_duration_since(Instant::now())
                    .as_millis() as u64
            }),
            _ => None,
        };

        CircuitBreakerState {
            provider: self.key.clone(),
            phase: inner.phase,
            consecutive_failures: inner.consecutive_failures,
            cooldown_remaining_ms,
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = CircuitPhase::Closed;
        inner.consecutive_failures = 0;
        inner.open_until = None;
        inner.probe_in_flight = false;
        debug!("Circuit breaker '{}' reset", self.key);
    }
}

/// Lazily creates one breaker per provider key.
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
        {
            return existing.clone();
        }

        self.breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config.clone())))
            .clone()
    }

    pub fn allows_requests(&self, key: &str) -> bool {
        self.breaker(key).allows_requests()
    }

    pub fn states(&self) -> Vec<CircuitBreakerState> {
        let mut states: Vec<CircuitBreakerState> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|breaker| breaker.state())
            .collect();
        states.sort_by(|a, b| a.provider.cmp(&b.provider));
        states
    }

    pub fn reset(&self, key: &str) {
        self.breaker(key).reset();
    }
}
