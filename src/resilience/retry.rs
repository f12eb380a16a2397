//! Retry with classified errors and exponential backoff.

use std::{fmt, future::Future, time::Duration};

use tracing::{debug, warn};

use crate::domain::config::storage::RetrySettings;

/// Message fragments that mark an error as transient when nothing more
/// specific is known about it.
const TRANSIENT_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "connection closed",
    "connection failed",
    "dns",
    "name resolution",
    "failed to lookup address",
    "broken pipe",
    "temporarily unavailable",
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
];

/// What the retry loop needs to know about an error to decide whether
/// another attempt is worthwhile.
pub trait RetryClassify: fmt::Display {
    /// Explicit verdict. Takes precedence over every other signal.
    fn retryable(&self) -> Option<bool> {
        None
    }

    fn code(&self) -> Option<&str> {
        None
    }

    fn status(&self) -> Option<u16> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            max_delay: Duration::from_millis(settings.max_delay_ms),
            retryable_errors: settings.retryable_errors.clone(),
        }
    }
}

impl RetryConfig {
    /// Delay before the `retry`-th retry (1 = the wait after the first
    /// failed attempt): `min(initial * multiplier^(retry-1), max)`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_ms = self.max_delay.as_millis() as f64;
        let raw_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);

        let clamped = if raw_ms.is_nan() || raw_ms < 0.0 {
            0.0
        } else if raw_ms > max_ms {
            max_ms
        } else {
            raw_ms
        };

        Duration::from_millis(clamped as u64)
    }

    pub fn is_retryable<E: RetryClassify + ?Sized>(&self, error: &E) -> bool {
        if let Some(explicit) = error.retryable() {
            return explicit;
        }

        if let Some(status) = error.status() {
            if (400..500).contains(&status) {
                return false;
            }
        }

        if let Some(code) = error.code() {
            if self
                .retryable_errors
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(code))
            {
                return true;
            }
        }

        if matches!(error.status(), Some(status) if status >= 500) {
            return true;
        }

        let message = error.to_string().to_lowercase();
        TRANSIENT_PATTERNS
            .iter()
            .any(|pattern| message.contains(pattern))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn with_retry<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify,
    {
        self.with_retry_config(operation, &self.config).await
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `config.max_attempts` is reached. The last error is returned as is.
    ///
    /// Dropping the returned future cancels any pending backoff sleep, so no
    /// further attempt is scheduled.
    pub async fn with_retry_config<T, E, F, Fut>(
        &self,
        mut operation: F,
        config: &RetryConfig,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryClassify,
    {
        let max_attempts = config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Operation succeeded on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !config.is_retryable(&error) {
                        debug!("Non-retryable error on attempt {}: {}", attempt, error);
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        warn!("Giving up after {} attempts: {}", attempt, error);
                        return Err(error);
                    }

                    let delay = config.delay_for_retry(attempt);
                    debug!(
                        "Attempt {} failed: {}, retrying in {:?}",
                        attempt, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
