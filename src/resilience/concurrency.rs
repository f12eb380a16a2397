//! Bounded in-flight operations per provider and per folder.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::application::error::StorageError;

pub fn provider_key(provider: &str) -> String {
    format!("provider:{}", provider)
}

pub fn folder_key(folder: &str) -> String {
    format!("folder:{}", folder)
}

#[derive(Debug)]
struct Slot {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Keyed bulkheads. Waiters are served in FIFO order (tokio semaphores are
/// fair); waiting longer than the queue timeout fails with
/// [`StorageError::Busy`].
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    default_limit: usize,
    queue_timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConcurrencyLimiter {
    pub fn new(default_limit: usize, queue_timeout: Duration) -> Self {
        Self {
            default_limit: default_limit.max(1),
            queue_timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Sets an explicit limit for `key`. Permits already handed out stay
    /// valid; the new limit applies to later acquisitions.
    pub fn set_limit(&self, key: &str, limit: usize) {
        let limit = limit.max(1);
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        let replace = slots.get(key).map(|slot| slot.limit != limit).unwrap_or(true);
        if replace {
            slots.insert(
                key.to_string(),
                Slot {
                    semaphore: Arc::new(Semaphore::new(limit)),
                    limit,
                },
            );
        }
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .entry(key.to_string())
            .or_insert_with(|| Slot {
                semaphore: Arc::new(Semaphore::new(self.default_limit)),
                limit: self.default_limit,
            })
            .semaphore
            .clone()
    }

    pub async fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit, StorageError> {
        let semaphore = self.semaphore(key);

        match tokio::time::timeout(self.queue_timeout, semaphore.acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!("Acquired concurrency slot for '{}'", key);
                Ok(permit)
            }
            Ok(Err(_)) => Err(StorageError::Internal(format!(
                "concurrency limiter for '{}' was closed",
                key
            ))),
            Err(_) => {
                warn!(
                    "Timed out after {:?} waiting for a concurrency slot on '{}'",
                    self.queue_timeout, key
                );
                Err(StorageError::Busy(format!(
                    "no free slot for '{}' within {:?}",
                    key, self.queue_timeout
                )))
            }
        }
    }

    pub async fn run<T, F>(&self, key: &str, operation: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let _permit = self.acquire(key).await?;
        operation.await
    }

    pub fn in_flight(&self, key: &str) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .get(key)
            .map(|slot| slot.limit.saturating_sub(slot.semaphore.available_permits()))
            .unwrap_or(0)
    }

    pub fn limit(&self, key: &str) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots
            .get(key)
            .map(|slot| slot.limit)
            .unwrap_or(self.default_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_limits_in_flight_operations() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2, Duration::from_secs(60)));
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            let peak = peak.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run("provider:s3", async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, StorageError>(())
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.in_flight("provider:s3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_returns_busy() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(500));
        let held = limiter.acquire("folder:public").await.unwrap();
        assert_eq!(limiter.in_flight("folder:public"), 1);

        let result = limiter.acquire("folder:public").await;
        assert!(matches!(result, Err(StorageError::Busy(_))));

        drop(held);
        assert!(limiter.acquire("folder:public").await.is_ok());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(10));
        limiter.set_limit("folder:bulk", 3);

        let _a = limiter.acquire("provider:local").await.unwrap();
        let _b = limiter.acquire("provider:s3").await.unwrap();
        assert_eq!(limiter.limit("folder:bulk"), 3);
        assert_eq!(limiter.limit("provider:azure"), 1);
    }
}
