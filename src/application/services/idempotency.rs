use std::{
    collections::HashMap,
    sync::Mutex,
    time::Duration,
};

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_IDEMPOTENCY_CAPACITY: usize = 10_000;

/// Idempotency keys are scoped per folder.
type ScopedKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Pending,
    Stored(Uuid),
}

#[derive(Debug, Clone, Copy)]
struct KeyEntry {
    state: KeyState,
    recorded_at: Instant,
}

/// Outcome of [`IdempotencyRegistry::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The caller owns the key until the claim is completed or dropped.
    Fresh(IdempotencyClaim<'a>),
    /// An upload with this key already produced the given file.
    Stored(Uuid),
    /// Another upload with this key has not finished yet.
    InProgress,
}

/// A pending key. Dropping it without [`complete`](Self::complete) frees the
/// key again, so failed or cancelled uploads can be retried.
#[must_use]
#[derive(Debug)]
pub struct IdempotencyClaim<'a> {
    registry: &'a IdempotencyRegistry,
    key: ScopedKey,
    completed: bool,
}

impl IdempotencyClaim<'_> {
    pub fn complete(mut self, id: Uuid) {
        self.completed = true;
        let mut entries = self.registry.lock();
        entries.insert(
            self.key.clone(),
            KeyEntry {
                state: KeyState::Stored(id),
                recorded_at: Instant::now(),
            },
        );
    }
}

impl Drop for IdempotencyClaim<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut entries = self.registry.lock();
        if matches!(entries.get(&self.key), Some(entry) if entry.state == KeyState::Pending) {
            entries.remove(&self.key);
        }
    }
}

/// Remembers which file an idempotency key produced. Stored keys expire
/// after `ttl`; past `capacity` the oldest stored keys are evicted.
#[derive(Debug)]
pub struct IdempotencyRegistry {
    entries: Mutex<HashMap<ScopedKey, KeyEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for IdempotencyRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_IDEMPOTENCY_TTL, DEFAULT_IDEMPOTENCY_CAPACITY)
    }
}

impl IdempotencyRegistry {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ScopedKey, KeyEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Looks the key up and, when unknown, marks it pending in the same
    /// critical section.
    pub fn claim(&self, folder: &str, key: &str) -> Claim<'_> {
        let scoped = (folder.to_string(), key.to_string());
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get(&scoped) {
            Some(entry) if entry.state == KeyState::Pending => return Claim::InProgress,
            Some(KeyEntry {
                state: KeyState::Stored(id),
                recorded_at,
            }) if now.duration_since(*recorded_at) < self.ttl => return Claim::Stored(*id),
            _ => {}
        }

        self.prune(&mut entries, now);
        entries.insert(
            scoped.clone(),
            KeyEntry {
                state: KeyState::Pending,
                recorded_at: now,
            },
        );

        Claim::Fresh(IdempotencyClaim {
            registry: self,
            key: scoped,
            completed: false,
        })
    }

    /// Forgets a stored key whose file no longer exists.
    pub fn forget(&self, folder: &str, key: &str) {
        let scoped = (folder.to_string(), key.to_string());
        let mut entries = self.lock();
        if matches!(entries.get(&scoped), Some(entry) if entry.state != KeyState::Pending) {
            entries.remove(&scoped);
        }
    }

    /// Forgets every key that produced `id`.
    pub fn forget_file(&self, id: Uuid) {
        self.lock()
            .retain(|_, entry| entry.state != KeyState::Stored(id));
    }

    fn prune(&self, entries: &mut HashMap<ScopedKey, KeyEntry>, now: Instant) {
        entries.retain(|_, entry| {
            entry.state == KeyState::Pending || now.duration_since(entry.recorded_at) < self.ttl
        });

        while entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .filter(|(_, entry)| entry.state != KeyState::Pending)
                .min_by_key(|(_, entry)| entry.recorded_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting idempotency key {:?}", key);
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
