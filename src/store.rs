//! Shared state storage for window counters.
//!
//! Values are opaque strings (JSON documents produced by the counter codecs) stored with a
//! per-key expiry, so any cache with `GET`/`SET PX` semantics can back the limiter.

use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Abstract storage interface for limiter state.
///
/// Implementations need not be atomic across `get`/`put`; the limiter tolerates lost updates
/// between concurrent writers of the same key.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// A zero `ttl` means the value is already stale; backends may drop it immediately.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), Self::Error>;
}

#[async_trait]
impl<T> StateStore for Arc<T>
where
    T: StateStore + ?Sized,
{
    type Error = T::Error;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), Self::Error> {
        (**self).put(key, value, ttl).await
    }
}

/// Expired entries are swept from the map at most this often (ms).
const SWEEP_EVERY_MILLIS: u64 = 60_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: u64,
}

#[derive(Debug, Default)]
struct Shelf {
    entries: HashMap<String, Entry>,
    swept_at: u64,
}

impl Shelf {
    /// Drop expired entries once the sweep interval has passed since the last sweep.
    fn sweep(&mut self, now: u64) {
        if now < self.swept_at.saturating_add(SWEEP_EVERY_MILLIS) {
            return;
        }
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        self.swept_at = now;
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::trace!(target: "tierlimit::store", dropped, kept = self.entries.len(), "expired entries swept");
        }
    }
}

/// In-memory store with per-key expiry. Clones share the same map.
///
/// Expired entries are removed when read, and in bulk by a periodic sweep on write, so keys
/// for recipients that are never contacted again do not accumulate.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    data: Arc<Mutex<Shelf>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Store whose expiry follows `clock` (use the limiter's clock in tests).
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { data: Arc::default(), clock: Arc::new(clock) }
    }

    /// Whether a live (unexpired) value exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        self.lock().entries.get(key).is_some_and(|e| e.expires_at > now)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.lock().entries.values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn flush(&self) {
        self.lock().entries.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shelf> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    type Error = std::convert::Infallible;

    async fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.lock();
        match guard.entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                guard.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), Self::Error> {
        let now = self.clock.now_millis();
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let mut guard = self.lock();
        guard.sweep(now);
        if ttl_millis == 0 {
            guard.entries.remove(key);
        } else {
            guard
                .entries
                .insert(key.to_string(), Entry { value, expires_at: now.saturating_add(ttl_millis) });
        }
        Ok(())
    }
}
