//! Fixed-window counters.
//!
//! [`WindowState`] is the plain, serializable record: key, capacity, window length, count and the
//! three timestamps. All of its time-dependent methods take `now` explicitly, which keeps the
//! expiry rules pure and easy to test.
//!
//! [`WindowCounter`] binds a state to a [`StateStore`] and a [`Clock`]. Every accessor on it is
//! self-healing: it first resets a window whose `destroy_at` has passed, persists the result with
//! the remaining lifetime as store expiry, and only then reports a value.
//!
//! Invariants:
//! - `destroy_at == created_at + ttl` right after creation or reset.
//! - A reset always returns the counter to [`WindowState::BASELINE`].
//! - An expired window is healed before a step is added, so the step counts in the new window.

use crate::clock::Clock;
use crate::error::LimiterError;
use crate::store::StateStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Plain window record as stored in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    key: String,
    max: u64,
    ttl: u64,
    counter: u64,
    created_at: u64,
    updated_at: u64,
    destroy_at: u64,
}

impl WindowState {
    /// Counter value after a reset.
    pub const BASELINE: u64 = 0;

    /// Fresh window starting at `now` (unix ms) and lasting `ttl_secs`.
    pub fn new(key: impl Into<String>, max: u64, ttl_secs: u64, now: u64) -> Self {
        let mut state = Self {
            key: key.into(),
            max,
            ttl: ttl_secs,
            counter: Self::BASELINE,
            created_at: now,
            updated_at: now,
            destroy_at: now,
        };
        state.reset(now);
        state
    }

    /// Signed milliseconds until the window ends; zero or negative once expired.
    pub fn time_left(&self, now: u64) -> i64 {
        let diff = i128::from(self.destroy_at) - i128::from(now);
        diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.time_left(now) <= 0
    }

    /// Remaining lifetime as a store expiry, floored at zero.
    pub fn remaining(&self, now: u64) -> Duration {
        Duration::from_millis(u64::try_from(self.time_left(now)).unwrap_or(0))
    }

    /// Reset if the window has expired. Returns whether a reset happened.
    pub fn refresh(&mut self, now: u64) -> bool {
        if self.is_expired(now) {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Restart the window at `now` with the counter at [`Self::BASELINE`].
    pub fn reset(&mut self, now: u64) {
        self.counter = Self::BASELINE;
        self.created_at = now;
        self.updated_at = now;
        self.destroy_at = now.saturating_add(self.ttl.saturating_mul(1_000));
    }

    /// Add `step` events, healing an expired window first.
    pub fn increment(&mut self, step: u64, now: u64) {
        self.refresh(now);
        self.counter = self.counter.saturating_add(step);
        self.updated_at = now;
    }

    /// `counter < than` (defaults to `max`). Does not heal.
    pub fn is_less(&self, than: Option<u64>) -> bool {
        self.counter < than.unwrap_or(self.max)
    }

    /// `counter <= than` (defaults to `max`). Does not heal.
    pub fn is_less_or_equal(&self, than: Option<u64>) -> bool {
        self.counter <= than.unwrap_or(self.max)
    }

    /// `counter > than` (defaults to `max`). Does not heal.
    pub fn is_more(&self, than: Option<u64>) -> bool {
        self.counter > than.unwrap_or(self.max)
    }

    /// `counter >= than` (defaults to `max`). Does not heal.
    pub fn is_more_or_equal(&self, than: Option<u64>) -> bool {
        self.counter >= than.unwrap_or(self.max)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = key.into();
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn set_max(&mut self, max: u64) {
        self.max = max;
    }

    /// Window length in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Change the window length. Takes effect at the next reset.
    pub fn set_ttl(&mut self, ttl_secs: u64) {
        self.ttl = ttl_secs;
    }

    /// Raw count, without healing.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn set_created_at(&mut self, millis: u64) {
        self.created_at = millis;
    }

    pub fn updated_at(&self) -> u64 {
        self.updated_at
    }

    pub fn set_updated_at(&mut self, millis: u64) {
        self.updated_at = millis;
    }

    pub fn destroy_at(&self) -> u64 {
        self.destroy_at
    }

    pub fn set_destroy_at(&mut self, millis: u64) {
        self.destroy_at = millis;
    }

    pub(crate) fn encode(&self) -> Result<String, LimiterError> {
        serde_json::to_string(self)
            .map_err(|source| LimiterError::Codec { key: self.key.clone(), source })
    }

    pub(crate) fn decode(key: &str, raw: &str) -> Result<Self, LimiterError> {
        serde_json::from_str(raw).map_err(|source| LimiterError::Codec { key: key.to_string(), source })
    }
}

/// A window counter persisted under its own key.
///
/// Cloning copies the in-memory state; both copies write to the same store key.
pub struct WindowCounter<S> {
    state: WindowState,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for WindowCounter<S> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone(), store: self.store.clone(), clock: self.clock.clone() }
    }
}

impl<S> std::fmt::Debug for WindowCounter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCounter")
            .field("state", &self.state)
            .field("store", &"<store>")
            .field("clock", &self.clock)
            .finish()
    }
}

impl<S> WindowCounter<S>
where
    S: StateStore + 'static,
{
    /// Load `key` from the store, or start a fresh window if it is absent. Always touches.
    pub async fn get_or_create(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        max: u64,
        ttl_secs: u64,
    ) -> Result<Self, LimiterError> {
        let key = key.into();
        let raw = store.get(&key).await.map_err(LimiterError::store)?;
        let state = match raw {
            Some(raw) => WindowState::decode(&key, &raw)?,
            None => WindowState::new(key, max, ttl_secs, clock.now_millis()),
        };
        let mut counter = Self { state, store, clock };
        counter.touch().await?;
        Ok(counter)
    }

    /// Build an unsaved fresh window. Nothing is written until a mutating call or [`Self::save`].
    pub fn detached(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
        max: u64,
        ttl_secs: u64,
    ) -> Self {
        let state = WindowState::new(key, max, ttl_secs, clock.now_millis());
        Self { state, store, clock }
    }

    /// Heal an expired window, then persist with the remaining lifetime as expiry.
    pub async fn touch(&mut self) -> Result<(), LimiterError> {
        let now = self.clock.now_millis();
        if self.state.refresh(now) {
            tracing::trace!(target: "tierlimit::window", key = %self.state.key(), "window expired; reset");
        }
        self.save().await
    }

    /// Write the current state without healing.
    pub async fn save(&self) -> Result<(), LimiterError> {
        let ttl = self.state.remaining(self.clock.now_millis());
        let value = self.state.encode()?;
        self.store.put(self.state.key(), value, ttl).await.map_err(LimiterError::store)
    }

    /// Restart the window now and persist it.
    pub async fn reset(&mut self) -> Result<(), LimiterError> {
        self.state.reset(self.clock.now_millis());
        self.save().await
    }

    pub async fn increment(&mut self, step: u64) -> Result<(), LimiterError> {
        self.state.increment(step, self.clock.now_millis());
        self.touch().await
    }

    /// Increment only when `predicate` holds; otherwise leaves the store untouched.
    pub async fn increment_if<F>(&mut self, predicate: F, step: u64) -> Result<(), LimiterError>
    where
        F: FnOnce() -> bool,
    {
        if predicate() {
            self.increment(step).await?;
        }
        Ok(())
    }

    /// Milliseconds until the (healed) window ends.
    pub async fn time_left(&mut self) -> Result<i64, LimiterError> {
        self.touch().await?;
        Ok(self.state.time_left(self.clock.now_millis()))
    }

    pub async fn counter(&mut self) -> Result<u64, LimiterError> {
        self.touch().await?;
        Ok(self.state.counter())
    }

    pub async fn is_less(&mut self, than: Option<u64>) -> Result<bool, LimiterError> {
        self.touch().await?;
        Ok(self.state.is_less(than))
    }

    pub async fn is_less_or_equal(&mut self, than: Option<u64>) -> Result<bool, LimiterError> {
        self.touch().await?;
        Ok(self.state.is_less_or_equal(than))
    }

    pub async fn is_more(&mut self, than: Option<u64>) -> Result<bool, LimiterError> {
        self.touch().await?;
        Ok(self.state.is_more(than))
    }

    pub async fn is_more_or_equal(&mut self, than: Option<u64>) -> Result<bool, LimiterError> {
        self.touch().await?;
        Ok(self.state.is_more_or_equal(than))
    }

    /// Raw state snapshot, without healing.
    pub fn state(&self) -> &WindowState {
        &self.state
    }

    /// Mutable access for the attribute setters; changes are persisted by the next touch or save.
    pub fn state_mut(&mut self) -> &mut WindowState {
        &mut self.state
    }

    pub fn into_state(self) -> WindowState {
        self.state
    }
}
