//! Bounded polling until the limiter admits a call.
//!
//! The limiter itself only reports waits. [`AdmissionGate`] is the caller-side loop that an
//! outbound request layer runs right before dispatch: check-and-record, and on refusal sleep
//! the poll interval and try again, giving up with [`LimiterError::TimedOut`] after
//! `max_attempts` refusals.
//!
//! A gate can be switched off at runtime with [`AdmissionGate::set_enabled`]; while disabled,
//! every call is admitted immediately and no counter is read or written. The switch is shared by
//! all clones of a gate, including the ones held inside a [`ThrottleLayer`](crate::ThrottleLayer)
//! stack.
//!
//! Invariants:
//! - At most one event is recorded per admitted call.
//! - A call is never reported admitted without having been recorded.
//! - The sleeper is invoked at most `max_attempts - 1` times.

use crate::call::OutboundCall;
use crate::error::LimiterError;
use crate::limiter::RequestLimiter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::store::StateStore;
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often and how long a gate polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    max_attempts: usize,
    interval: Duration,
}

impl Default for PollConfig {
    /// 60 checks one second apart.
    fn default() -> Self {
        Self { max_attempts: 60, interval: Duration::from_secs(1) }
    }
}

impl PollConfig {
    /// Validated poll settings; both values must be non-zero.
    pub fn new(max_attempts: usize, interval: Duration) -> Result<Self, LimiterError> {
        if max_attempts == 0 {
            return Err(LimiterError::InvalidPoll("max_attempts must be > 0"));
        }
        if interval.is_zero() {
            return Err(LimiterError::InvalidPoll("interval must be > 0"));
        }
        Ok(Self { max_attempts, interval })
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Polls a shared [`RequestLimiter`] until a call is admitted.
pub struct AdmissionGate<S, K = NullSink> {
    limiter: Arc<RequestLimiter<S, K>>,
    poll: PollConfig,
    sleeper: Arc<dyn Sleeper>,
    enabled: Arc<AtomicBool>,
}

impl<S, K> Clone for AdmissionGate<S, K> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            poll: self.poll,
            sleeper: self.sleeper.clone(),
            enabled: self.enabled.clone(),
        }
    }
}

impl<S, K> std::fmt::Debug for AdmissionGate<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("poll", &self.poll)
            .field("sleeper", &self.sleeper)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<S, K> AdmissionGate<S, K> {
    /// Turn limiting on or off for this gate and every clone of it.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            tracing::info!(target: "tierlimit::admission", enabled, "admission gate toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl<S, K> AdmissionGate<S, K>
where
    S: StateStore + 'static,
    K: TelemetrySink,
    K::Future: Send + 'static,
{
    /// Gate with the default poll settings and a tokio sleeper.
    pub fn new(limiter: Arc<RequestLimiter<S, K>>) -> Self {
        Self {
            limiter,
            poll: PollConfig::default(),
            sleeper: Arc::new(TokioSleeper),
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Override the sleeper (useful for deterministic tests).
    pub fn with_sleeper<Z: Sleeper + 'static>(mut self, sleeper: Z) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn limiter(&self) -> &Arc<RequestLimiter<S, K>> {
        &self.limiter
    }

    pub fn poll(&self) -> PollConfig {
        self.poll
    }

    /// Wait until `call` is admitted and recorded. Returns the total time slept.
    ///
    /// A disabled gate returns `Duration::ZERO` at once without touching the limiter.
    ///
    /// # Errors
    /// - [`LimiterError::TimedOut`] after `max_attempts` refusals.
    /// - Store errors from the limiter, unmodified.
    pub async fn acquire(&self, call: &OutboundCall) -> Result<Duration, LimiterError> {
        if !self.is_enabled() {
            return Ok(Duration::ZERO);
        }
        let mut waited = Duration::ZERO;
        for attempt in 1..=self.poll.max_attempts {
            let wait = self.limiter.check_and_increase(call).await?;
            if wait == 0 {
                if attempt > 1 {
                    tracing::debug!(target: "tierlimit::admission", method = %call.method, attempt, ?waited, "admitted after waiting");
                }
                return Ok(waited);
            }
            if attempt < self.poll.max_attempts {
                self.sleeper.sleep(self.poll.interval).await;
                waited += self.poll.interval;
            }
        }

        tracing::warn!(
            target: "tierlimit::admission",
            method = %call.method,
            chat_id = ?call.chat_id,
            attempts = self.poll.max_attempts,
            ?waited,
            "timed out while waiting for a request slot"
        );
        emit_best_effort(
            self.limiter.sink().clone(),
            LimiterEvent::PollExhausted {
                method: call.method.clone(),
                attempts: self.poll.max_attempts,
            },
        )
        .await;
        Err(LimiterError::TimedOut {
            method: call.method.clone(),
            attempts: self.poll.max_attempts,
            waited,
        })
    }
}
