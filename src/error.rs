//! Error types for the limiter and its middleware
use std::time::Duration;

/// Boxed error produced by a [`StateStore`](crate::store::StateStore) backend.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by counters, the request limiter and the admission gate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum LimiterError {
    /// The shared state store failed; the original error is kept as the source.
    #[error("state store: {0}")]
    Store(#[source] StoreError),
    /// A stored value could not be encoded or decoded.
    #[error("state codec for key '{key}': {source}")]
    Codec {
        /// Storage key involved.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// A polling caller ran out of attempts before the limiter admitted the call.
    #[error("timed out waiting for a request slot for '{method}' after {attempts} attempts ({waited:?})")]
    TimedOut {
        /// Method that was being admitted.
        method: String,
        /// Number of refused checks.
        attempts: usize,
        /// Total time spent sleeping between checks.
        waited: Duration,
    },
    /// A tier label did not name one of the three tiers.
    #[error("unknown tier '{0}' (expected particular, difference or groups)")]
    UnknownTier(String),
    /// Poll settings were rejected.
    #[error("invalid poll config: {0}")]
    InvalidPoll(&'static str),
}

impl LimiterError {
    /// Wrap a store backend error.
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LimiterError::Store(Box::new(err))
    }

    /// Check if this error came from the store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Check if a polling caller gave up.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Error returned by [`ThrottleService`](crate::middleware::ThrottleService).
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ThrottleError<E> {
    /// Admission failed (store error or poll timeout); the inner service was not called.
    #[error("throttle: {0}")]
    Limiter(#[from] LimiterError),
    /// The wrapped service failed after admission.
    #[error("{0}")]
    Inner(E),
}

impl<E> ThrottleError<E> {
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Limiter(_) => None,
        }
    }

    /// Borrow the limiter error if admission failed.
    pub fn as_limiter(&self) -> Option<&LimiterError> {
        match self {
            Self::Limiter(e) => Some(e),
            Self::Inner(_) => None,
        }
    }
}
