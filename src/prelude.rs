//! Convenient re-exports for common tierlimit types.
pub use crate::{
    admission::{AdmissionGate, PollConfig},
    call::{Classify, OutboundCall},
    config::{LimiterConfig, Tier, TierLimits},
    error::{LimiterError, ThrottleError},
    limiter::RequestLimiter,
    middleware::ThrottleLayer,
    store::{InMemoryStore, StateStore},
    telemetry::{LimiterEvent, LogSink, MemorySink, NullSink},
};
