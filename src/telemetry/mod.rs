//! Telemetry for limiter decisions.
//!
//! The limiter and the admission gate emit structured [`LimiterEvent`]s alongside their
//! `tracing` logs. Events flow through [`TelemetrySink`] implementations, which are plain
//! `tower::Service<LimiterEvent>`s, so sinks compose with ordinary tower tooling.
//!
//! Emission is best-effort: a sink that is not ready or fails never affects an admission
//! decision.

pub mod events;
pub mod sinks;

pub use events::LimiterEvent;
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
