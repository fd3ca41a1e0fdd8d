#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tierlimit
//!
//! Multi-tier fixed-window limiting for outbound bot API calls.
//!
//! ## Features
//!
//! - **Three tiers**: per recipient, per groups-and-channels, and across all destinations
//! - **Self-healing windows** that restart on the first access after they expire
//! - **Pluggable state** via the async [`StateStore`] trait (in-memory included, Redis in
//!   `tierlimit-redis`)
//! - **Queue partitions** so independent dispatch queues never share counters
//! - **Admission gate** with bounded polling, plus a tower [`ThrottleLayer`]
//! - **Telemetry sinks** built on `tower::Service`
//!
//! ## Quick Start
//!
//! ```rust
//! use tierlimit::{InMemoryStore, OutboundCall, RequestLimiter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tierlimit::LimiterError> {
//!     let limiter = RequestLimiter::new(InMemoryStore::new());
//!     let call = OutboundCall::new("sendMessage").to_chat(42);
//!
//!     // One message per second per chat by default.
//!     assert_eq!(limiter.check_and_increase(&call).await?, 0);
//!     assert_eq!(limiter.check_limit(&call).await?, 1);
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod call;
pub mod clock;
pub mod config;
pub mod error;
pub mod group;
pub mod limiter;
pub mod middleware;
pub mod prelude;
pub mod sleeper;
pub mod store;
pub mod telemetry;
pub mod window;

// Re-exports
pub use admission::{AdmissionGate, PollConfig};
pub use call::{Classify, OutboundCall};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LimitedMethod, LimiterConfig, LiveConfig, Tier, TierLimits};
pub use error::{LimiterError, StoreError, ThrottleError};
pub use group::LimiterGroup;
pub use limiter::RequestLimiter;
pub use middleware::{ThrottleLayer, ThrottleService};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use store::{InMemoryStore, StateStore};
pub use telemetry::{LimiterEvent, LogSink, MemorySink, NullSink, TelemetrySink};
pub use window::{WindowCounter, WindowState};
