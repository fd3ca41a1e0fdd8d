use crate::config::Tier;
use std::fmt;
use std::time::Duration;

/// Events emitted by the limiter and the admission gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterEvent {
    /// A check found at least one applicable tier saturated.
    Throttled {
        /// Method being checked.
        method: String,
        /// Tier with the longest remaining window.
        tier: Tier,
        /// Wait reported to the caller.
        wait: Duration,
    },
    /// One event was recorded against the applicable tiers.
    Recorded {
        /// Method being recorded.
        method: String,
        /// Whether the groups tier was incremented.
        groups: bool,
        /// Whether a particular counter was incremented.
        particular: bool,
    },
    /// Counters were force-reset.
    Reset {
        /// Recipient whose particular counter was reset, if any.
        chat_id: Option<i64>,
    },
    /// A polling caller gave up.
    PollExhausted {
        /// Method that was never admitted.
        method: String,
        /// Number of refused checks.
        attempts: usize,
    },
}

impl fmt::Display for LimiterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterEvent::Throttled { method, tier, wait } => {
                write!(f, "Throttled({}, tier={}, wait={:?})", method, tier, wait)
            }
            LimiterEvent::Recorded { method, groups, particular } => {
                write!(f, "Recorded({}, groups={}, particular={})", method, groups, particular)
            }
            LimiterEvent::Reset { chat_id: Some(id) } => write!(f, "Reset(chat={})", id),
            LimiterEvent::Reset { chat_id: None } => write!(f, "Reset(shared)"),
            LimiterEvent::PollExhausted { method, attempts } => {
                write!(f, "PollExhausted({}, attempts={})", method, attempts)
            }
        }
    }
}
