//! The groups/difference counter pair, stored as one value.

use crate::error::LimiterError;
use crate::window::WindowState;
use serde::{Deserialize, Serialize};

/// Global counters shared by every recipient in a queue partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterGroup {
    /// Traffic into groups and channels.
    pub groups: WindowState,
    /// Traffic across distinct destinations of any kind.
    pub difference: WindowState,
}

impl LimiterGroup {
    pub fn new(groups: WindowState, difference: WindowState) -> Self {
        Self { groups, difference }
    }

    /// Heal both members against `now`.
    pub fn refresh(&mut self, now: u64) {
        self.groups.refresh(now);
        self.difference.refresh(now);
    }

    /// Restart both windows at `now`.
    pub fn reset(&mut self, now: u64) {
        self.groups.reset(now);
        self.difference.reset(now);
    }

    pub(crate) fn encode(&self, key: &str) -> Result<String, LimiterError> {
        serde_json::to_string(self)
            .map_err(|source| LimiterError::Codec { key: key.to_string(), source })
    }

    pub(crate) fn decode(key: &str, raw: &str) -> Result<Self, LimiterError> {
        serde_json::from_str(raw).map_err(|source| LimiterError::Codec { key: key.to_string(), source })
    }
}
