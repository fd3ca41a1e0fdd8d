//! Limiter configuration: tier ceilings, the queue label, and the closed set of limited methods.
//!
//! [`LiveConfig`] wraps the configuration in an `ArcSwap` so a shared limiter can be retuned
//! through `&self` while every operation works from one consistent snapshot.

use crate::error::LimiterError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// One of the three independent ceilings tracked by the limiter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    /// Per-recipient counter.
    Particular,
    /// Aggregate traffic across distinct destinations.
    Difference,
    /// Traffic into groups and channels.
    Groups,
}

impl Tier {
    /// Parse a tier label, reporting unknown labels as a usage error.
    pub fn parse(label: &str) -> Result<Self, LimiterError> {
        Tier::from_str(label).map_err(|_| LimiterError::UnknownTier(label.to_string()))
    }
}

/// Outbound methods that consume send quota or mutate recipient-visible state.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum LimitedMethod {
    SendMessage,
    ForwardMessage,
    CopyMessage,
    SendPhoto,
    SendAudio,
    SendDocument,
    SendSticker,
    SendVideo,
    SendAnimation,
    SendVoice,
    SendVideoNote,
    SendMediaGroup,
    SendLocation,
    EditMessageLiveLocation,
    StopMessageLiveLocation,
    SendVenue,
    SendContact,
    SendPoll,
    SendDice,
    SendInvoice,
    SendGame,
    SetGameScore,
    SetMyCommands,
    DeleteMyCommands,
    EditMessageText,
    EditMessageCaption,
    EditMessageMedia,
    EditMessageReplyMarkup,
    StopPoll,
    SetChatTitle,
    SetChatDescription,
    SetChatStickerSet,
    DeleteChatStickerSet,
    SetPassportDataErrors,
}

impl LimitedMethod {
    /// Exact, case-sensitive lookup of an API method name.
    pub fn lookup(method: &str) -> Option<Self> {
        LimitedMethod::from_str(method).ok()
    }
}

/// `requests` events allowed per `per_secs` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub requests: u64,
    pub per_secs: u64,
}

impl TierLimits {
    pub const fn new(requests: u64, per_secs: u64) -> Self {
        Self { requests, per_secs }
    }
}

/// Tier ceilings and key partition for a [`RequestLimiter`](crate::RequestLimiter).
///
/// Defaults: one message per second to a particular chat, 30 messages per second across
/// different chats, 20 messages per minute into groups and channels, empty queue label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub particular: TierLimits,
    pub difference: TierLimits,
    pub groups: TierLimits,
    /// Prefix applied to every storage key.
    pub queue: String,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            particular: TierLimits::new(1, 1),
            difference: TierLimits::new(30, 1),
            groups: TierLimits::new(20, 60),
            queue: String::new(),
        }
    }
}

impl LimiterConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, LimiterError> {
        serde_json::from_str(raw)
            .map_err(|source| LimiterError::Codec { key: "<config>".to_string(), source })
    }

    pub fn limits(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Particular => self.particular,
            Tier::Difference => self.difference,
            Tier::Groups => self.groups,
        }
    }

    pub fn set_limits(&mut self, tier: Tier, limits: TierLimits) {
        match tier {
            Tier::Particular => self.particular = limits,
            Tier::Difference => self.difference = limits,
            Tier::Groups => self.groups = limits,
        }
    }

    /// Store key of the groups/difference pair.
    pub fn group_key(&self) -> String {
        format!("{}limiter", self.queue)
    }

    /// Store key of a per-recipient counter; `None` names the shared default counter.
    pub fn particular_key(&self, chat_id: Option<i64>) -> String {
        match chat_id {
            Some(id) => format!("{}limiter_for_{}", self.queue, id),
            None => format!("{}limiter_for_", self.queue),
        }
    }
}

/// Live-updatable configuration handle. Clones share the same value.
///
/// Reads are lock-free snapshots; writes retry until they apply on top of the latest value.
#[derive(Debug)]
pub struct LiveConfig<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Clone for LiveConfig<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> LiveConfig<T> {
    pub fn new(value: T) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(value)) }
    }

    /// Snapshot the current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replace the value entirely.
    pub fn set(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    /// Copy-on-write update through `ArcSwap::rcu`.
    ///
    /// If another writer swaps the value in between, `f` is re-applied to the newer value, so
    /// concurrent updates of different fields are never lost. `f` may therefore run more than once.
    pub fn update<F>(&self, f: F)
    where
        F: Fn(&mut T),
        T: Clone,
    {
        self.inner.rcu(|current| {
            let mut next = T::clone(current);
            f(&mut next);
            next
        });
    }
}
