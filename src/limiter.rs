//! The request limiter: classifies outbound calls and enforces three fixed-window tiers.
//!
//! Tiers:
//! - **particular**: one counter per recipient chat id.
//! - **groups**: one counter for all traffic into groups and channels (negative chat ids or
//!   inline messages).
//! - **difference**: one counter for all limited traffic regardless of destination.
//!
//! Semantics:
//! - Calls to methods outside [`LimitedMethod`](crate::LimitedMethod), or calls without a
//!   recipient, are never limited: checks return 0 and nothing is recorded.
//! - A tier is saturated when its counter is not below the *currently configured* request
//!   ceiling; persisted windows keep the `max`/`ttl` they were created with.
//! - [`RequestLimiter::check_limit`] reports the longest remaining window among the saturated,
//!   applicable tiers, rounded up to whole seconds.
//! - Every storage key is prefixed with the configured queue label, so different labels never
//!   share counters.
//!
//! Store access is read-modify-write without compare-and-swap. Concurrent writers of the same key
//! can lose updates; the limiter is a best-effort traffic shaper.

use crate::call::OutboundCall;
use crate::clock::{Clock, SystemClock};
use crate::config::{LimiterConfig, LiveConfig, Tier, TierLimits};
use crate::error::LimiterError;
use crate::group::LimiterGroup;
use crate::store::StateStore;
use crate::telemetry::{emit_best_effort, LimiterEvent, NullSink, TelemetrySink};
use crate::window::{WindowCounter, WindowState};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Multi-tier limiter over a shared [`StateStore`].
///
/// Clones share the store, clock, sink and live configuration.
pub struct RequestLimiter<S, K = NullSink> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: LiveConfig<LimiterConfig>,
    sink: K,
}

impl<S, K: Clone> Clone for RequestLimiter<S, K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            sink: self.sink.clone(),
        }
    }
}

impl<S, K> std::fmt::Debug for RequestLimiter<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("config", &self.config.get())
            .field("clock", &self.clock)
            .field("store", &"<store>")
            .field("sink", &"<sink>")
            .finish()
    }
}

impl<S> RequestLimiter<S, NullSink>
where
    S: StateStore + 'static,
{
    /// Limiter with default tier ceilings and no queue label.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LimiterConfig::default())
    }

    pub fn with_config(store: S, config: LimiterConfig) -> Self {
        Self {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            config: LiveConfig::new(config),
            sink: NullSink,
        }
    }
}

impl<S, K> RequestLimiter<S, K> {
    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Route limiter events to `sink`.
    pub fn with_sink<K2: TelemetrySink>(self, sink: K2) -> RequestLimiter<S, K2> {
        RequestLimiter { store: self.store, clock: self.clock, config: self.config, sink }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> Arc<LimiterConfig> {
        self.config.get()
    }

    pub fn set_particular_limits(&self, requests: u64, per_secs: u64) {
        self.set_limits(Tier::Particular, TierLimits::new(requests, per_secs));
    }

    pub fn set_difference_limits(&self, requests: u64, per_secs: u64) {
        self.set_limits(Tier::Difference, TierLimits::new(requests, per_secs));
    }

    pub fn set_groups_and_channels_limits(&self, requests: u64, per_secs: u64) {
        self.set_limits(Tier::Groups, TierLimits::new(requests, per_secs));
    }

    /// Reconfigure one tier. Counters that already exist keep their window length until reset.
    pub fn set_limits(&self, tier: Tier, limits: TierLimits) {
        debug!(target: "tierlimit::limiter", %tier, requests = limits.requests, per_secs = limits.per_secs, "tier limits updated");
        self.config.update(|cfg| cfg.set_limits(tier, limits));
    }

    /// Switch every subsequent operation to the counter partition named `label`.
    pub fn set_queue(&self, label: impl Into<String>) {
        let label = label.into();
        debug!(target: "tierlimit::limiter", queue = %label, "queue switched");
        self.config.update(|cfg| cfg.queue.clone_from(&label));
    }

    pub fn queue(&self) -> String {
        self.config.get().queue.clone()
    }
}

impl<S, K> RequestLimiter<S, K>
where
    S: StateStore + 'static,
    K: TelemetrySink,
    K::Future: Send + 'static,
{
    /// Load the groups/difference pair, or build a fresh one. Both members are healed.
    pub async fn get_limiters(&self) -> Result<LimiterGroup, LimiterError> {
        let cfg = self.config.get();
        self.load_group(&cfg).await
    }

    /// Load or create the particular counter for `chat_id`.
    ///
    /// Without a chat id a fresh, unsaved counter under the default particular key is returned.
    pub async fn get_particular_limiter(
        &self,
        chat_id: Option<i64>,
    ) -> Result<WindowCounter<S>, LimiterError> {
        let cfg = self.config.get();
        self.load_particular(&cfg, chat_id).await
    }

    /// Persist the group and, when `particular_key` is given, the particular counter under that
    /// recipient's key.
    pub async fn save_limiters(
        &self,
        group: &LimiterGroup,
        particular: &WindowCounter<S>,
        particular_key: Option<i64>,
    ) -> Result<(), LimiterError> {
        let cfg = self.config.get();
        self.save_group(&cfg, group).await?;
        if let Some(chat_id) = particular_key {
            let mut target = particular.clone();
            target.state_mut().set_key(cfg.particular_key(Some(chat_id)));
            target.save().await?;
        }
        Ok(())
    }

    /// Seconds to wait before `call` may be sent; 0 means it is admissible now.
    pub async fn check_limit(&self, call: &OutboundCall) -> Result<u64, LimiterError> {
        if !call.is_limited() {
            return Ok(0);
        }
        let cfg = self.config.get();
        let group = self.load_group(&cfg).await?;
        let now = self.clock.now_millis();

        let mut tiers: Vec<(Tier, i64)> = Vec::with_capacity(3);
        tiers.push((Tier::Difference, tier_wait(&group.difference, cfg.difference, now)));
        if call.is_group() {
            tiers.push((Tier::Groups, tier_wait(&group.groups, cfg.groups, now)));
        }
        if let Some(chat_id) = call.chat_id {
            let particular = self.load_particular(&cfg, Some(chat_id)).await?;
            tiers.push((Tier::Particular, tier_wait(particular.state(), cfg.particular, now)));
        }

        let worst = tiers.into_iter().filter(|(_, left)| *left > 0).max_by_key(|(_, left)| *left);
        let Some((tier, left)) = worst else {
            return Ok(0);
        };
        let wait_secs = millis_to_secs_ceil(left);
        debug!(
            target: "tierlimit::limiter",
            method = %call.method,
            chat_id = ?call.chat_id,
            %tier,
            wait_secs,
            queue = %cfg.queue,
            "call throttled"
        );
        emit_best_effort(
            self.sink.clone(),
            LimiterEvent::Throttled {
                method: call.method.clone(),
                tier,
                wait: Duration::from_secs(wait_secs),
            },
        )
        .await;
        Ok(wait_secs)
    }

    /// Record one event against every tier that applies to `call`. Does not check admission.
    pub async fn increase(&self, call: &OutboundCall) -> Result<(), LimiterError> {
        if !call.is_limited() {
            return Ok(());
        }
        let cfg = self.config.get();
        let mut group = self.load_group(&cfg).await?;
        let now = self.clock.now_millis();
        let is_group = call.is_group();

        if is_group {
            group.groups.increment(1, now);
        }
        group.difference.increment(1, now);
        self.save_group(&cfg, &group).await?;

        if let Some(chat_id) = call.chat_id {
            let mut particular = self.load_particular(&cfg, Some(chat_id)).await?;
            particular.increment(1).await?;
        }

        debug!(
            target: "tierlimit::limiter",
            method = %call.method,
            chat_id = ?call.chat_id,
            groups = is_group,
            difference = group.difference.counter(),
            "call recorded"
        );
        emit_best_effort(
            self.sink.clone(),
            LimiterEvent::Recorded {
                method: call.method.clone(),
                groups: is_group,
                particular: call.chat_id.is_some(),
            },
        )
        .await;
        Ok(())
    }

    /// Check, and record the call only if it was admitted. Returns the check result.
    pub async fn check_and_increase(&self, call: &OutboundCall) -> Result<u64, LimiterError> {
        let wait = self.check_limit(call).await?;
        if wait == 0 {
            self.increase(call).await?;
        }
        Ok(wait)
    }

    /// Always record the call, then report the resulting wait.
    pub async fn increase_and_check(&self, call: &OutboundCall) -> Result<u64, LimiterError> {
        self.increase(call).await?;
        self.check_limit(call).await
    }

    /// Force-reset the groups and difference windows, and `chat_id`'s particular window if given.
    pub async fn reset_limiters(&self, chat_id: Option<i64>) -> Result<(), LimiterError> {
        let cfg = self.config.get();
        let now = self.clock.now_millis();
        let mut group = self.load_group(&cfg).await?;
        group.reset(now);
        self.save_group(&cfg, &group).await?;

        if let Some(id) = chat_id {
            let mut particular = self.load_particular(&cfg, Some(id)).await?;
            particular.reset().await?;
        }

        debug!(target: "tierlimit::limiter", ?chat_id, queue = %cfg.queue, "limiters reset");
        emit_best_effort(self.sink.clone(), LimiterEvent::Reset { chat_id }).await;
        Ok(())
    }

    async fn load_group(&self, cfg: &LimiterConfig) -> Result<LimiterGroup, LimiterError> {
        let key = cfg.group_key();
        let now = self.clock.now_millis();
        let raw = self.store.get(&key).await.map_err(LimiterError::store)?;
        let mut group = match raw {
            Some(raw) => LimiterGroup::decode(&key, &raw)?,
            None => self.fresh_group(cfg, now),
        };
        group.refresh(now);
        Ok(group)
    }

    fn fresh_group(&self, cfg: &LimiterConfig, now: u64) -> LimiterGroup {
        let key = cfg.group_key();
        LimiterGroup::new(
            WindowState::new(format!("{key}:groups"), cfg.groups.requests, cfg.groups.per_secs, now),
            WindowState::new(
                format!("{key}:difference"),
                cfg.difference.requests,
                cfg.difference.per_secs,
                now,
            ),
        )
    }

    async fn save_group(&self, cfg: &LimiterConfig, group: &LimiterGroup) -> Result<(), LimiterError> {
        let key = cfg.group_key();
        let ttl = Duration::from_secs(cfg.groups.per_secs.max(cfg.difference.per_secs));
        let value = group.encode(&key)?;
        self.store.put(&key, value, ttl).await.map_err(LimiterError::store)
    }

    async fn load_particular(
        &self,
        cfg: &LimiterConfig,
        chat_id: Option<i64>,
    ) -> Result<WindowCounter<S>, LimiterError> {
        let key = cfg.particular_key(chat_id);
        let TierLimits { requests, per_secs } = cfg.particular;
        match chat_id {
            Some(_) => {
                WindowCounter::get_or_create(self.store.clone(), self.clock.clone(), key, requests, per_secs)
                    .await
            }
            None => Ok(WindowCounter::detached(
                self.store.clone(),
                self.clock.clone(),
                key,
                requests,
                per_secs,
            )),
        }
    }
}

/// 0 while the tier is below its configured ceiling, else the window's remaining milliseconds.
fn tier_wait(state: &WindowState, limits: TierLimits, now: u64) -> i64 {
    if state.is_less(Some(limits.requests)) {
        0
    } else {
        state.time_left(now)
    }
}

fn millis_to_secs_ceil(millis: i64) -> u64 {
    let millis = u64::try_from(millis).unwrap_or(0);
    millis.div_ceil(1_000)
}
