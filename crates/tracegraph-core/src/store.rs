//! Telemetry store: the channel registry and counter table for one dashboard
//! session, and the query surface chart components read from.
//!
//! All operations are synchronous and run on the caller's thread. Operations
//! listeners queue through [`Deferred`] are drained before the dispatch call
//! that triggered them returns, breadth-first and in FIFO order.

use std::collections::HashMap;

use uuid::Uuid;

use crate::channel::Channel;
use crate::counters::{CounterSnapshot, CounterTable};
use crate::downsample::downsample;
use crate::sample::{Sample, Timestamp};
use crate::subscription::{Deferred, DeferredOp, SubscriptionId};

/// Default cap on deferred appends applied per top-level dispatch.
pub const DEFAULT_REENTRANCY_LIMIT: usize = 65_536;

// ---------------------------------------------------------------------------
// Store config
// ---------------------------------------------------------------------------

/// Configuration for a telemetry store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Deferred appends applied per top-level dispatch before further appends
    /// are discarded. Stops a listener that re-appends to its own channel from
    /// looping forever. Subscriptions, unsubscriptions and counter increments
    /// are always applied.
    pub reentrancy_limit: usize,
    /// Stamp `data` / `program-counter` messages that carry no timestamp with
    /// their time of receipt. When off, such messages are dropped.
    pub stamp_missing_timestamps: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reentrancy_limit: DEFAULT_REENTRANCY_LIMIT,
            stamp_missing_timestamps: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Telemetry store
// ---------------------------------------------------------------------------

pub struct TelemetryStore {
    session_id: Uuid,
    config: StoreConfig,
    channels: HashMap<String, Channel>,
    counters: CounterTable,
}

impl TelemetryStore {
    pub fn new(config: StoreConfig) -> Self {
        let session_id = Uuid::new_v4();
        log::debug!("telemetry store {session_id} created");
        Self {
            session_id,
            config,
            channels: HashMap::new(),
            counters: CounterTable::new(),
        }
    }

    /// Unique id of this store instance, for log correlation.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create `channel_id` if it does not exist yet.
    pub fn declare_channel(&mut self, channel_id: &str) {
        self.channel_entry(channel_id);
    }

    /// Append `sample` to `channel_id`, creating the channel on first use, and
    /// run every listener (plus anything they queue) before returning.
    pub fn dispatch_sample(&mut self, channel_id: &str, sample: Sample) {
        let mut deferred = Deferred::new();
        self.channel_entry(channel_id)
            .append_into(sample, &mut deferred);
        self.drain(deferred);
    }

    /// Add `amount` to the counter for `function`.
    pub fn dispatch_counter_increment(&mut self, function: &str, amount: u64) {
        self.counters.increment(function, amount);
    }

    /// Samples of `channel_id` within `[from, to]`; empty for unknown channels.
    pub fn query(
        &self,
        channel_id: &str,
        from: Timestamp,
        to: Timestamp,
        clamp: bool,
    ) -> Vec<Sample> {
        self.channels
            .get(channel_id)
            .map(|ch| ch.range_query(from, to, clamp))
            .unwrap_or_default()
    }

    /// At most `target_width` representative samples of `channel_id` in `[from, to)`.
    pub fn overview(
        &self,
        channel_id: &str,
        target_width: usize,
        from: Timestamp,
        to: Timestamp,
    ) -> Vec<Sample> {
        self.channels
            .get(channel_id)
            .map(|ch| downsample(ch, target_width, from, to))
            .unwrap_or_default()
    }

    pub fn oldest(&self, channel_id: &str) -> Option<Sample> {
        self.channels.get(channel_id).and_then(Channel::oldest)
    }

    pub fn latest(&self, channel_id: &str) -> Option<Sample> {
        self.channels.get(channel_id).and_then(Channel::latest)
    }

    pub fn counter_snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Register `listener` on `channel_id`, creating the channel if needed so
    /// subscribers may register before any data arrives.
    pub fn subscribe<F>(&mut self, channel_id: &str, listener: F) -> SubscriptionId
    where
        F: FnMut(&Sample, &mut Deferred) + 'static,
    {
        self.channel_entry(channel_id).subscribe(listener)
    }

    /// Returns false if `id` was not registered on `channel_id`.
    pub fn unsubscribe(&mut self, channel_id: &str, id: SubscriptionId) -> bool {
        self.channels
            .get_mut(channel_id)
            .is_some_and(|ch| ch.unsubscribe(id))
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.get(channel_id)
    }

    /// Known channel ids, sorted.
    pub fn channel_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn channel_entry(&mut self, channel_id: &str) -> &mut Channel {
        let session_id = self.session_id;
        self.channels
            .entry(channel_id.to_owned())
            .or_insert_with(|| {
                log::debug!("store {session_id}: new channel {channel_id}");
                Channel::new(channel_id)
            })
    }

    fn drain(&mut self, mut deferred: Deferred) {
        let mut appends = 0usize;
        let mut discarded = 0usize;
        while let Some(op) = deferred.pop() {
            match op {
                DeferredOp::Append { channel, sample } => {
                    if appends == self.config.reentrancy_limit {
                        discarded += 1;
                        continue;
                    }
                    appends += 1;
                    self.channel_entry(&channel)
                        .append_into(sample, &mut deferred);
                }
                DeferredOp::Subscribe {
                    channel,
                    id,
                    listener,
                } => {
                    self.channel_entry(&channel)
                        .subscribe_with_id(id, listener);
                }
                DeferredOp::Unsubscribe { channel, id } => {
                    self.unsubscribe(&channel, id);
                }
                DeferredOp::Increment(inc) => {
                    self.counters.increment(&inc.function, inc.amount);
                }
            }
        }

        if discarded > 0 {
            log::warn!(
                "store {}: reentrancy limit {} reached, discarded {} queued appends",
                self.session_id,
                self.config.reentrancy_limit,
                discarded
            );
        }
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStore")
            .field("session_id", &self.session_id)
            .field("channels", &self.channels.len())
            .field("counters", &self.counters.len())
            .finish()
    }
}
