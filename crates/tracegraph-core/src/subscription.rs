//! Listener registry and deferred operations for synchronous sample fan-out.
//!
//! Listeners run to completion inside `append`, in registration order. They
//! cannot touch the store directly while a fan-out is in progress; instead they
//! receive a [`Deferred`] queue through which they may request appends,
//! subscriptions, unsubscriptions and counter increments. The store drains that
//! queue in FIFO order once the current fan-out has finished.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::sample::{CounterIncrement, Sample};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registered listener. Unique across all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Callback invoked once per appended sample.
pub type Listener = Box<dyn FnMut(&Sample, &mut Deferred)>;

/// An operation requested from inside a listener, applied after the fan-out.
pub enum DeferredOp {
    Append {
        channel: String,
        sample: Sample,
    },
    Subscribe {
        channel: String,
        id: SubscriptionId,
        listener: Listener,
    },
    Unsubscribe {
        channel: String,
        id: SubscriptionId,
    },
    Increment(CounterIncrement),
}

impl std::fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append { channel, sample } => f
                .debug_struct("Append")
                .field("channel", channel)
                .field("sample", sample)
                .finish(),
            Self::Subscribe { channel, id, .. } => f
                .debug_struct("Subscribe")
                .field("channel", channel)
                .field("id", id)
                .finish_non_exhaustive(),
            Self::Unsubscribe { channel, id } => f
                .debug_struct("Unsubscribe")
                .field("channel", channel)
                .field("id", id)
                .finish(),
            Self::Increment(inc) => f.debug_tuple("Increment").field(inc).finish(),
        }
    }
}

/// FIFO queue of operations requested during a fan-out.
#[derive(Debug, Default)]
pub struct Deferred {
    ops: VecDeque<DeferredOp>,
    current: Option<SubscriptionId>,
    drop_current: bool,
}

impl Deferred {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an append; it is delivered to that channel's listeners once the
    /// in-progress fan-out completes.
    pub fn append(&mut self, channel: impl Into<String>, sample: Sample) {
        self.ops.push_back(DeferredOp::Append {
            channel: channel.into(),
            sample,
        });
    }

    /// Queue a new subscription. The returned id is valid immediately and can
    /// be passed to [`Deferred::unsubscribe`] or the store later on.
    pub fn subscribe<F>(&mut self, channel: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: FnMut(&Sample, &mut Deferred) + 'static,
    {
        let id = SubscriptionId::next();
        self.ops.push_back(DeferredOp::Subscribe {
            channel: channel.into(),
            id,
            listener: Box::new(listener),
        });
        id
    }

    pub fn unsubscribe(&mut self, channel: impl Into<String>, id: SubscriptionId) {
        self.ops.push_back(DeferredOp::Unsubscribe {
            channel: channel.into(),
            id,
        });
    }

    pub fn increment_counter(&mut self, function: impl Into<String>, amount: u64) {
        self.ops.push_back(DeferredOp::Increment(CounterIncrement {
            function: function.into(),
            amount,
        }));
    }

    /// Remove the listener currently being invoked. Takes effect as soon as it
    /// returns, so it sees no further samples, including queued ones.
    pub fn unsubscribe_self(&mut self) {
        if self.current.is_some() {
            self.drop_current = true;
        }
    }

    /// Id of the listener currently being invoked, if any.
    pub fn current(&self) -> Option<SubscriptionId> {
        self.current
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn pop(&mut self) -> Option<DeferredOp> {
        self.ops.pop_front()
    }

    fn begin(&mut self, id: SubscriptionId) {
        self.current = Some(id);
        self.drop_current = false;
    }

    fn finish(&mut self) -> bool {
        self.current = None;
        std::mem::take(&mut self.drop_current)
    }
}

/// Ordered set of listeners with O(1) insertion and removal.
///
/// Removal leaves a vacant slot; slots are compacted once more than half are
/// vacant, preserving registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    slots: Vec<Option<(SubscriptionId, Listener)>>,
    index: HashMap<SubscriptionId, usize>,
    vacant: usize,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn insert(&mut self, id: SubscriptionId, listener: Listener) {
        if self.index.contains_key(&id) {
            return;
        }
        self.index.insert(id, self.slots.len());
        self.slots.push(Some((id, listener)));
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        self.slots[slot] = None;
        self.vacant += 1;
        self.maybe_compact();
        true
    }

    /// Invoke every listener once with `sample`, in registration order.
    pub fn notify(&mut self, sample: &Sample, deferred: &mut Deferred) {
        for slot in self.slots.iter_mut() {
            let Some((id, listener)) = slot else {
                continue;
            };
            let id = *id;
            deferred.begin(id);
            listener(sample, deferred);
            if deferred.finish() {
                *slot = None;
                self.index.remove(&id);
                self.vacant += 1;
            }
        }

        self.maybe_compact();
    }

    fn maybe_compact(&mut self) {
        if self.vacant == 0 || self.vacant * 2 <= self.slots.len() {
            return;
        }
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some((id, _)) = slot {
                self.index.insert(*id, pos);
            }
        }
        self.vacant = 0;
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
