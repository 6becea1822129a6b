//! One named series: append-only sample history plus its listeners.
//!
//! Samples are stored in arrival order. As long as timestamps never go
//! backwards the whole history is one sorted run and range queries are a pair
//! of binary searches. The first out-of-order sample ends that sorted prefix;
//! everything after it is also kept in a second, timestamp-sorted run, so
//! queries stay binary searches plus a merge of the two runs. Building that
//! run costs one ordered insert per late append.

use crate::sample::{Sample, Timestamp};
use crate::subscription::{Deferred, Listener, ListenerRegistry, SubscriptionId};

pub struct Channel {
    id: String,
    samples: Vec<Sample>,
    /// Length of the longest prefix of `samples` that is non-decreasing by timestamp.
    sorted_len: usize,
    /// `samples[sorted_len..]` stably sorted by timestamp.
    late: Vec<Sample>,
    listeners: ListenerRegistry,
}

impl Channel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            samples: Vec::new(),
            sorted_len: 0,
            late: Vec::new(),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Full history in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// True while every append so far arrived in timestamp order.
    pub fn is_time_ordered(&self) -> bool {
        self.sorted_len == self.samples.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Append `sample` at the tail and notify every listener once, in
    /// registration order, before returning.
    ///
    /// Operations the listeners queued are returned to the caller; the
    /// [`TelemetryStore`](crate::store::TelemetryStore) applies them
    /// automatically.
    #[must_use = "operations queued by listeners are lost if dropped"]
    pub fn append(&mut self, sample: Sample) -> Deferred {
        let mut deferred = Deferred::new();
        self.append_into(sample, &mut deferred);
        deferred
    }

    pub(crate) fn append_into(&mut self, sample: Sample, deferred: &mut Deferred) {
        let in_order = self.is_time_ordered()
            && self
                .samples
                .last()
                .is_none_or(|last| last.timestamp <= sample.timestamp);
        if in_order {
            self.sorted_len += 1;
        } else {
            if self.late.is_empty() {
                log::debug!(
                    "channel {}: sample at {} arrived out of order, later samples kept in a second run",
                    self.id,
                    sample.timestamp
                );
            }
            let at = self.late.partition_point(|s| s.timestamp <= sample.timestamp);
            self.late.insert(at, sample);
        }
        self.samples.push(sample);
        self.listeners.notify(&sample, deferred);
    }

    /// Samples with `from <= timestamp <= to`, ordered by timestamp (ties in
    /// arrival order).
    ///
    /// With `clamp`, synthetic samples are added at `from` and `to` when no
    /// real sample sits exactly there. Each carries the value of the latest
    /// real sample at or before that edge. No leading sample is added when
    /// nothing precedes the window.
    ///
    /// Costs four binary searches plus a copy of the `k` matching samples,
    /// whether or not arrivals were in order.
    pub fn range_query(&self, from: Timestamp, to: Timestamp, clamp: bool) -> Vec<Sample> {
        if from > to {
            return Vec::new();
        }

        let prefix = &self.samples[..self.sorted_len];
        let lo = prefix.partition_point(|s| s.timestamp < from);
        let hi = prefix.partition_point(|s| s.timestamp <= to);
        let late_lo = self.late.partition_point(|s| s.timestamp < from);
        let late_hi = self.late.partition_point(|s| s.timestamp <= to);

        let mut out = merge_by_timestamp(&prefix[lo..hi], &self.late[late_lo..late_hi]);
        if clamp {
            self.clamp_edges(&mut out, from, to, lo, late_lo);
        }
        out
    }

    /// First sample ever appended.
    pub fn oldest(&self) -> Option<Sample> {
        self.samples.first().copied()
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    /// Smallest and largest timestamp held, regardless of arrival order.
    pub fn time_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        let prefix = &self.samples[..self.sorted_len];
        let (first, last) = (prefix.first()?, prefix.last()?);
        match (self.late.first(), self.late.last()) {
            (Some(late_first), Some(late_last)) => Some((
                first.timestamp.min(late_first.timestamp),
                last.timestamp.max(late_last.timestamp),
            )),
            _ => Some((first.timestamp, last.timestamp)),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&Sample, &mut Deferred) + 'static,
    {
        let id = SubscriptionId::next();
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub(crate) fn subscribe_with_id(&mut self, id: SubscriptionId, listener: Listener) {
        self.listeners.insert(id, listener);
    }

    /// Returns false if `id` was not registered on this channel.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    fn clamp_edges(
        &self,
        out: &mut Vec<Sample>,
        from: Timestamp,
        to: Timestamp,
        lo: usize,
        late_lo: usize,
    ) {
        let before = self.latest_before(lo, late_lo);

        if out.first().is_none_or(|s| s.timestamp != from) {
            if let Some(prev) = before {
                out.insert(0, Sample::new(from, prev.value));
            }
        }

        if out.last().is_none_or(|s| s.timestamp != to) {
            let edge = out.last().copied().or(before);
            if let Some(edge) = edge {
                out.push(Sample::new(to, edge.value));
            }
        }
    }

    /// Latest sample (by timestamp, then arrival) strictly before the window.
    /// `lo` and `late_lo` are the first indices at or after `from` in the
    /// prefix and the late run.
    fn latest_before(&self, lo: usize, late_lo: usize) -> Option<Sample> {
        let in_prefix = lo.checked_sub(1).map(|i| self.samples[i]);
        let in_late = late_lo.checked_sub(1).map(|i| self.late[i]);
        match (in_prefix, in_late) {
            // Late samples arrived after the whole prefix, so they win ties.
            (Some(p), Some(l)) => Some(if l.timestamp >= p.timestamp { l } else { p }),
            (p, l) => l.or(p),
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("samples", &self.samples.len())
            .field("sorted_len", &self.sorted_len)
            .field("late", &self.late.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Stable merge: on equal timestamps, `a` (earlier arrivals) comes first.
fn merge_by_timestamp(a: &[Sample], b: &[Sample]) -> Vec<Sample> {
    let mut out = Vec::with_capacity(a.len() + b.len() + 2);
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].timestamp <= b[j].timestamp {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
