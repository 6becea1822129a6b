//! Pixel-budget downsampling for whole-history overviews.
//!
//! `[from, to)` is cut into `target_width` equal-duration buckets and each
//! non-empty bucket contributes one sample: the one deviating most from the
//! bucket mean, so spikes survive. Ties go to the sample nearest the bucket
//! midpoint, then to the earlier one. Empty buckets emit nothing.

use crate::channel::Channel;
use crate::sample::{Sample, Timestamp};

/// Downsample the part of `channel` inside `[from, to)`.
///
/// Returns every in-range sample unchanged when there are no more than
/// `target_width` of them. Returns nothing for `target_width == 0` or an empty
/// window.
pub fn downsample(
    channel: &Channel,
    target_width: usize,
    from: Timestamp,
    to: Timestamp,
) -> Vec<Sample> {
    if target_width == 0 || from >= to {
        return Vec::new();
    }
    let mut in_range = channel.range_query(from, to, false);
    while in_range.last().is_some_and(|s| s.timestamp >= to) {
        in_range.pop();
    }
    downsample_sorted(&in_range, target_width, from, to)
}

/// Downsample an already timestamp-sorted slice lying inside `[from, to)`.
pub fn downsample_sorted(
    samples: &[Sample],
    target_width: usize,
    from: Timestamp,
    to: Timestamp,
) -> Vec<Sample> {
    if target_width == 0 || from >= to {
        return Vec::new();
    }
    debug_assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    if samples.len() <= target_width {
        return samples.to_vec();
    }

    let buckets = Buckets::new(from, to, target_width);
    let mut out = Vec::with_capacity(target_width);
    let mut rest = samples;
    while let Some(first) = rest.first() {
        let bucket = buckets.index_of(first.timestamp);
        let len = rest.partition_point(|s| buckets.index_of(s.timestamp) == bucket);
        let (members, tail) = rest.split_at(len);
        out.push(representative(members, buckets.midpoint(bucket)));
        rest = tail;
    }
    out
}

struct Buckets {
    from: Timestamp,
    span: u128,
    width: u128,
}

impl Buckets {
    fn new(from: Timestamp, to: Timestamp, width: usize) -> Self {
        Self {
            from,
            span: u128::from(to - from),
            width: width as u128,
        }
    }

    fn index_of(&self, ts: Timestamp) -> u128 {
        let offset = u128::from(ts.saturating_sub(self.from));
        (offset * self.width / self.span).min(self.width - 1)
    }

    fn midpoint(&self, bucket: u128) -> f64 {
        self.from as f64 + (bucket as f64 + 0.5) * self.span as f64 / self.width as f64
    }
}

fn representative(members: &[Sample], midpoint: f64) -> Sample {
    let mean = members.iter().map(|s| s.value).sum::<f64>() / members.len() as f64;
    let deviation = |s: &Sample| {
        let d = (s.value - mean).abs();
        if d.is_nan() { f64::NEG_INFINITY } else { d }
    };
    let distance = |s: &Sample| (s.timestamp as f64 - midpoint).abs();

    let mut best = members[0];
    let (mut best_dev, mut best_dist) = (deviation(&best), distance(&best));
    for s in &members[1..] {
        let (dev, dist) = (deviation(s), distance(s));
        if dev > best_dev || (dev == best_dev && dist < best_dist) {
            best = *s;
            best_dev = dev;
            best_dist = dist;
        }
    }
    best
}
