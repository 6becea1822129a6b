//! Per-function invocation counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cumulative counts keyed by function name. Counts only ever grow.
#[derive(Debug, Clone, Default)]
pub struct CounterTable {
    counts: BTreeMap<String, u64>,
}

impl CounterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to `function`, creating the entry at zero if unseen.
    /// Saturates instead of wrapping.
    pub fn increment(&mut self, function: &str, amount: u64) -> u64 {
        if let Some(count) = self.counts.get_mut(function) {
            *count = count.saturating_add(amount);
            return *count;
        }
        self.counts.insert(function.to_owned(), amount);
        amount
    }

    pub fn get(&self, function: &str) -> u64 {
        self.counts.get(function).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            counts: self.counts.clone(),
        }
    }
}

/// Immutable copy of a [`CounterTable`], safe to hold across further ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterSnapshot {
    counts: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    pub fn get(&self, function: &str) -> Option<u64> {
        self.counts.get(function).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, &n| acc.saturating_add(n))
    }

    /// Entries by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Entries by descending count, ties broken by name.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

impl From<CounterSnapshot> for BTreeMap<String, u64> {
    fn from(snapshot: CounterSnapshot) -> Self {
        snapshot.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increments_accumulate() {
        let mut table = CounterTable::new();
        assert_eq!(table.increment("foo", 3), 3);
        assert_eq!(table.increment("foo", 2), 5);
        assert_eq!(table.get("foo"), 5);
        assert_eq!(table.get("bar"), 0);
    }

    #[test]
    fn test_zero_increment_creates_entry() {
        let mut table = CounterTable::new();
        table.increment("idle", 0);
        assert_eq!(table.snapshot().get("idle"), Some(0));
    }

    #[test]
    fn test_counts_saturate() {
        let mut table = CounterTable::new();
        table.increment("hot", u64::MAX - 1);
        assert_eq!(table.increment("hot", 10), u64::MAX);
    }

    #[test]
    fn test_snapshot_is_detached_from_table() {
        let mut table = CounterTable::new();
        table.increment("main", 1);
        let snap = table.snapshot();
        table.increment("main", 41);
        table.increment("isr", 7);

        assert_eq!(snap.get("main"), Some(1));
        assert_eq!(snap.get("isr"), None);
        assert_eq!(table.snapshot().total(), 49);
    }

    #[test]
    fn test_ranked_orders_by_count_then_name() {
        let mut table = CounterTable::new();
        table.increment("b", 5);
        table.increment("a", 5);
        table.increment("c", 9);
        table.increment("d", 1);

        assert_eq!(
            table.snapshot().ranked(),
            vec![("c", 9), ("a", 5), ("b", 5), ("d", 1)]
        );
    }

    #[test]
    fn test_snapshot_serializes_as_plain_map() {
        let mut table = CounterTable::new();
        table.increment("foo", 5);
        let json = serde_json::to_string(&table.snapshot()).unwrap();
        assert_eq!(json, r#"{"foo":5}"#);
    }
}
