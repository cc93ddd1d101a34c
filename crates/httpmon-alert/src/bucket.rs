//! Count accumulators for one time slice and for the whole window.
//!
//! [`TrafficCounts`] is used both per [`Bucket`] and as the window's rolling
//! total. The rolling total is kept current by adding each event on insert
//! and subtracting whole buckets on eviction.

use httpmon_common::types::NormalizedEvent;
use serde::Serialize;
use std::collections::HashMap;
use std::ops::{AddAssign, SubAssign};

/// Hit counts keyed by status class, endpoint or client.
///
/// Absent keys read as zero. A key is never stored with a zero count:
/// subtraction that cancels a key (or would take it below zero) removes it,
/// so consumers can index the map without seeing stale entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CountMap(HashMap<String, u64>);

impl CountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_zero(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn increment(&mut self, key: &str) {
        self.add(key, 1);
    }

    fn add(&mut self, key: &str, count: u64) {
        if count == 0 {
            return;
        }
        match self.0.get_mut(key) {
            Some(current) => *current += count,
            None => {
                self.0.insert(key.to_string(), count);
            }
        }
    }

    /// Subtract `count` from `key`, dropping the key once it reaches zero.
    fn remove_count(&mut self, key: &str, count: u64) {
        if let Some(current) = self.0.get_mut(key) {
            if *current > count {
                *current -= count;
            } else {
                self.0.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(key, count)| (key.as_str(), *count))
    }

    /// Sum of all counts.
    pub fn sum(&self) -> u64 {
        self.0.values().sum()
    }

    /// The key with the highest count.
    ///
    /// Ties go to the lexicographically smallest key so the result does not
    /// depend on hash iteration order.
    pub fn max_entry(&self) -> Option<(&str, u64)> {
        self.iter().fold(None, |best, (key, count)| match best {
            Some((best_key, best_count))
                if best_count > count || (best_count == count && best_key <= key) =>
            {
                Some((best_key, best_count))
            }
            _ => Some((key, count)),
        })
    }

    pub fn as_map(&self) -> &HashMap<String, u64> {
        &self.0
    }
}

impl AddAssign<&CountMap> for CountMap {
    fn add_assign(&mut self, other: &CountMap) {
        for (key, count) in other.iter() {
            self.add(key, count);
        }
    }
}

impl SubAssign<&CountMap> for CountMap {
    fn sub_assign(&mut self, other: &CountMap) {
        for (key, count) in other.iter() {
            self.remove_count(key, count);
        }
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for CountMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut map = CountMap::new();
        for (key, count) in iter {
            let key: String = key.into();
            map.add(&key, count);
        }
        map
    }
}

/// Aggregated request counts.
///
/// `total` always equals the sum of `by_status_class`; every recorded
/// event lands in exactly one class, one endpoint and one client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounts {
    pub total: u64,
    pub by_status_class: CountMap,
    pub by_endpoint: CountMap,
    pub by_client: CountMap,
}

impl TrafficCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request.
    pub fn record(&mut self, event: &NormalizedEvent) {
        self.total += 1;
        self.by_status_class.increment(&event.status_class());
        self.by_endpoint.increment(&event.endpoint_subpath);
        self.by_client.increment(&event.client_address);
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl AddAssign<&TrafficCounts> for TrafficCounts {
    fn add_assign(&mut self, other: &TrafficCounts) {
        self.total += other.total;
        self.by_status_class += &other.by_status_class;
        self.by_endpoint += &other.by_endpoint;
        self.by_client += &other.by_client;
    }
}

/// Componentwise subtraction, floored at zero. Keys that reach zero are
/// dropped rather than kept as zero or negative entries.
impl SubAssign<&TrafficCounts> for TrafficCounts {
    fn sub_assign(&mut self, other: &TrafficCounts) {
        self.total = self.total.saturating_sub(other.total);
        self.by_status_class -= &other.by_status_class;
        self.by_endpoint -= &other.by_endpoint;
        self.by_client -= &other.by_client;
    }
}

/// Counts for one fixed-size time slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    key: i64,
    counts: TrafficCounts,
}

impl Bucket {
    /// An empty bucket starting at `key` (epoch milliseconds).
    pub fn new(key: i64) -> Self {
        Self {
            key,
            counts: TrafficCounts::default(),
        }
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    pub fn counts(&self) -> &TrafficCounts {
        &self.counts
    }

    pub fn add_event(&mut self, event: &NormalizedEvent) {
        self.counts.record(event);
    }
}
