use crate::bucket::{Bucket, TrafficCounts};
use crate::clock::{secs_to_millis, Clock};
use crate::engine::AlertEngine;
use crate::error::{AlertError, Result};
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, NormalizedEvent};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Trailing span the totals cover.
    #[serde(default = "default_reporting_window_secs")]
    pub reporting_window_secs: f64,
    /// Width of one bucket; must not exceed the reporting window.
    #[serde(default = "default_bucket_size_secs")]
    pub bucket_size_secs: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            reporting_window_secs: default_reporting_window_secs(),
            bucket_size_secs: default_bucket_size_secs(),
        }
    }
}

fn default_reporting_window_secs() -> f64 {
    120.0
}

fn default_bucket_size_secs() -> f64 {
    1.0
}

impl WindowConfig {
    pub fn new(reporting_window_secs: f64, bucket_size_secs: f64) -> Self {
        Self {
            reporting_window_secs,
            bucket_size_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let window = self.reporting_window_secs;
        let bucket = self.bucket_size_secs;
        if !window.is_finite() || window <= 0.0 {
            return Err(AlertError::InvalidWindow(format!(
                "reporting_window_secs must be greater than 0, got {window}"
            )));
        }
        if !bucket.is_finite() || bucket <= 0.0 {
            return Err(AlertError::InvalidWindow(format!(
                "bucket_size_secs must be greater than 0, got {bucket}"
            )));
        }
        if bucket > window {
            return Err(AlertError::InvalidWindow(format!(
                "bucket_size_secs ({bucket}) must not exceed reporting_window_secs ({window})"
            )));
        }
        if secs_to_millis(bucket) < 1 {
            return Err(AlertError::InvalidWindow(format!(
                "bucket_size_secs must be at least 0.001, got {bucket}"
            )));
        }
        Ok(())
    }
}

/// Rolling totals as of `taken_at`, detached from the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSnapshot {
    pub counts: TrafficCounts,
    pub window_secs: f64,
    pub taken_at: DateTime<Utc>,
}

/// Time-bucketed request counts over a trailing window.
///
/// Buckets are kept oldest-first. The rolling total is the componentwise
/// sum of the live buckets, maintained on insert and on eviction. Eviction
/// is lazy: it runs at the start of every [`add`](Self::add) and
/// [`snapshot`](Self::snapshot), and drops buckets whose key is at least
/// one full window older than the clock's "now".
pub struct WindowAggregator {
    window_secs: f64,
    window_ms: i64,
    bucket_ms: i64,
    buckets: VecDeque<Bucket>,
    totals: TrafficCounts,
    clock: Arc<dyn Clock>,
}

impl WindowAggregator {
    pub fn new(config: &WindowConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window_secs: config.reporting_window_secs,
            window_ms: secs_to_millis(config.reporting_window_secs),
            bucket_ms: secs_to_millis(config.bucket_size_secs),
            buckets: VecDeque::new(),
            totals: TrafficCounts::default(),
            clock,
        })
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    /// Start of the bucket `timestamp` (epoch seconds) falls in, as epoch
    /// milliseconds: `floor(timestamp / bucket_size) * bucket_size`.
    ///
    /// Timestamps outside the `i64` millisecond range clamp to its ends
    /// and NaN maps to the epoch.
    pub fn compute_bucket_key(&self, timestamp: f64) -> i64 {
        let ts_ms = (timestamp * 1000.0).floor() as i64;
        ts_ms.div_euclid(self.bucket_ms).saturating_mul(self.bucket_ms)
    }

    /// Record one event.
    ///
    /// A new bucket is opened only when the event's key is newer than the
    /// current tail; late events are folded into the tail. Events older
    /// than the window are still recorded and expire on the next eviction.
    pub fn add(&mut self, event: &NormalizedEvent) {
        self.evict_outdated(self.clock.now());

        let key = self.compute_bucket_key(event.timestamp);
        let opens_bucket = self.buckets.back().map_or(true, |tail| key > tail.key());
        if opens_bucket {
            self.buckets.push_back(Bucket::new(key));
        }
        if let Some(tail) = self.buckets.back_mut() {
            tail.add_event(event);
        }
        self.totals.record(event);
    }

    pub fn add_all<'a, I>(&mut self, events: I)
    where
        I: IntoIterator<Item = &'a NormalizedEvent>,
    {
        for event in events {
            self.add(event);
        }
    }

    /// Evict, then copy out the rolling totals.
    pub fn snapshot(&mut self) -> WindowSnapshot {
        let now = self.clock.now();
        self.evict_outdated(now);
        WindowSnapshot {
            counts: self.totals.clone(),
            window_secs: self.window_secs,
            taken_at: now,
        }
    }

    /// Drop expired buckets oldest-first, stopping at the first live one.
    /// Returns how many buckets were removed.
    pub fn evict_outdated(&mut self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let mut evicted = 0;
        while let Some(oldest) = self.buckets.front() {
            if now_ms.saturating_sub(oldest.key()) < self.window_ms {
                break;
            }
            if let Some(expired) = self.buckets.pop_front() {
                self.totals -= expired.counts();
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::debug!(
                evicted,
                live = self.buckets.len(),
                total = self.totals.total,
                "Evicted expired buckets"
            );
        }
        evicted
    }

    /// Rolling totals without running eviction first.
    pub fn totals(&self) -> &TrafficCounts {
        &self.totals
    }

    pub fn buckets(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Cloneable handle to one [`WindowAggregator`] behind a mutex.
///
/// Every operation, eviction included, runs under the single lock, so the
/// ingest, stats and alert tasks can share one window.
#[derive(Clone)]
pub struct SharedWindow {
    inner: Arc<Mutex<WindowAggregator>>,
}

impl SharedWindow {
    pub fn new(aggregator: WindowAggregator) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    // Aggregator state is only mutated through methods that cannot panic
    // half-way, so a poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, WindowAggregator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, event: &NormalizedEvent) {
        self.lock().add(event);
    }

    pub fn add_all(&self, events: &[NormalizedEvent]) {
        self.lock().add_all(events);
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        self.lock().snapshot()
    }

    /// Take a snapshot and run `engine` over it. The lock is released
    /// before the evaluators run.
    pub fn evaluate(&self, engine: &mut AlertEngine) -> Vec<AlertEvent> {
        let snapshot = self.snapshot();
        engine.evaluate(&snapshot)
    }

    pub fn window_secs(&self) -> f64 {
        self.lock().window_secs()
    }

    pub fn bucket_count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};

    fn aggregator(window: f64, bucket: f64, now: f64) -> (Arc<ManualClock>, WindowAggregator) {
        let clock = Arc::new(ManualClock::from_epoch_secs(now));
        let window = WindowAggregator::new(&WindowConfig::new(window, bucket), clock.clone())
            .expect("valid config");
        (clock, window)
    }

    fn hit(ts: f64) -> NormalizedEvent {
        NormalizedEvent::new(ts, "200", "127.0.0.1", "/api")
    }

    #[test]
    fn bucket_key_floors_to_bucket_size() {
        let (_, window) = aggregator(10.0, 1.0, 0.0);
        assert_eq!(window.compute_bucket_key(0.0), 0);
        assert_eq!(window.compute_bucket_key(4.7), 4_000);
        assert_eq!(window.compute_bucket_key(5.0), 5_000);

        let (_, window) = aggregator(10.0, 5.0, 0.0);
        assert_eq!(window.compute_bucket_key(8.0), 5_000);
        assert_eq!(window.compute_bucket_key(23.0), 20_000);

        let (_, window) = aggregator(10.0, 0.5, 0.0);
        assert_eq!(window.compute_bucket_key(1.74), 1_500);
    }

    #[test]
    fn out_of_range_timestamps_are_recorded_then_evicted() {
        let (_, mut window) = aggregator(5.0, 0.75, 100.0);
        assert_eq!(window.compute_bucket_key(f64::NEG_INFINITY), i64::MIN);
        assert_eq!(window.compute_bucket_key(-1e300), i64::MIN);
        assert_eq!(window.compute_bucket_key(f64::NAN), 0);
        assert_eq!(
            window.compute_bucket_key(f64::INFINITY),
            i64::MAX.div_euclid(750) * 750
        );

        window.add(&hit(f64::NEG_INFINITY));
        assert_eq!(window.totals().total, 1);
        assert_eq!(window.snapshot().counts.total, 0);
        assert!(window.is_empty());

        window.add(&hit(100.0));
        window.add(&hit(-1e300));
        assert_eq!(window.snapshot().counts.total, 2);
    }

    #[test]
    fn rejects_bad_window_config() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        for (window, bucket) in [(0.0, 1.0), (-5.0, 1.0), (5.0, 0.0), (5.0, 6.0), (f64::NAN, 1.0)] {
            let result = WindowAggregator::new(&WindowConfig::new(window, bucket), clock.clone());
            assert!(
                matches!(result, Err(AlertError::InvalidWindow(_))),
                "window={window} bucket={bucket} should be rejected"
            );
        }
    }

    #[test]
    fn empty_window_snapshot_is_zero() {
        let (_, mut window) = aggregator(5.0, 1.0, 100.0);
        let snapshot = window.snapshot();
        assert_eq!(snapshot.counts, TrafficCounts::default());
        assert_eq!(snapshot.window_secs, 5.0);
    }

    #[test]
    fn events_in_same_bucket_share_it() {
        let (_, mut window) = aggregator(5.0, 1.0, 10.0);
        window.add(&hit(10.1));
        window.add(&hit(10.9));
        window.add(&hit(11.0));
        assert_eq!(window.len(), 2);
        assert_eq!(window.totals().total, 3);
    }

    #[test]
    fn late_event_folds_into_tail() {
        let (_, mut window) = aggregator(5.0, 1.0, 12.0);
        window.add(&hit(11.0));
        window.add(&hit(10.0));
        let keys: Vec<i64> = window.buckets().map(Bucket::key).collect();
        assert_eq!(keys, vec![11_000]);
        assert_eq!(window.buckets().next().map(|b| b.counts().total), Some(2));
    }

    #[test]
    fn one_event_per_second_evicts_oldest() {
        let (clock, mut window) = aggregator(5.0, 1.0, 0.0);
        for second in 0..5 {
            clock.set_epoch_secs(second as f64);
            window.add(&hit(second as f64));
        }
        assert_eq!(window.snapshot().counts.total, 5);

        clock.set_epoch_secs(5.0);
        let snapshot = window.snapshot();
        assert_eq!(snapshot.counts.total, 4);
        assert_eq!(window.len(), 4);
        assert_eq!(window.buckets().next().map(Bucket::key), Some(1_000));
    }

    #[test]
    fn stale_event_is_recorded_then_evicted() {
        let (_, mut window) = aggregator(5.0, 1.0, 100.0);
        window.add(&hit(50.0));
        assert_eq!(window.totals().total, 1);
        assert_eq!(window.snapshot().counts.total, 0);
        assert!(window.is_empty());
    }

    #[test]
    fn eviction_returns_totals_to_zero() {
        let (clock, mut window) = aggregator(5.0, 1.0, 0.0);
        window.add(&NormalizedEvent::new(0.2, "500", "10.0.0.1", "/a"));
        window.add(&NormalizedEvent::new(1.2, "404", "10.0.0.2", "/b"));
        clock.set_epoch_secs(30.0);

        let snapshot = window.snapshot();
        assert_eq!(snapshot.counts, TrafficCounts::default());
        assert!(snapshot.counts.by_client.is_empty());
        assert!(snapshot.counts.by_status_class.is_empty());
    }

    #[test]
    fn eviction_stops_at_first_live_bucket() {
        let (_, mut window) = aggregator(5.0, 1.0, 0.0);
        window.add(&hit(0.0));
        window.add(&hit(3.0));
        window.add(&hit(4.0));

        let evicted = window.evict_outdated(DateTime::from_timestamp(7, 0).unwrap_or_default());
        assert_eq!(evicted, 1);
        assert_eq!(window.totals().total, 2);
    }

    #[test]
    fn snapshot_is_idempotent_without_writes() {
        let (_, mut window) = aggregator(5.0, 1.0, 2.0);
        window.add(&hit(1.0));
        window.add(&hit(2.0));
        assert_eq!(window.snapshot(), window.snapshot());
    }

    #[test]
    fn shared_window_serializes_writers() {
        let clock = Arc::new(ManualClock::from_epoch_secs(1_000.0));
        let aggregator =
            WindowAggregator::new(&WindowConfig::new(60.0, 1.0), clock).expect("valid config");
        let shared = SharedWindow::new(aggregator);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        shared.add(&NormalizedEvent::new(
                            1_000.0,
                            "200",
                            format!("10.0.0.{worker}"),
                            format!("/p{}", i % 3),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.counts.total, 1_000);
        assert_eq!(snapshot.counts.by_client.get_or_zero("10.0.0.3"), 250);
        assert_eq!(shared.bucket_count(), 1);
    }
}
