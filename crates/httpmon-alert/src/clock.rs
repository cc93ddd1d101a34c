use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" for eviction decisions and alert timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to, with millisecond resolution.
///
/// # Examples
///
/// ```
/// use httpmon_alert::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::from_epoch_secs(100.0);
/// clock.advance_secs(5.0);
/// assert_eq!(clock.now().timestamp(), 105);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn from_epoch_secs(secs: f64) -> Self {
        Self {
            now_ms: AtomicI64::new(secs_to_millis(secs)),
        }
    }

    pub fn set_epoch_secs(&self, secs: f64) {
        self.now_ms.store(secs_to_millis(secs), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.now_ms.fetch_add(secs_to_millis(secs), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

pub(crate) fn secs_to_millis(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}
