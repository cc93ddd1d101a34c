use crate::bucket::TrafficCounts;
use crate::error::{require_positive, Result};
use crate::rules::{Check, Hysteresis};
use crate::AlertEvaluator;
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind, AlertStatus};

/// Fires when the request count over the window reaches
/// `rate_threshold * window_secs`.
#[derive(Debug)]
pub struct TrafficRule {
    rate_threshold: f64,
    window_secs: f64,
    hysteresis: Hysteresis,
}

impl TrafficRule {
    /// `rate_threshold` is in requests per second.
    pub fn new(rate_threshold: f64, window_secs: f64) -> Result<Self> {
        Ok(Self {
            rate_threshold: require_positive("traffic_threshold", rate_threshold)?,
            window_secs: require_positive("reporting_window_secs", window_secs)?,
            hysteresis: Hysteresis::default(),
        })
    }

    /// Absolute hit count that triggers the alert.
    pub fn hit_threshold(&self) -> f64 {
        self.rate_threshold * self.window_secs
    }

    fn check(&self, totals: &TrafficCounts) -> Check {
        let value = totals.total as f64;
        if value >= self.hit_threshold() {
            Check::Breached { value }
        } else {
            Check::Normal { value }
        }
    }
}

impl AlertEvaluator for TrafficRule {
    fn kind(&self) -> AlertKind {
        AlertKind::Traffic
    }

    fn is_active(&self) -> bool {
        self.hysteresis.is_active()
    }

    fn last_message(&self) -> Option<&str> {
        self.hysteresis.last_message()
    }

    fn evaluate(&mut self, totals: &TrafficCounts, now: DateTime<Utc>) -> Option<AlertEvent> {
        let (status, value) = self.hysteresis.step(self.check(totals))?;
        let message = match status {
            AlertStatus::Active => format!(
                "Traffic above threshold - {} hits in the last {} seconds",
                totals.total, self.window_secs
            ),
            AlertStatus::Recovered => format!(
                "Traffic returned to normal range - {} hits in the last {} seconds",
                totals.total, self.window_secs
            ),
        };
        let threshold = self.hit_threshold();
        Some(
            self.hysteresis
                .emit(AlertKind::Traffic, status, message, value, threshold, now),
        )
    }
}
