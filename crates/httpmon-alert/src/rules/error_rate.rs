use crate::bucket::TrafficCounts;
use crate::error::{require_positive, AlertError, Result};
use crate::rules::{Check, Hysteresis};
use crate::AlertEvaluator;
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind, AlertStatus, SERVER_ERROR_CLASS};

/// Fires when the share of `5xx` responses in the window reaches the
/// threshold. With no traffic at all the rate is undefined and the rule
/// keeps its current status.
#[derive(Debug)]
pub struct ErrorRateRule {
    rate_threshold: f64,
    window_secs: f64,
    hysteresis: Hysteresis,
}

impl ErrorRateRule {
    /// `rate_threshold` is a ratio in `(0, 1]`.
    pub fn new(rate_threshold: f64, window_secs: f64) -> Result<Self> {
        if !(rate_threshold > 0.0 && rate_threshold <= 1.0) {
            return Err(AlertError::InvalidThreshold {
                name: "error_rate_threshold",
                value: rate_threshold,
                expected: "a ratio in (0, 1]",
            });
        }
        Ok(Self {
            rate_threshold,
            window_secs: require_positive("reporting_window_secs", window_secs)?,
            hysteresis: Hysteresis::default(),
        })
    }

    fn check(&self, totals: &TrafficCounts) -> Check {
        if totals.total == 0 {
            return Check::Inert;
        }
        let errors = totals.by_status_class.get_or_zero(SERVER_ERROR_CLASS);
        let value = errors as f64 / totals.total as f64;
        if value >= self.rate_threshold {
            Check::Breached { value }
        } else {
            Check::Normal { value }
        }
    }
}

impl AlertEvaluator for ErrorRateRule {
    fn kind(&self) -> AlertKind {
        AlertKind::ErrorRate
    }

    fn is_active(&self) -> bool {
        self.hysteresis.is_active()
    }

    fn last_message(&self) -> Option<&str> {
        self.hysteresis.last_message()
    }

    fn evaluate(&mut self, totals: &TrafficCounts, now: DateTime<Utc>) -> Option<AlertEvent> {
        let (status, value) = self.hysteresis.step(self.check(totals))?;
        let errors = totals.by_status_class.get_or_zero(SERVER_ERROR_CLASS);
        let message = match status {
            AlertStatus::Active => format!(
                "Error rate above threshold - {} ({:.0}%) errors in the last {} seconds",
                errors,
                value * 100.0,
                self.window_secs
            ),
            AlertStatus::Recovered => format!(
                "Error rate returned to normal range - {:.0}% in the last {} seconds",
                value * 100.0,
                self.window_secs
            ),
        };
        Some(self.hysteresis.emit(
            AlertKind::ErrorRate,
            status,
            message,
            value,
            self.rate_threshold,
            now,
        ))
    }
}
