use crate::bucket::TrafficCounts;
use crate::error::{require_positive, Result};
use crate::rules::{Check, Hysteresis};
use crate::AlertEvaluator;
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind, AlertStatus};

/// Single-source flood detector: fires when the busiest client in the
/// window has made at least `visits_threshold` requests.
///
/// When several clients share the top count the lexicographically smallest
/// address is the one checked and reported.
#[derive(Debug)]
pub struct ConcentrationRule {
    visits_threshold: f64,
    window_secs: f64,
    hysteresis: Hysteresis,
}

impl ConcentrationRule {
    pub fn new(visits_threshold: f64, window_secs: f64) -> Result<Self> {
        Ok(Self {
            visits_threshold: require_positive("concentration_threshold", visits_threshold)?,
            window_secs: require_positive("reporting_window_secs", window_secs)?,
            hysteresis: Hysteresis::default(),
        })
    }

    fn check(&self, totals: &TrafficCounts) -> Check {
        if totals.total == 0 {
            return Check::Inert;
        }
        let Some((_, hits)) = totals.by_client.max_entry() else {
            return Check::Inert;
        };
        let value = hits as f64;
        if value >= self.visits_threshold {
            Check::Breached { value }
        } else {
            Check::Normal { value }
        }
    }
}

impl AlertEvaluator for ConcentrationRule {
    fn kind(&self) -> AlertKind {
        AlertKind::Concentration
    }

    fn is_active(&self) -> bool {
        self.hysteresis.is_active()
    }

    fn last_message(&self) -> Option<&str> {
        self.hysteresis.last_message()
    }

    fn evaluate(&mut self, totals: &TrafficCounts, now: DateTime<Utc>) -> Option<AlertEvent> {
        let (status, value) = self.hysteresis.step(self.check(totals))?;
        let message = match (status, totals.by_client.max_entry()) {
            (AlertStatus::Active, Some((client, hits))) => format!(
                "{} requests above threshold - {} ({:.0}% total traffic) in the last {} seconds",
                client,
                hits,
                hits as f64 / totals.total as f64 * 100.0,
                self.window_secs
            ),
            _ => "Per-client requests returned to normal range".to_string(),
        };
        Some(self.hysteresis.emit(
            AlertKind::Concentration,
            status,
            message,
            value,
            self.visits_threshold,
            now,
        ))
    }
}
