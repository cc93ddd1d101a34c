use crate::bucket::TrafficCounts;
use crate::error::Result;
use crate::rules::concentration::ConcentrationRule;
use crate::rules::error_rate::ErrorRateRule;
use crate::rules::traffic::TrafficRule;
use crate::window::WindowSnapshot;
use crate::AlertEvaluator;
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Requests per second, averaged over the reporting window.
    #[serde(default = "default_traffic_threshold")]
    pub traffic_threshold: f64,
    /// Share of `5xx` responses, in `(0, 1]`.
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
    /// Requests from a single client within the reporting window.
    #[serde(default = "default_concentration_threshold")]
    pub concentration_threshold: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            traffic_threshold: default_traffic_threshold(),
            error_rate_threshold: default_error_rate_threshold(),
            concentration_threshold: default_concentration_threshold(),
        }
    }
}

fn default_traffic_threshold() -> f64 {
    10.0
}

fn default_error_rate_threshold() -> f64 {
    0.05
}

fn default_concentration_threshold() -> f64 {
    2.5
}

/// Runs every registered evaluator against the same rolling totals.
pub struct AlertEngine {
    evaluators: Vec<Box<dyn AlertEvaluator>>,
}

impl AlertEngine {
    pub fn new(evaluators: Vec<Box<dyn AlertEvaluator>>) -> Self {
        Self { evaluators }
    }

    /// The three built-in evaluators, in traffic, error-rate, concentration
    /// order. Fails on the first out-of-range threshold.
    pub fn from_config(thresholds: &AlertThresholds, window_secs: f64) -> Result<Self> {
        Ok(Self::new(vec![
            Box::new(TrafficRule::new(thresholds.traffic_threshold, window_secs)?),
            Box::new(ErrorRateRule::new(
                thresholds.error_rate_threshold,
                window_secs,
            )?),
            Box::new(ConcentrationRule::new(
                thresholds.concentration_threshold,
                window_secs,
            )?),
        ]))
    }

    pub fn evaluators(&self) -> &[Box<dyn AlertEvaluator>] {
        &self.evaluators
    }

    /// Evaluate against a window snapshot, stamping events with the
    /// snapshot time.
    pub fn evaluate(&mut self, snapshot: &WindowSnapshot) -> Vec<AlertEvent> {
        self.evaluate_at(&snapshot.counts, snapshot.taken_at)
    }

    pub fn evaluate_at(&mut self, totals: &TrafficCounts, now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for evaluator in &mut self.evaluators {
            if let Some(event) = evaluator.evaluate(totals, now) {
                tracing::debug!(
                    kind = %event.kind,
                    status = %event.status,
                    value = event.value,
                    threshold = event.threshold,
                    "Alert status changed"
                );
                events.push(event);
            }
        }
        events
    }

    pub fn active_kinds(&self) -> Vec<AlertKind> {
        self.evaluators
            .iter()
            .filter(|e| e.is_active())
            .map(|e| e.kind())
            .collect()
    }
}
