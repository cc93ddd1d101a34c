//! Built-in evaluators: overall traffic, server error rate and per-client
//! concentration. They share the two-state [`Hysteresis`] tracker.

pub mod concentration;
pub mod error_rate;
pub mod traffic;

use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind, AlertStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertState {
    #[default]
    Inactive,
    Active,
}

/// Result of checking one predicate against the rolling totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Check {
    /// Not enough information to judge; status is left as is.
    Inert,
    Breached { value: f64 },
    Normal { value: f64 },
}

/// Active/Inactive flag that only reports transitions.
#[derive(Debug, Default)]
pub struct Hysteresis {
    state: AlertState,
    last_message: Option<String>,
}

impl Hysteresis {
    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == AlertState::Active
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Apply a check and return the new status and the measured value if
    /// the state flipped.
    pub fn step(&mut self, check: Check) -> Option<(AlertStatus, f64)> {
        match (self.state, check) {
            (AlertState::Inactive, Check::Breached { value }) => {
                self.state = AlertState::Active;
                Some((AlertStatus::Active, value))
            }
            (AlertState::Active, Check::Normal { value }) => {
                self.state = AlertState::Inactive;
                Some((AlertStatus::Recovered, value))
            }
            _ => None,
        }
    }

    pub(crate) fn emit(
        &mut self,
        kind: AlertKind,
        status: AlertStatus,
        message: String,
        value: f64,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> AlertEvent {
        self.last_message = Some(message.clone());
        AlertEvent {
            kind,
            status,
            message,
            value,
            threshold,
            timestamp: now,
        }
    }
}
