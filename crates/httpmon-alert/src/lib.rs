//! Windowed traffic aggregation and threshold alerting for HTTP access logs.
//!
//! A [`window::WindowAggregator`] folds incoming requests into fixed-size
//! time buckets and keeps a rolling total over the reporting window. The
//! [`engine::AlertEngine`] runs [`AlertEvaluator`]s over that total and
//! reports status transitions only. Built-in evaluators cover overall
//! traffic, server error rate and per-client concentration.

pub mod bucket;
pub mod clock;
pub mod engine;
pub mod error;
pub mod rules;
pub mod window;

#[cfg(test)]
mod tests;

use bucket::TrafficCounts;
use chrono::{DateTime, Utc};
use httpmon_common::types::{AlertEvent, AlertKind};

/// A stateful predicate over the window's rolling totals.
///
/// Implementations keep their own Active/Inactive status and return an
/// [`AlertEvent`] only when that status changes. They read the totals and
/// never modify them.
pub trait AlertEvaluator: Send + Sync {
    fn kind(&self) -> AlertKind;

    fn is_active(&self) -> bool;

    /// Message of the most recent transition, if any.
    fn last_message(&self) -> Option<&str>;

    /// Check the totals as of `now` and return an event if the status flipped.
    fn evaluate(&mut self, totals: &TrafficCounts, now: DateTime<Utc>) -> Option<AlertEvent>;
}
