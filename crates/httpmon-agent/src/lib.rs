//! Access log monitor: tails a log, keeps a rolling traffic window and
//! raises hysteresis alerts over it.

pub mod config;
pub mod monitor;
