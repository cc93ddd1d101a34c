//! Types shared by the httpmon crates.
//!
//! [`types::NormalizedEvent`] is what the collectors hand to the window,
//! [`types::AlertEvent`] is what the alert engine hands back out.

pub mod types;
