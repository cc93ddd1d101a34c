//! Input adapters for the httpmon agent.
//!
//! Each [`EventSource`] turns some raw input into [`NormalizedEvent`]s for
//! the window. The only built-in source is [`source::AccessLogSource`],
//! which tails a Common Log Format file.

pub mod error;
pub mod parser;
pub mod source;
pub mod tailer;

use error::Result;
use httpmon_common::types::NormalizedEvent;

/// A producer of request events, polled by the agent's ingest loop.
pub trait EventSource: Send {
    /// Short name used in logs (e.g., `"access_log"`).
    fn name(&self) -> &str;

    /// Returns the events that became available since the previous poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying input cannot be read. Individual
    /// malformed records are skipped, not reported as errors.
    fn poll(&mut self) -> Result<Vec<NormalizedEvent>>;
}
