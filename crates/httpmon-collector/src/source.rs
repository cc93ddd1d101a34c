use crate::error::Result;
use crate::parser::parse_event;
use crate::tailer::LogTailer;
use crate::EventSource;
use httpmon_common::types::NormalizedEvent;
use std::path::PathBuf;

/// Tails an access log and parses each new line.
///
/// Lines that fail to parse are logged and counted, never fatal.
pub struct AccessLogSource {
    tailer: LogTailer,
    skipped: u64,
}

impl AccessLogSource {
    pub fn new(path: impl Into<PathBuf>, read_from_start: bool) -> Self {
        Self {
            tailer: LogTailer::new(path, read_from_start),
            skipped: 0,
        }
    }

    /// Lines dropped as malformed since this source was created.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl EventSource for AccessLogSource {
    fn name(&self) -> &str {
        "access_log"
    }

    fn poll(&mut self) -> Result<Vec<NormalizedEvent>> {
        let lines = self.tailer.read_new_lines()?;
        let mut events = Vec::with_capacity(lines.len());
        for line in &lines {
            match parse_event(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(
                        path = %self.tailer.path().display(),
                        error = %e,
                        "Skipping malformed log line"
                    );
                }
            }
        }
        Ok(events)
    }
}
