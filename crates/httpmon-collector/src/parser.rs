//! Common Log Format: `%h %l %u %t "%r" %>s %b`.
//!
//! ```text
//! 127.0.0.1 - jill [09/May/2018:16:00:41 +0000] "GET /api/user HTTP/1.0" 200 234
//! ```

use crate::error::{CollectorError, Result};
use chrono::{DateTime, FixedOffset};
use httpmon_common::types::NormalizedEvent;
use regex::Regex;
use std::sync::LazyLock;

const TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static CLF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<host>\S+) (?P<ident>\S+) (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<request>[^"]*)" (?P<status>\d{3}) (?P<bytes>\S+)\s*$"#,
    )
    .expect("access log pattern is valid")
});

/// One parsed access log line.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessLogEntry {
    pub remote_host: String,
    pub remote_user: Option<String>,
    pub time: DateTime<FixedOffset>,
    pub method: String,
    pub path: String,
    pub protocol: Option<String>,
    pub status: String,
    /// `None` when the size field is `-`.
    pub bytes: Option<u64>,
}

impl AccessLogEntry {
    /// `"/"` plus the first path segment, query string ignored:
    /// `/api/user?id=1` becomes `/api`.
    pub fn endpoint_subpath(&self) -> String {
        let path = self.path.split(['?', '#']).next().unwrap_or_default();
        let first = path
            .strip_prefix('/')
            .unwrap_or(path)
            .split('/')
            .next()
            .unwrap_or_default();
        format!("/{first}")
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.time.timestamp_millis() as f64 / 1000.0
    }

    pub fn to_event(&self) -> NormalizedEvent {
        NormalizedEvent::new(
            self.timestamp_secs(),
            self.status.clone(),
            self.remote_host.clone(),
            self.endpoint_subpath(),
        )
    }
}

fn malformed(reason: impl Into<String>, line: &str) -> CollectorError {
    CollectorError::Parse {
        reason: reason.into(),
        line: line.to_string(),
    }
}

pub fn parse_line(line: &str) -> Result<AccessLogEntry> {
    let caps = CLF_RE
        .captures(line)
        .ok_or_else(|| malformed("does not match common log format", line))?;

    let time = DateTime::parse_from_str(&caps["time"], TIME_FORMAT)
        .map_err(|e| malformed(format!("bad timestamp: {e}"), line))?;

    let mut request = caps["request"].split_whitespace();
    let method = request
        .next()
        .ok_or_else(|| malformed("empty request", line))?;
    let path = request
        .next()
        .ok_or_else(|| malformed("request has no path", line))?;
    let protocol = request.next().map(str::to_string);

    let remote_user = match &caps["user"] {
        "-" => None,
        user => Some(user.to_string()),
    };
    let bytes = match &caps["bytes"] {
        "-" => None,
        raw => Some(
            raw.parse::<u64>()
                .map_err(|_| malformed(format!("bad response size {raw}"), line))?,
        ),
    };

    Ok(AccessLogEntry {
        remote_host: caps["host"].to_string(),
        remote_user,
        time,
        method: method.to_string(),
        path: path.to_string(),
        protocol,
        status: caps["status"].to_string(),
        bytes,
    })
}

/// Parse straight to the event the window consumes.
pub fn parse_event(line: &str) -> Result<NormalizedEvent> {
    parse_line(line).map(|entry| entry.to_event())
}
