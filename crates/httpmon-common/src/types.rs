use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One access-log request reduced to the fields the aggregator counts.
///
/// Produced by the collector's parser. The aggregator trusts these fields
/// and does not re-validate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Time the request was received, as fractional epoch seconds.
    pub timestamp: f64,
    /// Raw HTTP status code, e.g. `"404"`.
    pub status_code: String,
    pub client_address: String,
    /// First path segment of the request URL, e.g. `"/api"` for `/api/user`.
    pub endpoint_subpath: String,
}

impl NormalizedEvent {
    pub fn new(
        timestamp: f64,
        status_code: impl Into<String>,
        client_address: impl Into<String>,
        endpoint_subpath: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            status_code: status_code.into(),
            client_address: client_address.into(),
            endpoint_subpath: endpoint_subpath.into(),
        }
    }

    pub fn status_class(&self) -> String {
        status_class(&self.status_code)
    }
}

/// Group a status code into its hundred-class.
///
/// # Examples
///
/// ```
/// use httpmon_common::types::status_class;
///
/// assert_eq!(status_class("200"), "200s");
/// assert_eq!(status_class("204"), "200s");
/// assert_eq!(status_class("503"), "500s");
/// assert_eq!(status_class(""), "unknown");
/// ```
pub fn status_class(code: &str) -> String {
    match code.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("{c}00s"),
        _ => "unknown".to_string(),
    }
}

/// The status class counted by the error-rate alert.
pub const SERVER_ERROR_CLASS: &str = "500s";

/// Which evaluator produced an alert.
///
/// # Examples
///
/// ```
/// use httpmon_common::types::AlertKind;
///
/// let kind: AlertKind = "error_rate".parse().unwrap();
/// assert_eq!(kind, AlertKind::ErrorRate);
/// assert_eq!(kind.to_string(), "ERROR_RATE_ALERT");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Traffic,
    ErrorRate,
    Concentration,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Traffic => write!(f, "TRAFFIC_ALERT"),
            AlertKind::ErrorRate => write!(f, "ERROR_RATE_ALERT"),
            AlertKind::Concentration => write!(f, "CONCENTRATION_ALERT"),
        }
    }
}

impl std::str::FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "traffic" | "traffic_alert" => Ok(AlertKind::Traffic),
            "error_rate" | "error_rate_alert" => Ok(AlertKind::ErrorRate),
            "concentration" | "concentration_alert" => Ok(AlertKind::Concentration),
            _ => Err(format!("unknown alert kind: {s}")),
        }
    }
}

/// The status an alert moved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Recovered,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "ALERT"),
            AlertStatus::Recovered => write!(f, "RECOVERED"),
        }
    }
}

/// Emitted by an evaluator only when its status changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub status: AlertStatus,
    pub message: String,
    /// Measured value at the time of the transition (hits, error ratio or
    /// hits from the busiest client).
    pub value: f64,
    /// Absolute threshold `value` was compared against.
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl AlertEvent {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_class_uses_leading_digit() {
        assert_eq!(status_class("301"), "300s");
        assert_eq!(status_class("404"), "400s");
        assert_eq!(status_class("x00"), "unknown");
    }

    #[test]
    fn alert_event_serializes_kind_and_status() {
        let event = AlertEvent {
            kind: AlertKind::Concentration,
            status: AlertStatus::Recovered,
            message: "back to normal".to_string(),
            value: 3.0,
            threshold: 7.5,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "concentration");
        assert_eq!(json["status"], "recovered");
        assert!(!event.is_active());
    }

    #[test]
    fn alert_kind_rejects_unknown() {
        assert!("ddos".parse::<AlertKind>().is_err());
        assert_eq!(
            "TRAFFIC_ALERT".parse::<AlertKind>().unwrap(),
            AlertKind::Traffic
        );
    }
}
