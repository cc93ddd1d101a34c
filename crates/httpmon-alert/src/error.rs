/// Errors raised while building the window or the alert evaluators.
///
/// Evaluation itself never fails: zero traffic and empty windows are
/// handled by policy, so the only failure surface is configuration.
///
/// # Examples
///
/// ```rust
/// use httpmon_alert::error::AlertError;
///
/// let err = AlertError::InvalidThreshold {
///     name: "error_rate_threshold",
///     value: 1.5,
///     expected: "a ratio in (0, 1]",
/// };
/// assert!(err.to_string().contains("error_rate_threshold"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlertError {
    /// Reporting window or bucket size is unusable.
    #[error("Alert: invalid window configuration: {0}")]
    InvalidWindow(String),

    /// An alert threshold is out of its accepted range.
    #[error("Alert: invalid threshold {name}={value}: expected {expected}")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Convenience `Result` alias for window and alert construction.
pub type Result<T> = std::result::Result<T, AlertError>;

pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(AlertError::InvalidThreshold {
            name,
            value,
            expected: "a finite number greater than 0",
        })
    }
}
