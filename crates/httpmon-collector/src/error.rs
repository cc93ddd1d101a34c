/// Errors raised while reading or parsing access log input.
///
/// # Examples
///
/// ```rust
/// use httpmon_collector::error::CollectorError;
///
/// let err = CollectorError::Parse {
///     reason: "missing status code".to_string(),
///     line: "garbage".to_string(),
/// };
/// assert!(err.to_string().contains("missing status code"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The line does not follow the Common Log Format.
    #[error("Collector: malformed log line ({reason}): {line}")]
    Parse { reason: String, line: String },

    /// The log file could not be opened or read.
    #[error("Collector: failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience `Result` alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;
