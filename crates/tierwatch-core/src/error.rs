use thiserror::Error;

/// Application-wide error types for tierwatch.
#[derive(Error, Debug)]
pub enum AppError {
    /// Upstream request exceeded its connect or read deadline.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Transport failure (connection refused, reset, DNS, protocol error).
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Upstream answered, but with something we will not retry (non-2xx).
    #[error("Upstream error: {0}")]
    UpstreamError(String),

    /// Upstream content could not be interpreted. The message is meant for
    /// callers and never carries selector or parser internals.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The requested character does not exist upstream.
    #[error("Character not found: {0}")]
    NotFound(String),

    /// The same identity was requested inside its cooldown window.
    #[error("Too many requests, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Only timeouts and transport failures qualify. HTTP status errors,
    /// parse failures and not-found are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::NetworkError(_) | AppError::Timeout(_))
    }

    /// Seconds the caller should wait, for rate-limit rejections.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(10).is_retryable());
        assert!(!AppError::UpstreamError("HTTP 503".into()).is_retryable());
        assert!(!AppError::ParseError("bad".into()).is_retryable());
        assert!(!AppError::NotFound("Siel/Nobody".into()).is_retryable());
        assert!(!AppError::RateLimited { retry_after_secs: 5 }.is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        assert_eq!(
            AppError::RateLimited { retry_after_secs: 42 }.retry_after_secs(),
            Some(42)
        );
        assert_eq!(AppError::Timeout(3).retry_after_secs(), None);
    }

    #[test]
    fn test_parse_error_message_is_generic() {
        let err = AppError::ParseError("Structure mismatch".into());
        assert_eq!(err.to_string(), "Parse error: Structure mismatch");
    }
}
