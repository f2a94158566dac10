//! Error types for model invocation.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`LlmError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Authentication failed (invalid/missing API key).
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// Request to the model provider failed.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Streaming response encountered an error.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// Provider refused the request because a quota or rate limit was hit.
    pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

    /// Request or operation timed out.
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";

    /// Provider-specific error not covered by other variants.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
}

/// Errors produced by model providers.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Authentication failed (invalid/missing API key).
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthError(String),

    /// Request to the model provider failed.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Streaming response encountered an error.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// Quota or rate limit exhausted.
    #[error("[{}] {}", error_codes::QUOTA_EXCEEDED, .0)]
    QuotaError(String),

    /// Request or operation timed out.
    #[error("[{}] {}", error_codes::TIMEOUT_ERROR, .0)]
    TimeoutError(String),

    /// Provider-specific error not covered by other variants.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    ProviderError(String),
}

impl LlmError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthError(_) => error_codes::AUTH_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::QuotaError(_) => error_codes::QUOTA_EXCEEDED,
            Self::TimeoutError(_) => error_codes::TIMEOUT_ERROR,
            Self::ProviderError(_) => error_codes::PROVIDER_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::ConfigError(m)
            | Self::AuthError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::QuotaError(m)
            | Self::TimeoutError(m)
            | Self::ProviderError(m) => m,
        }
    }

    /// Returns true if this error represents a transient failure that can be retried.
    ///
    /// Quota errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConfigError(_) | Self::AuthError(_) | Self::QuotaError(_) => false,
            Self::RequestError(_) | Self::StreamError(_) | Self::TimeoutError(_) => true,
            Self::ProviderError(_) => true,
        }
    }

    /// Whether this error is a quota/rate-limit rejection.
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaError(_))
    }
}

/// Convenience alias for model-layer results.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(LlmError::ConfigError("x".into()).code(), "CONFIG_INVALID");
        assert_eq!(LlmError::AuthError("x".into()).code(), "AUTH_FAILED");
        assert_eq!(LlmError::RequestError("x".into()).code(), "REQUEST_FAILED");
        assert_eq!(LlmError::StreamError("x".into()).code(), "STREAM_FAILED");
        assert_eq!(LlmError::QuotaError("x".into()).code(), "QUOTA_EXCEEDED");
        assert_eq!(LlmError::TimeoutError("x".into()).code(), "TIMEOUT_ERROR");
        assert_eq!(LlmError::ProviderError("x".into()).code(), "PROVIDER_ERROR");
    }

    #[test]
    fn display_includes_code_prefix() {
        let err = LlmError::QuotaError("429 from upstream".into());
        let display = format!("{err}");
        assert!(display.starts_with("[QUOTA_EXCEEDED]"));
        assert!(display.contains("429 from upstream"));
    }

    #[test]
    fn message_strips_code() {
        let err = LlmError::TimeoutError("30s elapsed".into());
        assert_eq!(err.message(), "30s elapsed");
    }

    #[test]
    fn quota_is_not_retryable() {
        let err = LlmError::QuotaError("limit".into());
        assert!(!err.is_retryable());
        assert!(err.is_quota());
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(LlmError::RequestError("reset".into()).is_retryable());
        assert!(LlmError::StreamError("eof".into()).is_retryable());
        assert!(LlmError::TimeoutError("slow".into()).is_retryable());
        assert!(LlmError::ProviderError("503".into()).is_retryable());
        assert!(!LlmError::AuthError("401".into()).is_retryable());
        assert!(!LlmError::ConfigError("no model".into()).is_retryable());
    }
}
