//! LLM transport errors

use std::time::Duration;
use thiserror::Error;

/// Errors from a single model call
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Transient failures worth another attempt at the transport level
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout(_) => true,
            LlmError::ApiError { status, .. } => *status == 408 || *status >= 500,
            LlmError::InvalidResponse(_) | LlmError::Json(_) | LlmError::Config(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> LlmError {
        LlmError::ApiError {
            status,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_rate_limit_helpers() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert!(err.is_rate_limit());
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));

        assert!(!api(500).is_rate_limit());
        assert_eq!(api(500).retry_after(), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(api(529).is_retryable());
        assert!(api(408).is_retryable());
        assert!(!api(404).is_retryable());
        assert!(!api(422).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(LlmError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!LlmError::InvalidResponse("no content".to_string()).is_retryable());
        assert!(!LlmError::Config("ANTHROPIC_API_KEY is not set".to_string()).is_retryable());
    }
}
