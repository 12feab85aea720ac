//! Errors raised by a description backend.

use crate::SurveyError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single backend request.
#[derive(Debug, Error)]
pub enum AiError {
    /// No response within the request budget
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Provider rejected the request for exceeding its rate limit
    #[error("Rate limited by provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Provider failed with a 5xx status
    #[error("Provider error (HTTP {status})")]
    Server { status: u16 },

    /// Network failure before a response arrived
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials were rejected
    #[error("Authentication failed (HTTP {status})")]
    Authentication { status: u16 },

    /// Request was rejected for any other reason
    #[error("Request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    /// Response body could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl AiError {
    /// True for transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Server { .. } | Self::Connection(_)
        )
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl From<AiError> for SurveyError {
    fn from(error: AiError) -> Self {
        SurveyError::external_service("Description backend request failed", error)
    }
}
