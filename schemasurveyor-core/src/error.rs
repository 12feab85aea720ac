//! Error types for schema inference and versioning.
//!
//! Every failure is classified into one of four categories: invalid input
//! that should never be retried, processing failures on malformed content,
//! budget violations (size, depth, wall clock), and external service
//! failures. Budget violations are always reported separately from
//! malformed-input errors so callers can tell "too big / too slow" apart from
//! "broken".

use std::time::Duration;
use thiserror::Error;

/// Coarse classification used by callers to decide how to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input (wrong extension, unknown format, oversized file)
    Validation,
    /// Malformed document, unreadable database, missing compiler
    Processing,
    /// Wall-clock budget exceeded
    Timeout,
    /// Failure of an external collaborator such as the description backend
    ExternalService,
}

/// Main error type for SchemaSurveyor operations.
#[derive(Debug, Error)]
pub enum SurveyError {
    /// Input rejected before any processing started
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// No parser exists for the requested format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// File exceeds the configured size ceiling
    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// Document nesting exceeds the parser's recursion limit
    #[error("Maximum nesting depth of {limit} exceeded")]
    DepthLimitExceeded { limit: usize },

    /// Parsing or introspection failed on malformed or unreadable input
    #[error("Processing failed: {context}")]
    Processing {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A stage exceeded its wall-clock budget
    #[error("{stage} exceeded time budget of {}s", budget.as_secs())]
    Timeout { stage: String, budget: Duration },

    /// External service call failed after all recovery attempts
    #[error("External service failed: {context}")]
    ExternalService {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Persisted snapshot does not match the snapshot format
    #[error("Snapshot validation failed: {message}")]
    SnapshotValidation { message: String },

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with SurveyError
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Message-only error used as a `source` when no underlying error exists.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct Malformed(pub String);

impl SurveyError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a processing error wrapping an underlying error
    pub fn processing<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Processing {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a processing error from a plain message
    pub fn malformed(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::processing(context, Malformed(detail.into()))
    }

    /// Creates a timeout error for the named stage
    pub fn timeout(stage: impl Into<String>, budget: Duration) -> Self {
        Self::Timeout {
            stage: stage.into(),
            budget,
        }
    }

    /// Creates an external service error
    pub fn external_service<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ExternalService {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Maps the error onto the four-way taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. }
            | Self::UnsupportedFormat { .. }
            | Self::FileTooLarge { .. }
            | Self::Configuration { .. }
            | Self::SnapshotValidation { .. } => ErrorCategory::Validation,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::ExternalService { .. } => ErrorCategory::ExternalService,
            Self::DepthLimitExceeded { .. }
            | Self::Processing { .. }
            | Self::Io { .. }
            | Self::Serialization { .. } => ErrorCategory::Processing,
        }
    }

    /// Returns true for size, depth and time budget violations.
    pub fn is_budget_violation(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. } | Self::DepthLimitExceeded { .. } | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = SurveyError::validation("Invalid file type. Expected .desc or .proto");
        assert!(error.to_string().contains("Expected .desc or .proto"));

        let error = SurveyError::configuration("max_samples must be positive");
        assert!(error.to_string().contains("max_samples"));
    }

    #[test]
    fn test_timeout_is_distinct_from_processing() {
        let timeout = SurveyError::timeout("XML parsing", Duration::from_secs(300));
        assert_eq!(timeout.category(), ErrorCategory::Timeout);
        assert!(timeout.is_budget_violation());
        assert!(timeout.to_string().contains("300s"));

        let malformed = SurveyError::malformed("Invalid JSON", "expected value at line 1");
        assert_eq!(malformed.category(), ErrorCategory::Processing);
        assert!(!malformed.is_budget_violation());
    }

    #[test]
    fn test_budget_violations() {
        let too_large = SurveyError::FileTooLarge {
            size: 200,
            limit: 100,
        };
        assert!(too_large.is_budget_violation());
        assert_eq!(too_large.category(), ErrorCategory::Validation);

        let too_deep = SurveyError::DepthLimitExceeded { limit: 128 };
        assert!(too_deep.is_budget_violation());
    }

    #[test]
    fn test_processing_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = SurveyError::processing("Failed to open database", io);
        assert!(std::error::Error::source(&error).is_some());
    }
}
