//! Application error model with tool-result mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to a stable, serializable [`ErrorKind`] so tool
//! handlers can embed failures in their normal response shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type
///
/// Covers all error cases the mail server may encounter. Each variant maps
/// to an [`ErrorKind`] exposed to callers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A date filter did not parse as `YYYY-MM-DD`
    #[error("invalid format for {field} '{value}'; use YYYY-MM-DD")]
    InvalidDateFormat {
        /// Name of the offending parameter
        field: &'static str,
        /// Value as supplied by the caller
        value: String,
    },
    /// Search called without any text, sender, or date term
    #[error("no search criteria specified; provide search_text, sender_filter, since_date or before_date")]
    NoCriteriaSpecified,
    /// Attachment path missing at send time
    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),
    /// Transport session could not be established, authenticated, or used
    #[error("connection error: {0}")]
    Connection(String),
    /// Operation timeout (TCP connect, TLS handshake, IMAP response)
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Resource not found (folder, message)
    #[error("not found: {0}")]
    NotFound(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable error classification returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidDateFormat,
    NoCriteriaSpecified,
    AttachmentNotFound,
    ConnectionError,
    Timeout,
    NotFound,
    Internal,
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify this error for the caller-facing result
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_input`
    /// - `InvalidDateFormat` → `invalid_date_format`
    /// - `NoCriteriaSpecified` → `no_criteria_specified`
    /// - `AttachmentNotFound` → `attachment_not_found`
    /// - `Connection` → `connection_error`
    /// - `Timeout` → `timeout`
    /// - `NotFound` → `not_found`
    /// - `Internal` → `internal`
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidDateFormat { .. } => ErrorKind::InvalidDateFormat,
            Self::NoCriteriaSpecified => ErrorKind::NoCriteriaSpecified,
            Self::AttachmentNotFound(_) => ErrorKind::AttachmentNotFound,
            Self::Connection(_) => ErrorKind::ConnectionError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::{AppError, ErrorKind};

    #[test]
    fn error_kinds_serialize_as_snake_case() {
        let kind = AppError::Connection("refused".to_owned()).kind();
        assert_eq!(kind, ErrorKind::ConnectionError);
        assert_eq!(
            serde_json::to_value(kind).expect("serializes"),
            serde_json::json!("connection_error")
        );
    }

    #[test]
    fn date_format_error_names_field_and_value() {
        let err = AppError::InvalidDateFormat {
            field: "since_date",
            value: "2025/01/01".to_owned(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidDateFormat);
        assert_eq!(
            err.to_string(),
            "invalid format for since_date '2025/01/01'; use YYYY-MM-DD"
        );
    }
}
