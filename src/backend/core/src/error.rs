//! Error handling for Skyreel Core.
//!
//! This module provides:
//! - A single error type with a machine-readable code and severity
//! - User-friendly messages vs detailed internal messages
//! - Error logging with tracing integration
//! - HTTP status code mapping for the command API
//!
//! # Usage
//!
//! ```rust,ignore
//! use skyreel_core::error::{SkyreelError, ErrorCode, Result};
//!
//! fn lookup(id: i32) -> Result<()> {
//!     Err(SkyreelError::not_found("resource", id.to_string()))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Skyreel operations.
pub type Result<T> = std::result::Result<T, SkyreelError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resource / scheduling
    ResourceNotFound,
    ResourceNotSchedulable,
    InvalidCommand,

    // Collaborators
    DatabaseError,
    DatabaseConnectionFailed,
    StorageError,
    StorageUnavailable,
    EncoderError,
    ProcessControlError,
    EmailError,
    NetworkError,
    ImageDecodeError,
    RemoteDatabaseError,

    // Timing
    Timeout,

    // Configuration
    ConfigurationError,

    // Internal
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status for responses from the command API.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::ResourceNotSchedulable | Self::InvalidCommand => StatusCode::BAD_REQUEST,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::DatabaseConnectionFailed | Self::StorageUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::NetworkError | Self::RemoteDatabaseError => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Category label used in logs and metrics.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::ResourceNotFound | Self::ResourceNotSchedulable | Self::InvalidCommand => {
                "request"
            }
            Self::DatabaseError | Self::DatabaseConnectionFailed | Self::RemoteDatabaseError => {
                "database"
            }
            Self::StorageError | Self::StorageUnavailable => "storage",
            Self::EncoderError | Self::ImageDecodeError => "media",
            Self::ProcessControlError => "process",
            Self::EmailError => "email",
            Self::NetworkError | Self::Timeout => "network",
            Self::ConfigurationError => "config",
            Self::SerializationError | Self::IoError | Self::InternalError => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity levels for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected conditions (bad request, unknown resource)
    Low,
    /// Operational problems that heal on the next cycle
    Medium,
    /// Collaborator failures
    High,
    /// Failures requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ResourceNotFound
            | ErrorCode::ResourceNotSchedulable
            | ErrorCode::InvalidCommand => Self::Low,

            ErrorCode::Timeout | ErrorCode::NetworkError | ErrorCode::ImageDecodeError => {
                Self::Medium
            }

            ErrorCode::DatabaseError
            | ErrorCode::StorageError
            | ErrorCode::EncoderError
            | ErrorCode::ProcessControlError
            | ErrorCode::EmailError
            | ErrorCode::RemoteDatabaseError
            | ErrorCode::SerializationError
            | ErrorCode::IoError
            | ErrorCode::ConfigurationError => Self::High,

            ErrorCode::DatabaseConnectionFailed
            | ErrorCode::StorageUnavailable
            | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Skyreel Core.
#[derive(Error, Debug)]
pub struct SkyreelError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for SkyreelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl SkyreelError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    /// Create a not found error.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found: {}", entity_type.into(), entity_id.into()),
        )
    }

    /// Create an invalid command error.
    pub fn invalid_command(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidCommand, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::StorageError, "Storage operation failed", message)
    }

    /// Create an encoder error.
    pub fn encoder(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::EncoderError, "Clip encoding failed", message)
    }

    /// Create a process control error.
    pub fn process(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::ProcessControlError, "Process control failed", message)
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        Self::with_internal(
            ErrorCode::Timeout,
            "Operation timed out",
            format!("{} timed out after {:?}", operation.into(), after),
        )
    }

    /// Attach a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "skyreel_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error body returned by the command API.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false for errors
    pub success: bool,
    /// Human readable message
    pub error: String,
    /// Machine readable code
    pub error_code: String,
}

impl From<&SkyreelError> for ErrorResponse {
    fn from(error: &SkyreelError) -> Self {
        Self {
            success: false,
            error: error.user_message.to_string(),
            error_code: error.code.to_string(),
        }
    }
}

impl IntoResponse for SkyreelError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.code.http_status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for SkyreelError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::ResourceNotFound, "The requested record was not found"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for SkyreelError {
    fn from(error: reqwest::Error) -> Self {
        let code = if error.is_timeout() {
            ErrorCode::Timeout
        } else {
            ErrorCode::NetworkError
        };
        Self::with_internal(code, "An HTTP request failed", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for SkyreelError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::IoError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

impl From<serde_json::Error> for SkyreelError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to serialize or deserialize data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<config::ConfigError> for SkyreelError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<lettre::transport::smtp::Error> for SkyreelError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        Self::with_internal(ErrorCode::EmailError, "Failed to send email", error.to_string())
            .with_source(error)
    }
}

impl From<lettre::error::Error> for SkyreelError {
    fn from(error: lettre::error::Error) -> Self {
        Self::with_internal(ErrorCode::EmailError, "Failed to build email", error.to_string())
            .with_source(error)
    }
}

impl From<lettre::address::AddressError> for SkyreelError {
    fn from(error: lettre::address::AddressError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Invalid email address",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<image::ImageError> for SkyreelError {
    fn from(error: image::ImageError) -> Self {
        Self::with_internal(
            ErrorCode::ImageDecodeError,
            "Failed to decode image",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::task::JoinError> for SkyreelError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::internal(format!("background task failed: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_code_and_internal() {
        let err = SkyreelError::storage("disk full");
        let text = err.to_string();
        assert!(text.contains("STORAGE_ERROR"));
        assert!(text.contains("disk full"));
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            SkyreelError::not_found("resource", "7").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            SkyreelError::timeout("ping", std::time::Duration::from_secs(1)).severity(),
            ErrorSeverity::Medium
        );
        assert_eq!(SkyreelError::encoder("boom").severity(), ErrorSeverity::High);
        assert_eq!(SkyreelError::internal("bug").severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::InvalidCommand.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Timeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_error_response_body() {
        let err = SkyreelError::invalid_command("unknown command");
        let body = ErrorResponse::from(&err);
        assert!(!body.success);
        assert_eq!(body.error, "unknown command");
        assert_eq!(body.error_code, "INVALID_COMMAND");
    }
}
