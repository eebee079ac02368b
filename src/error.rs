//! Error types for relay operations.
//!
//! This module provides structured error handling for the gateway, including
//! categorization, severity levels, retry guidance and the HTTP status each
//! failure surfaces as.
//!
//! # Error Types
//!
//! The main error type is [`RelayError`], which covers all failure modes:
//! - Missing or revoked OAuth credentials
//! - Upstream failures during token refresh or proxying
//! - Malformed inbound requests rejected at the boundary
//! - Upstream streams dropped before completion
//! - Credential store and configuration failures
//!
//! Request repair and response conversion are total over well-formed input and
//! never produce an error.
//!
//! # Error Handling Example
//!
//! ```rust
//! use claude_relay::{RelayError, error::ErrorCategory};
//!
//! fn describe(err: &RelayError) -> &'static str {
//!     match err.category() {
//!         ErrorCategory::Transient => "try again shortly",
//!         ErrorCategory::Client => "fix the request or re-authorize",
//!         _ => "contact the operator",
//!     }
//! }
//!
//! assert_eq!(describe(&RelayError::stream_aborted("peer reset")), "try again shortly");
//! ```

use crate::logging::{log_error, log_warn};
use thiserror::Error;

// ============================================================================
// Error categorization types
// ============================================================================

/// High-level categorization of errors for routing and handling decisions.
///
/// Use [`RelayError::category()`] to get the category for any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service failures (upstream API, authorization server).
    External,

    /// Internal system errors (storage, invariant violations).
    Internal,

    /// Client errors (invalid input, missing authorization, configuration).
    ///
    /// The caller or operator made a mistake that they can fix.
    Client,

    /// Temporary failures that may succeed on a later attempt.
    Transient,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// System is unusable or data integrity is at risk.
    Critical,

    /// Action failed but system is stable.
    Error,

    /// Unexpected but recoverable situation.
    Warning,

    /// Expected failure (e.g., validation error).
    Info,
}

// ============================================================================
// Relay error types
// ============================================================================

/// Convenient result type for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying a request.
///
/// Errors are `Clone` so that one refresh outcome can be handed to every
/// caller waiting on the same in-flight refresh.
///
/// # Error Categories
///
/// | Variant | Category | Retryable | HTTP status |
/// |---------|----------|-----------|-------------|
/// | `AuthRequired` | Client | No | 401 |
/// | `UpstreamUnavailable` | External | transport failures only | upstream status or 502 |
/// | `MalformedRequest` | Client | No | 400 |
/// | `StreamAborted` | Transient | No | 502 |
/// | `Storage` | Internal | No | 500 |
/// | `Configuration` | Client | No | 500 |
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// No usable OAuth credential: never authorized, or the refresh token was
    /// rejected by the authorization server.
    #[error("Authorization required: {message}")]
    AuthRequired {
        /// Why the credential is unusable.
        message: String,
    },

    /// The upstream API or the authorization server failed.
    ///
    /// `status` is `None` for transport failures (connect, timeout, reset);
    /// otherwise it carries the upstream status and `body` its verbatim body.
    #[error("Upstream unavailable ({}): {body}", status.map(|s| s.to_string()).unwrap_or_else(|| "no response".to_string()))]
    UpstreamUnavailable {
        /// Upstream HTTP status, if a response was received.
        status: Option<u16>,
        /// Upstream body, or a transport error description.
        body: String,
    },

    /// The inbound body failed boundary validation.
    #[error("Malformed request: {message}")]
    MalformedRequest {
        /// What was wrong with the body.
        message: String,
    },

    /// The upstream connection dropped before the stream completed.
    #[error("Upstream stream aborted: {message}")]
    StreamAborted {
        /// Description of the abort.
        message: String,
    },

    /// The credential store failed to read or write.
    #[error("Credential store error: {message}")]
    Storage {
        /// Description of the store failure.
        message: String,
    },

    /// Operator configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl RelayError {
    /// Get the error category for routing decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthRequired { .. } => ErrorCategory::Client,
            Self::UpstreamUnavailable { .. } => ErrorCategory::External,
            Self::MalformedRequest { .. } => ErrorCategory::Client,
            Self::StreamAborted { .. } => ErrorCategory::Transient,
            Self::Storage { .. } => ErrorCategory::Internal,
            Self::Configuration { .. } => ErrorCategory::Client,
        }
    }

    /// Get the error severity for logging and alerting.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AuthRequired { .. } => ErrorSeverity::Error,
            Self::UpstreamUnavailable { .. } => ErrorSeverity::Warning,
            Self::MalformedRequest { .. } => ErrorSeverity::Info,
            Self::StreamAborted { .. } => ErrorSeverity::Warning,
            Self::Storage { .. } => ErrorSeverity::Critical,
            Self::Configuration { .. } => ErrorSeverity::Error,
        }
    }

    /// Whether a token-refresh attempt that failed this way may be retried.
    ///
    /// Transport failures, rate limiting and 5xx answers are transient. A
    /// 4xx answer from the authorization server is a rejection and is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { status: None, .. } => true,
            Self::UpstreamUnavailable {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// HTTP status this error surfaces as at the boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AuthRequired { .. } => 401,
            Self::UpstreamUnavailable {
                status: Some(status),
                ..
            } => *status,
            Self::UpstreamUnavailable { status: None, .. } => 502,
            Self::MalformedRequest { .. } => 400,
            Self::StreamAborted { .. } => 502,
            Self::Storage { .. } => 500,
            Self::Configuration { .. } => 500,
        }
    }

    /// Wire-level error type string used in JSON error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "authentication_error",
            Self::UpstreamUnavailable { .. } => "api_error",
            Self::MalformedRequest { .. } => "invalid_request_error",
            Self::StreamAborted { .. } => "api_error",
            Self::Storage { .. } => "api_error",
            Self::Configuration { .. } => "api_error",
        }
    }

    /// Convert to a message suitable for the calling client.
    ///
    /// `AuthRequired` carries remediation instructions; upstream failures
    /// keep the upstream body because callers need the original diagnostic.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired { message } => format!(
                "{message}. Complete the OAuth authorization flow for this gateway \
                 (or set CLAUDE_REFRESH_TOKEN and restart) before retrying"
            ),
            Self::UpstreamUnavailable { body, .. } => body.clone(),
            Self::MalformedRequest { message } => message.clone(),
            Self::StreamAborted { .. } => {
                "The upstream response ended before completion. Please retry".to_string()
            }
            Self::Storage { .. } => "Credential storage is unavailable".to_string(),
            Self::Configuration { .. } => "Gateway configuration issue".to_string(),
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    pub fn auth_required(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "auth_required",
            message = %message,
            "OAuth credential unusable, re-authorization needed"
        );
        Self::AuthRequired { message }
    }

    /// Upstream answered with a non-success status.
    pub fn upstream_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        log_warn!(
            error_type = "upstream_unavailable",
            status = status,
            body_len = body.len(),
            "Upstream returned an error status"
        );
        Self::UpstreamUnavailable {
            status: Some(status),
            body,
        }
    }

    /// Upstream could not be reached or did not answer in time.
    pub fn upstream_transport(message: impl Into<String>) -> Self {
        let body = message.into();
        log_warn!(
            error_type = "upstream_unavailable",
            message = %body,
            "Upstream transport failure"
        );
        Self::UpstreamUnavailable { status: None, body }
    }

    pub fn malformed_request(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "malformed_request",
            message = %message,
            "Inbound request rejected at the boundary"
        );
        Self::MalformedRequest { message }
    }

    pub fn stream_aborted(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(
            error_type = "stream_aborted",
            message = %message,
            "Upstream stream ended before completion"
        );
        Self::StreamAborted { message }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "storage",
            message = %message,
            "Credential store operation failed"
        );
        Self::Storage { message }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration",
            message = %message,
            "Relay configuration validation failed"
        );
        Self::Configuration { message }
    }
}
