//! Error types for resilient operations.
//!
//! This module provides the failure vocabulary shared by every layer of the
//! crate: the closed [`ErrorKind`] hierarchy used for filtering and handler
//! dispatch, and the [`ResilienceError`] value that wrapped operations return.
//!
//! # Error Kinds
//!
//! Kinds form a shallow tree. A handler or breaker filter registered for a
//! parent kind also matches its children:
//!
//! | Kind | Parent |
//! |------|--------|
//! | `Connection`, `Timeout` | `Network` |
//! | `RateLimited` | `Api` |
//! | `PermissionDenied` | `Auth` |
//! | everything else | none |
//!
//! # Error Handling Example
//!
//! ```rust
//! use resilience_core::{ErrorKind, ResilienceError};
//!
//! let err = ResilienceError::operation_failed(ErrorKind::Timeout, "upstream took too long");
//! assert!(err.kind().is_a(ErrorKind::Network));
//! assert!(err.is_retryable());
//! ```

use crate::logging::{log_debug, log_error, log_warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error kinds
// ============================================================================

/// Closed set of failure kinds understood by the resilience layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Generic network failure.
    Network,
    /// Connection refused, reset or aborted.
    Connection,
    /// A call exceeded its deadline.
    Timeout,
    /// Storage or query failure.
    Database,
    /// Remote API returned an error.
    Api,
    /// Remote API throttled the caller.
    RateLimited,
    /// Authentication failure.
    Auth,
    /// Authenticated but not allowed.
    PermissionDenied,
    /// Input failed validation.
    Validation,
    /// Memory, disk, quota or similar exhaustion.
    Resource,
    /// Missing or invalid configuration.
    Configuration,
    /// Operating system or runtime failure.
    System,
    /// A dependency is unavailable.
    Dependency,
    /// Domain rule violated.
    Business,
    /// Call rejected by an open circuit breaker.
    CircuitOpen,
    /// Anything not covered above.
    Other,
}

impl ErrorKind {
    /// Stable snake_case name, used as the failure's type name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Database => "database",
            Self::Api => "api",
            Self::RateLimited => "rate_limited",
            Self::Auth => "auth",
            Self::PermissionDenied => "permission_denied",
            Self::Validation => "validation",
            Self::Resource => "resource",
            Self::Configuration => "configuration",
            Self::System => "system",
            Self::Dependency => "dependency",
            Self::Business => "business",
            Self::CircuitOpen => "circuit_open",
            Self::Other => "other",
        }
    }

    /// Direct parent in the kind hierarchy, if any.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Connection | Self::Timeout => Some(Self::Network),
            Self::RateLimited => Some(Self::Api),
            Self::PermissionDenied => Some(Self::Auth),
            _ => None,
        }
    }

    /// This kind followed by each of its ancestors, nearest first.
    pub fn ancestors(self) -> impl Iterator<Item = Self> {
        std::iter::successors(Some(self), |kind| kind.parent())
    }

    /// Whether `self` is `other` or one of its descendants.
    pub fn is_a(self, other: Self) -> bool {
        self.ancestors().any(|kind| kind == other)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Resilience errors
// ============================================================================

/// Convenient result type for resilient operations.
pub type ResilienceResult<T> = std::result::Result<T, ResilienceError>;

/// Underlying cause attached to an operation failure.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Errors produced by wrapped operations and by the resilience layers
/// themselves.
///
/// The type is `Clone` so the same failure can be returned to the caller and
/// handed to the error pipeline.
///
/// | Variant | Kind | Retryable |
/// |---------|------|-----------|
/// | `OperationFailed` | as given | Yes |
/// | `CircuitOpen` | `CircuitOpen` | No |
/// | `Timeout` | `Timeout` | Yes |
/// | `FallbacksExhausted` | kind of last fallback failure | Yes |
/// | `ConfigurationError` | `Configuration` | No |
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    /// The wrapped operation (or a fallback) reported a failure.
    #[error("{kind} failure: {message}")]
    OperationFailed {
        /// Kind used for breaker filtering and handler dispatch.
        kind: ErrorKind,
        /// Human readable description.
        message: String,
        /// Underlying error, if the caller supplied one.
        cause: Option<Cause>,
    },

    /// The circuit breaker for the operation is open.
    #[error("Circuit breaker is open for {operation} - service temporarily unavailable")]
    CircuitOpen {
        /// Operation whose breaker rejected the call.
        operation: String,
    },

    /// A single attempt ran longer than the breaker's call timeout.
    #[error("Operation {operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout_ms: u64,
    },

    /// Every configured fallback failed after the primary call failed.
    ///
    /// Carries both the primary failure and the last fallback failure; the
    /// error reports itself as the last fallback failure.
    #[error("All fallbacks for {operation} failed: {last}")]
    FallbacksExhausted {
        /// Operation whose fallback chain was exhausted.
        operation: String,
        /// Failure of the primary call.
        primary: Box<ResilienceError>,
        /// Failure of the last fallback attempted.
        #[source]
        last: Box<ResilienceError>,
    },

    /// Resilience configuration is invalid or could not be loaded.
    #[error("Resilience configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ResilienceError {
    /// Kind of this failure. Exhausted fallback chains report the kind of
    /// the last fallback failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OperationFailed { kind, .. } => *kind,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::FallbacksExhausted { last, .. } => last.kind(),
            Self::ConfigurationError { .. } => ErrorKind::Configuration,
        }
    }

    /// Type name fed to the categorizer alongside the message.
    pub fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Whether the retry layer may try the operation again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::CircuitOpen { .. } | Self::ConfigurationError { .. }
        )
    }

    /// The underlying cause of an operation failure, if one was attached.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::OperationFailed { cause, .. } => cause.as_ref(),
            Self::FallbacksExhausted { last, .. } => last.cause(),
            _ => None,
        }
    }

    /// Failure of the primary call when the fallback chain was exhausted.
    pub fn primary_failure(&self) -> Option<&ResilienceError> {
        match self {
            Self::FallbacksExhausted { primary, .. } => Some(primary),
            _ => None,
        }
    }

    /// Convert to a message safe to show to end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::OperationFailed { .. } | Self::FallbacksExhausted { .. } => {
                "The operation could not be completed. Please try again".to_string()
            }
            Self::CircuitOpen { .. } => {
                "Service is temporarily unavailable. Please try again later".to_string()
            }
            Self::Timeout { .. } => "The operation timed out. Please try again".to_string(),
            Self::ConfigurationError { .. } => {
                "Service configuration issue. Please check your settings".to_string()
            }
        }
    }

    // =========================================================================
    // Constructor methods with automatic logging
    // =========================================================================

    /// Create an operation failure without an underlying cause.
    pub fn operation_failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        log_debug!(
            error_type = "operation_failed",
            kind = %kind,
            message = %message,
            "Operation reported failure"
        );
        Self::OperationFailed {
            kind,
            message,
            cause: None,
        }
    }

    /// Create an operation failure wrapping an underlying error.
    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let message = message.into();
        log_debug!(
            error_type = "operation_failed",
            kind = %kind,
            message = %message,
            cause = %cause,
            "Operation reported failure"
        );
        Self::OperationFailed {
            kind,
            message,
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn circuit_open(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        log_warn!(
            error_type = "circuit_open",
            operation = %operation,
            "Call rejected by open circuit breaker"
        );
        Self::CircuitOpen { operation }
    }

    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        let operation = operation.into();
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        log_warn!(
            error_type = "timeout",
            operation = %operation,
            timeout_ms = timeout_ms,
            "Operation attempt timed out"
        );
        Self::Timeout {
            operation,
            timeout_ms,
        }
    }

    pub fn fallbacks_exhausted(
        operation: impl Into<String>,
        primary: ResilienceError,
        last: ResilienceError,
    ) -> Self {
        let operation = operation.into();
        log_error!(
            error_type = "fallbacks_exhausted",
            operation = %operation,
            primary = %primary,
            last = %last,
            "Every fallback failed"
        );
        Self::FallbacksExhausted {
            operation,
            primary: Box::new(primary),
            last: Box::new(last),
        }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Resilience configuration validation failed"
        );
        Self::ConfigurationError { message }
    }
}

impl From<std::io::Error> for ResilienceError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let kind = match err.kind() {
            Io::TimedOut => ErrorKind::Timeout,
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe => ErrorKind::Connection,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::InvalidInput | Io::InvalidData => ErrorKind::Validation,
            Io::OutOfMemory => ErrorKind::Resource,
            _ => ErrorKind::System,
        };
        Self::with_cause(kind, err.to_string(), err)
    }
}
