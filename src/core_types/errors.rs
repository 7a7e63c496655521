//! Error occurrence model: context, classification, and the record routed
//! through the error pipeline.

use crate::core_types::classification;
use crate::error::ResilienceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// System is unusable or data integrity is at risk.
    Critical,
    /// Action failed and needs investigation.
    High,
    /// Unexpected but recoverable.
    Medium,
    /// Minor, usually caller-side.
    Low,
    /// Informational only.
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level categorization of errors for routing and handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    System,
    Network,
    Database,
    Api,
    Auth,
    Validation,
    Business,
    Resource,
    Config,
    Dependency,
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "SYSTEM",
            Self::Network => "NETWORK",
            Self::Database => "DATABASE",
            Self::Api => "API",
            Self::Auth => "AUTH",
            Self::Validation => "VALIDATION",
            Self::Business => "BUSINESS",
            Self::Resource => "RESOURCE",
            Self::Config => "CONFIG",
            Self::Dependency => "DEPENDENCY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and under which circumstances an error occurred.
///
/// Built once at the call site with the `with_*` methods and never changed
/// afterwards.
///
/// # Example
///
/// ```rust
/// use resilience_core::ErrorContext;
///
/// let context = ErrorContext::new("billing", "charge_card")
///     .with_user_id("u-42")
///     .with_request_id("req-7")
///     .with_info("amount_cents", 1299);
/// assert_eq!(context.operation, "charge_card");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Wall-clock time the context was created.
    pub timestamp: DateTime<Utc>,
    /// Subsystem reporting the error.
    pub component: String,
    /// Named operation that failed.
    pub operation: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    /// Snapshot of the input the operation was called with.
    pub input: Option<serde_json::Value>,
    /// Free-form additional fields.
    pub additional_info: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            component: component.into(),
            operation: operation.into(),
            user_id: None,
            session_id: None,
            request_id: None,
            input: None,
            additional_info: BTreeMap::new(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach a snapshot of the operation's input. Values that fail to
    /// serialize are skipped.
    pub fn with_input(mut self, input: impl Serialize) -> Self {
        self.input = serde_json::to_value(input).ok();
        self
    }

    /// Add one key/value pair to the additional info map.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.additional_info.insert(key.into(), v);
        }
        self
    }
}

/// A single classified error occurrence.
///
/// Severity and category are assigned by the categorizer when the record is
/// built and are read-only afterwards. The `handled` flag is flipped by the
/// pipeline worker after every sink and handler has seen the record, and the
/// record is dropped right after, so sinks and handlers always observe
/// `handled == false`. Nothing is retained once processing ends.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Correlation id.
    pub id: Uuid,
    /// The failure itself.
    pub error: ResilienceError,
    pub severity: Severity,
    pub category: Category,
    pub context: ErrorContext,
    /// Backtrace captured at creation, regardless of `RUST_BACKTRACE`.
    pub stack_trace: String,
    /// Suggested remediation for operators.
    pub resolution_steps: Vec<String>,
    pub(crate) handled: bool,
}

impl ErrorRecord {
    /// Classify `error` and capture the current backtrace.
    pub fn from_error(error: ResilienceError, context: ErrorContext) -> Self {
        let message = error.to_string();
        let (category, severity) = classification::categorize(error.type_name(), &message);
        let backtrace = Backtrace::force_capture();

        Self {
            id: Uuid::new_v4(),
            error,
            severity,
            category,
            context,
            stack_trace: backtrace.to_string(),
            resolution_steps: classification::resolution_steps(category),
            handled: false,
        }
    }

    /// Whether the pipeline worker has finished with this record. Only the
    /// worker's own copy ever reads `true`.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Structured form handed to telemetry and alert sinks.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "error_type": self.error.type_name(),
            "message": self.error.to_string(),
            "severity": self.severity,
            "category": self.category,
            "context": self.context,
            "stack_trace": self.stack_trace,
            "resolution_steps": self.resolution_steps,
            "handled": self.handled,
        })
    }
}
