//! Logging utilities for resilience-core
//!
//! Re-exports tracing macros with log_* naming convention for consistency,
//! plus a severity-keyed macro used when routing recorded errors.

// Re-export tracing macros with log_* naming
pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    trace as log_trace,
    warn as log_warn,
};

/// Emit a tracing event whose level follows an error record's [`Severity`].
///
/// `Critical` and `High` go to ERROR, `Medium` to WARN, `Low` to INFO and
/// `Info` to DEBUG. Remaining tokens are passed to the tracing macro as-is.
///
/// [`Severity`]: crate::core_types::Severity
macro_rules! log_by_severity {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            $crate::core_types::Severity::Critical | $crate::core_types::Severity::High => {
                $crate::logging::log_error!($($arg)+)
            }
            $crate::core_types::Severity::Medium => $crate::logging::log_warn!($($arg)+),
            $crate::core_types::Severity::Low => $crate::logging::log_info!($($arg)+),
            $crate::core_types::Severity::Info => $crate::logging::log_debug!($($arg)+),
        }
    };
}

pub(crate) use log_by_severity;
