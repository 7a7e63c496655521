//! Core types for recorded errors
//!
//! ## Organization
//! - `errors` - Error context, severity, category and the routed record
//! - `classification` - Keyword heuristics assigning category and severity

pub mod classification;
pub mod errors;

// Re-export commonly used types
pub use errors::{Category, ErrorContext, ErrorRecord, Severity};
