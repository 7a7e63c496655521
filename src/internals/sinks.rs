//! Destinations the error pipeline forwards records to.
//!
//! Transport is a collaborator's concern: implement [`TelemetrySink`] or
//! [`AlertSink`] to ship records elsewhere. [`TracingSink`] emits them as
//! structured tracing events and is the default for both.

use crate::core_types::ErrorRecord;
use crate::logging::{log_error, log_info};
use async_trait::async_trait;

/// Receives every processed record when telemetry is enabled.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn emit(&self, record: &ErrorRecord) -> anyhow::Result<()>;
}

/// Receives records whose severity is in the configured alert set.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, record: &ErrorRecord) -> anyhow::Result<()>;
}

/// Writes records to the `resilience::telemetry` and `resilience::alert`
/// tracing targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl TelemetrySink for TracingSink {
    async fn emit(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        log_info!(
            target: "resilience::telemetry",
            record = %record.to_json(),
            "error telemetry"
        );
        Ok(())
    }
}

#[async_trait]
impl AlertSink for TracingSink {
    async fn alert(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        log_error!(
            target: "resilience::alert",
            record_id = %record.id,
            operation = %record.context.operation,
            severity = %record.severity,
            category = %record.category,
            error = %record.error,
            "error alert"
        );
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl TelemetrySink for NoopSink {
    async fn emit(&self, _record: &ErrorRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for NoopSink {
    async fn alert(&self, _record: &ErrorRecord) -> anyhow::Result<()> {
        Ok(())
    }
}
