// Test helper utilities shared by the unit test modules.
//
// IMPORTANT: These helpers are test-only and should NEVER be used in production code.

#![allow(dead_code)]

use crate::config::{PipelineSettings, ResilienceConfig, RetryConfig, RetryStrategy};
use crate::core_types::ErrorRecord;
use crate::error::{ErrorKind, ResilienceError};
use crate::internals::sinks::{AlertSink, TelemetrySink};
use crate::composer::Resilience;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink that keeps every record it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<ErrorRecord>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .map(|r| r.context.operation)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn emit(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn alert(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Retry config with 1ms fixed delays so tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(max_retries)
        .with_strategy(RetryStrategy::Fixed)
        .with_base_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(1))
        .with_jitter(false)
}

/// Default document with fast retries and a small pipeline.
pub fn test_config() -> ResilienceConfig {
    ResilienceConfig {
        global_retry: fast_retry(0),
        pipeline: PipelineSettings {
            queue_capacity: 64,
            worker_count: 2,
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_millis(200),
            ..PipelineSettings::default()
        },
        ..ResilienceConfig::default()
    }
}

/// Build a started `Resilience` whose telemetry and alerts are recorded.
pub fn recording_resilience(
    config: ResilienceConfig,
) -> (Resilience, Arc<RecordingSink>, Arc<RecordingSink>) {
    let telemetry = RecordingSink::new();
    let alerts = RecordingSink::new();
    let resilience = Resilience::builder(config)
        .with_component("test")
        .with_telemetry(telemetry.clone())
        .with_alerts(alerts.clone())
        .build()
        .expect("test resilience should build");
    (resilience, telemetry, alerts)
}

pub fn failure(kind: ErrorKind, message: &str) -> ResilienceError {
    ResilienceError::operation_failed(kind, message)
}

/// Let the pipeline workers drain everything queued so far.
///
/// Tests using this run with a paused clock, so the sleep only completes
/// once every other task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
