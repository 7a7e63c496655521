//! Test helper utilities for resilience-core integration tests
//!
//! This module provides reusable fixtures and helper functions that are
//! shared across integration test files.
//!
//! IMPORTANT: These helpers are test-only and should NEVER be used in production code.

// Allow dead code in test utilities - functions are used across different test files
#![allow(dead_code)]

use async_trait::async_trait;
use resilience_core::{
    AlertSink, ErrorKind, ErrorRecord, PipelineSettings, Resilience, ResilienceConfig,
    ResilienceError, RetryConfig, RetryStrategy, TelemetrySink,
};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install a test subscriber once. Set `RUST_LOG=resilience_core=debug` to
/// see the crate's events.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Collects every record handed to it, for telemetry or alert assertions.
#[derive(Debug, Default)]
pub struct CollectingSink {
    records: Mutex<Vec<ErrorRecord>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        let mut ops: Vec<String> = self
            .records()
            .into_iter()
            .map(|r| r.context.operation)
            .collect();
        ops.sort();
        ops
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl TelemetrySink for CollectingSink {
    async fn emit(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertSink for CollectingSink {
    async fn alert(&self, record: &ErrorRecord) -> anyhow::Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Create test configuration with millisecond retries and a small pipeline.
pub fn create_test_config() -> ResilienceConfig {
    ResilienceConfig {
        global_retry: RetryConfig::new()
            .with_max_retries(0)
            .with_strategy(RetryStrategy::Fixed)
            .with_base_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(false),
        pipeline: PipelineSettings {
            queue_capacity: 128,
            worker_count: 2,
            poll_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_millis(500),
            ..PipelineSettings::default()
        },
        ..ResilienceConfig::default()
    }
}

/// Build a started `Resilience` with collecting telemetry and alert sinks.
pub fn create_test_resilience(
    config: ResilienceConfig,
) -> (Resilience, Arc<CollectingSink>, Arc<CollectingSink>) {
    init_tracing();
    let telemetry = CollectingSink::new();
    let alerts = CollectingSink::new();
    let resilience = Resilience::builder(config)
        .with_component("integration")
        .with_telemetry(telemetry.clone())
        .with_alerts(alerts.clone())
        .build()
        .expect("test resilience should build");
    (resilience, telemetry, alerts)
}

pub fn failure(kind: ErrorKind, message: &str) -> ResilienceError {
    ResilienceError::operation_failed(kind, message)
}

/// Wait until `sink` holds `expected` records or `limit` elapses.
pub async fn wait_for_records(sink: &CollectingSink, expected: usize, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while sink.len() < expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
