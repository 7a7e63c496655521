//! Configuration for retry, circuit breaking, fallback and the error pipeline.
//!
//! Every config type has a `Default` and a set of `with_*` builders. The
//! [`ResilienceConfig`] document ties them together:
//!
//! ```json
//! {
//!   "global_retry": { "max_retries": 3, "strategy": "exponential", "base_delay": 0.5 },
//!   "global_circuit_breaker": { "failure_threshold": 5, "recovery_timeout": 30.0 },
//!   "global_fallback": { "enabled": true, "max_fallbacks": 2 },
//!   "operations": {
//!     "fetch_invoice": { "retry": { "max_retries": 1 } }
//!   },
//!   "queue_capacity": 1000,
//!   "worker_count": 2,
//!   "alert_severities": ["CRITICAL", "HIGH"]
//! }
//! ```
//!
//! Durations are expressed in (fractional) seconds. Operation sections
//! override individual fields of the matching global section.

use crate::core_types::Severity;
use crate::error::{ErrorKind, ResilienceError, ResilienceResult};
use crate::internals::retry;
use crate::logging::log_debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Serialize `Duration` as fractional seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Constant `base` delay.
    Fixed,
    /// `base * 2^(attempt-1)`.
    Exponential,
    /// `base * fib(attempt)`.
    Fibonacci,
    /// Uniform in `[base, base * attempt]`.
    Random,
}

/// Retry configuration for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Multiply each delay by a uniform factor in `[0.9, 1.1]`.
    pub jitter: bool,
    /// Failures of these kinds (or their descendants) are never retried.
    pub non_retryable: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: RetryStrategy::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
            non_retryable: Vec::new(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_non_retryable(mut self, kind: ErrorKind) -> Self {
        self.non_retryable.push(kind);
        self
    }

    /// Total number of attempts, the initial call included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Backoff before the retry that follows `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        retry::delay(
            self.strategy,
            attempt,
            self.base_delay,
            self.max_delay,
            self.jitter,
        )
    }

    /// Whether `error` may be retried under this configuration.
    pub fn should_retry(&self, error: &ResilienceError) -> bool {
        let kind = error.kind();
        error.is_retryable() && !self.non_retryable.iter().any(|k| kind.is_a(*k))
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_delay < self.base_delay {
            return Err(ResilienceError::configuration_error(format!(
                "retry max_delay ({:?}) is shorter than base_delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

/// Circuit breaker configuration for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before allowing a trial call.
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,
    /// Successes in half-open needed to close the circuit.
    pub success_threshold: u32,
    /// Upper bound on a single primary or fallback call.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// When non-empty, only these kinds count as failures.
    pub include: Vec<ErrorKind>,
    /// These kinds never count as failures.
    pub exclude: Vec<ErrorKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, recovery_timeout: Duration) -> Self {
        self.recovery_timeout = recovery_timeout;
        self
    }

    pub fn with_success_threshold(mut self, success_threshold: u32) -> Self {
        self.success_threshold = success_threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_include(mut self, kind: ErrorKind) -> Self {
        self.include.push(kind);
        self
    }

    pub fn with_exclude(mut self, kind: ErrorKind) -> Self {
        self.exclude.push(kind);
        self
    }

    /// Whether a failure of `kind` counts towards opening the circuit.
    ///
    /// Matching follows the kind hierarchy, so excluding `Network` also
    /// excludes `Timeout`.
    pub fn counts_failure(&self, kind: ErrorKind) -> bool {
        if self.exclude.iter().any(|k| kind.is_a(*k)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|k| kind.is_a(*k))
    }

    pub fn validate(&self) -> ResilienceResult<()> {
        if self.failure_threshold == 0 {
            return Err(ResilienceError::configuration_error(
                "circuit breaker failure_threshold must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(ResilienceError::configuration_error(
                "circuit breaker success_threshold must be at least 1",
            ));
        }
        if self.timeout.is_zero() {
            return Err(ResilienceError::configuration_error(
                "circuit breaker timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Fallback
// ============================================================================

/// Fallback configuration for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    /// Names of registered fallback strategies, tried in order.
    pub strategies: Vec<String>,
    /// Upper bound on fallbacks attempted per primary failure.
    pub max_fallbacks: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategies: Vec::new(),
            max_fallbacks: 3,
        }
    }
}

impl FallbackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategies.push(name.into());
        self
    }

    pub fn with_max_fallbacks(mut self, max_fallbacks: usize) -> Self {
        self.max_fallbacks = max_fallbacks;
        self
    }
}

// ============================================================================
// Pipeline and document
// ============================================================================

/// Framework-level settings for the error pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Bounded queue size. Records beyond it are dropped.
    pub queue_capacity: usize,
    /// Fixed number of worker tasks.
    pub worker_count: usize,
    /// Log every record. When false only `CRITICAL` and `HIGH` are logged.
    pub log_all_errors: bool,
    /// Forward records to the telemetry sink.
    pub telemetry_enabled: bool,
    /// Severities forwarded to the alert sink.
    pub alert_severities: Vec<Severity>,
    /// How long a worker waits on an empty queue before re-checking for
    /// shutdown.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Upper bound on waiting for workers to exit.
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 2,
            log_all_errors: true,
            telemetry_enabled: true,
            alert_severities: vec![Severity::Critical, Severity::High],
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.queue_capacity == 0 {
            return Err(ResilienceError::configuration_error(
                "queue_capacity must be at least 1",
            ));
        }
        if self.worker_count == 0 {
            return Err(ResilienceError::configuration_error(
                "worker_count must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Per-operation overrides. Each section holds only the fields that differ
/// from the corresponding global section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationOverrides {
    pub retry: Option<serde_json::Value>,
    pub circuit_breaker: Option<serde_json::Value>,
    pub fallback: Option<serde_json::Value>,
}

/// Fully resolved configuration sections for one operation. `None` means
/// the operation uses the global section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationConfig {
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub fallback: Option<FallbackConfig>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub global_retry: RetryConfig,
    pub global_circuit_breaker: CircuitBreakerConfig,
    pub global_fallback: FallbackConfig,
    pub operations: BTreeMap<String, OperationOverrides>,
    #[serde(flatten)]
    pub pipeline: PipelineSettings,
}

impl ResilienceConfig {
    /// Parse a JSON configuration document and validate it.
    pub fn from_json_str(json: &str) -> ResilienceResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ResilienceError::configuration_error(format!("invalid configuration document: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ResilienceResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ResilienceError::configuration_error(format!(
                "cannot read configuration file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Load configuration from the environment.
    ///
    /// `RESILIENCE_CONFIG` names an optional JSON file. The pipeline settings
    /// `RESILIENCE_QUEUE_CAPACITY`, `RESILIENCE_WORKER_COUNT`,
    /// `RESILIENCE_LOG_ALL_ERRORS` and `RESILIENCE_TELEMETRY_ENABLED` override
    /// the file (or the defaults).
    pub fn from_env() -> ResilienceResult<Self> {
        let mut config = match std::env::var("RESILIENCE_CONFIG") {
            Ok(path) => {
                log_debug!(path = %path, "Loading resilience configuration file");
                Self::from_file(path)?
            }
            Err(_) => Self::default(),
        };

        if let Some(capacity) = Self::env_param::<usize>("RESILIENCE_QUEUE_CAPACITY")? {
            config.pipeline.queue_capacity = capacity;
        }
        if let Some(workers) = Self::env_param::<usize>("RESILIENCE_WORKER_COUNT")? {
            config.pipeline.worker_count = workers;
        }
        if let Some(log_all) = Self::env_param::<bool>("RESILIENCE_LOG_ALL_ERRORS")? {
            config.pipeline.log_all_errors = log_all;
        }
        if let Some(telemetry) = Self::env_param::<bool>("RESILIENCE_TELEMETRY_ENABLED")? {
            config.pipeline.telemetry_enabled = telemetry;
        }

        config.validate()?;

        log_debug!(
            operations = config.operations.len(),
            queue_capacity = config.pipeline.queue_capacity,
            worker_count = config.pipeline.worker_count,
            "Resilience configuration loaded and validated"
        );

        Ok(config)
    }

    /// Validate globals, pipeline settings and every operation override.
    pub fn validate(&self) -> ResilienceResult<()> {
        self.global_retry.validate()?;
        self.global_circuit_breaker.validate()?;
        self.pipeline.validate()?;
        self.resolve_operations().map(|_| ())
    }

    /// Merge each operation's overrides over the global sections.
    pub fn resolve_operations(&self) -> ResilienceResult<BTreeMap<String, OperationConfig>> {
        self.operations
            .iter()
            .map(|(name, overrides)| -> ResilienceResult<(String, OperationConfig)> {
                let resolved = OperationConfig {
                    retry: Self::merge_section(name, &self.global_retry, overrides.retry.as_ref())?,
                    circuit_breaker: Self::merge_section(
                        name,
                        &self.global_circuit_breaker,
                        overrides.circuit_breaker.as_ref(),
                    )?,
                    fallback: Self::merge_section(
                        name,
                        &self.global_fallback,
                        overrides.fallback.as_ref(),
                    )?,
                };
                if let Some(retry) = &resolved.retry {
                    retry.validate()?;
                }
                if let Some(breaker) = &resolved.circuit_breaker {
                    breaker.validate()?;
                }
                Ok((name.clone(), resolved))
            })
            .collect()
    }

    fn merge_section<T: Serialize + DeserializeOwned>(
        operation: &str,
        global: &T,
        overrides: Option<&serde_json::Value>,
    ) -> ResilienceResult<Option<T>> {
        let Some(overrides) = overrides else {
            return Ok(None);
        };
        let Some(fields) = overrides.as_object() else {
            return Err(ResilienceError::configuration_error(format!(
                "override section for operation {operation} must be an object"
            )));
        };

        let mut merged = serde_json::to_value(global).map_err(|e| {
            ResilienceError::configuration_error(format!("cannot serialize global section: {e}"))
        })?;
        if let Some(target) = merged.as_object_mut() {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }

        serde_json::from_value(merged).map(Some).map_err(|e| {
            ResilienceError::configuration_error(format!(
                "invalid override for operation {operation}: {e}"
            ))
        })
    }

    fn env_param<T: std::str::FromStr>(key: &str) -> ResilienceResult<Option<T>> {
        match std::env::var(key) {
            Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                ResilienceError::configuration_error(format!("invalid value for {key}: {raw}"))
            }),
            Err(_) => Ok(None),
        }
    }
}
