//! Composition of retry, circuit breaking and fallback around an operation.
//!
//! Layers apply outer to inner as **Retry → CircuitBreaker → Fallback →
//! primary**. For each attempt:
//! 1. ask the breaker; an open circuit fails fast with
//!    [`ResilienceError::CircuitOpen`], with no fallback and no retry
//! 2. call the primary, bounded by the breaker's call timeout
//! 3. on primary failure, try the fallback chain
//! 4. record the combined outcome on the breaker
//! 5. on failure, back off and loop while attempts remain
//!
//! Every primary and fallback failure is handed to the error pipeline as it
//! happens, so a retry that eventually succeeds is still reported.

use crate::config::{
    CircuitBreakerConfig, FallbackConfig, PipelineSettings, ResilienceConfig, RetryConfig,
};
use crate::core_types::{ErrorContext, ErrorRecord};
use crate::error::{ErrorKind, ResilienceError, ResilienceResult};
use crate::internals::call_with_timeout;
use crate::internals::circuit_breaker::CircuitBreakerMetrics;
use crate::internals::fallback::FallbackChain;
use crate::internals::pipeline::{ErrorPipeline, PipelineMetrics};
use crate::internals::sinks::{AlertSink, TelemetrySink, TracingSink};
use crate::logging::{log_debug, log_error, log_info};
use crate::registry::Registry;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

const DEFAULT_COMPONENT: &str = "resilience";

/// Which layers a wrapped call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layers {
    retry: bool,
    circuit_breaker: bool,
    fallback: bool,
}

impl Layers {
    const ALL: Self = Self {
        retry: true,
        circuit_breaker: true,
        fallback: true,
    };
    const RETRY: Self = Self {
        retry: true,
        circuit_breaker: false,
        fallback: false,
    };
    const CIRCUIT_BREAKER: Self = Self {
        retry: false,
        circuit_breaker: true,
        fallback: false,
    };
    const FALLBACK: Self = Self {
        retry: false,
        circuit_breaker: false,
        fallback: true,
    };
}

/// A wrapped operation. Cheap to clone; each clone shares the same registry
/// and pipeline.
pub struct Wrapped<A, T> {
    operation: Arc<str>,
    inner: Arc<dyn Fn(A) -> BoxFuture<'static, ResilienceResult<T>> + Send + Sync>,
}

impl<A, T> Clone for Wrapped<A, T> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T> std::fmt::Debug for Wrapped<A, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapped")
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

impl<A, T> Wrapped<A, T> {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Run the wrapped operation with `arg`.
    pub async fn call(&self, arg: A) -> ResilienceResult<T> {
        (self.inner)(arg).await
    }
}

/// Aggregate metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceMetrics {
    pub circuit_breakers: Vec<CircuitBreakerMetrics>,
    pub pipeline: PipelineMetrics,
}

/// Composition root: owns the registry and the error pipeline and wraps
/// operations with them.
///
/// # Example
///
/// ```rust,no_run
/// use resilience_core::{ErrorKind, Resilience, ResilienceConfig, ResilienceError, RetryConfig};
///
/// # async fn example() -> resilience_core::ResilienceResult<()> {
/// let resilience = Resilience::new(ResilienceConfig::default())?;
/// resilience.register_retry_config("fetch_user", RetryConfig::new().with_max_retries(2));
///
/// let fetch_user = resilience.with_resilience("fetch_user", |id: u64| async move {
///     if id == 0 {
///         return Err(ResilienceError::operation_failed(ErrorKind::Validation, "id 0 is reserved"));
///     }
///     Ok(format!("user-{id}"))
/// });
///
/// let name = fetch_user.call(7).await?;
/// assert_eq!(name, "user-7");
/// resilience.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Resilience {
    registry: Arc<Registry>,
    pipeline: Arc<ErrorPipeline>,
    component: Arc<str>,
}

/// Builder for [`Resilience`] with custom sinks.
pub struct ResilienceBuilder {
    config: ResilienceConfig,
    component: String,
    telemetry: Arc<dyn TelemetrySink>,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for ResilienceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceBuilder")
            .field("config", &self.config)
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl ResilienceBuilder {
    /// Name recorded as the component of records produced by wrapped calls.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn with_alerts(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = sink;
        self
    }

    /// Validate the configuration, build the registry and start the error
    /// pipeline. Must be called from within a Tokio runtime.
    pub fn build(self) -> ResilienceResult<Resilience> {
        self.config.validate()?;
        let registry = Arc::new(Registry::from_config(&self.config)?);
        let pipeline = ErrorPipeline::new(
            self.config.pipeline.clone(),
            Arc::clone(&registry),
            self.telemetry,
            self.alerts,
        )?;
        pipeline.start()?;

        log_debug!(
            component = %self.component,
            operations = self.config.operations.len(),
            "Resilience created"
        );

        Ok(Resilience {
            registry,
            pipeline: Arc::new(pipeline),
            component: Arc::from(self.component),
        })
    }
}

impl Resilience {
    /// Create with the default tracing sinks and start the pipeline.
    pub fn new(config: ResilienceConfig) -> ResilienceResult<Self> {
        Self::builder(config).build()
    }

    /// Create from `RESILIENCE_*` environment variables.
    pub fn from_env() -> ResilienceResult<Self> {
        Self::new(ResilienceConfig::from_env()?)
    }

    pub fn builder(config: ResilienceConfig) -> ResilienceBuilder {
        ResilienceBuilder {
            config,
            component: DEFAULT_COMPONENT.to_string(),
            telemetry: Arc::new(TracingSink),
            alerts: Arc::new(TracingSink),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<ErrorPipeline> {
        &self.pipeline
    }

    pub fn pipeline_settings(&self) -> &PipelineSettings {
        self.pipeline.settings()
    }

    // =========================================================================
    // Registration API
    // =========================================================================

    pub fn register_retry_config(&self, operation: &str, config: RetryConfig) {
        self.registry.register_retry_config(operation, config);
    }

    pub fn register_circuit_breaker_config(&self, operation: &str, config: CircuitBreakerConfig) {
        self.registry.register_circuit_breaker_config(operation, config);
    }

    pub fn register_fallback_config(&self, operation: &str, config: FallbackConfig) {
        self.registry.register_fallback_config(operation, config);
    }

    pub fn register_fallback_strategy<A, T, F, Fut>(&self, name: &str, fallback: F)
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.registry.register_fallback_strategy(name, fallback);
    }

    pub fn register_error_handler<H>(&self, kind: ErrorKind, handler: H)
    where
        H: Fn(&ErrorRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.register_error_handler(kind, handler);
    }

    // =========================================================================
    // Invocation API
    // =========================================================================

    /// Wrap `operation` with retry, circuit breaking and fallback.
    pub fn with_resilience<A, T, F, Fut>(&self, operation: &str, f: F) -> Wrapped<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.wrap(operation, Layers::ALL, f)
    }

    /// Wrap `operation` with retry only.
    pub fn with_retry<A, T, F, Fut>(&self, operation: &str, f: F) -> Wrapped<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.wrap(operation, Layers::RETRY, f)
    }

    /// Wrap `operation` with its circuit breaker only.
    pub fn with_circuit_breaker<A, T, F, Fut>(&self, operation: &str, f: F) -> Wrapped<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.wrap(operation, Layers::CIRCUIT_BREAKER, f)
    }

    /// Wrap `operation` with its fallback chain only.
    pub fn with_fallback<A, T, F, Fut>(&self, operation: &str, f: F) -> Wrapped<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        self.wrap(operation, Layers::FALLBACK, f)
    }

    // =========================================================================
    // Manual recording
    // =========================================================================

    /// Classify `error` and hand it to the pipeline. Returns the record as
    /// built; the pipeline processes its own copy.
    pub fn record_error(
        &self,
        error: ResilienceError,
        component: &str,
        operation: &str,
    ) -> ErrorRecord {
        self.record_error_with_context(error, ErrorContext::new(component, operation))
    }

    /// Like [`record_error`](Self::record_error) with a fully built context.
    pub fn record_error_with_context(
        &self,
        error: ResilienceError,
        context: ErrorContext,
    ) -> ErrorRecord {
        let record = ErrorRecord::from_error(error, context);
        self.pipeline.enqueue(record.clone());
        record
    }

    // =========================================================================
    // Metrics and lifecycle
    // =========================================================================

    pub fn metrics(&self) -> ResilienceMetrics {
        ResilienceMetrics {
            circuit_breakers: self.registry.breaker_metrics(),
            pipeline: self.pipeline.metrics(),
        }
    }

    pub fn reset_circuit_breaker(&self, operation: &str) -> bool {
        self.registry.reset_circuit_breaker(operation)
    }

    /// Stop the error pipeline. Wrapped operations keep working afterwards;
    /// their errors are queued but no longer processed.
    pub async fn shutdown(&self) {
        self.pipeline.stop().await;
    }

    // =========================================================================
    // Execution
    // =========================================================================

    fn wrap<A, T, F, Fut>(&self, operation: &str, layers: Layers, f: F) -> Wrapped<A, T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        let this = self.clone();
        let name: Arc<str> = Arc::from(operation);
        let f = Arc::new(f);
        let op = Arc::clone(&name);

        Wrapped {
            operation: name,
            inner: Arc::new(move |arg: A| -> BoxFuture<'static, ResilienceResult<T>> {
                let this = this.clone();
                let op = Arc::clone(&op);
                let f = Arc::clone(&f);
                Box::pin(async move { this.execute(&op, layers, arg, f.as_ref()).await })
            }),
        }
    }

    async fn execute<A, T, F, Fut>(
        &self,
        operation: &str,
        layers: Layers,
        arg: A,
        f: &F,
    ) -> ResilienceResult<T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
    {
        let retry = if layers.retry {
            self.registry.retry_config(operation)
        } else {
            RetryConfig::new().with_max_retries(0)
        };
        let breaker = layers
            .circuit_breaker
            .then(|| self.registry.circuit_breaker(operation));
        let timeout = breaker.as_ref().map(|b| b.config().timeout);
        let max_attempts = retry.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(breaker) = &breaker {
                if !breaker.allow() {
                    return Err(ResilienceError::circuit_open(operation));
                }
            }

            log_debug!(
                operation = %operation,
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing operation"
            );

            let outcome = self
                .attempt(operation, attempt, layers.fallback, arg.clone(), f, timeout)
                .await;

            let error = match outcome {
                Ok(value) => {
                    if let Some(breaker) = &breaker {
                        breaker.record_success();
                    }
                    if attempt > 1 {
                        log_info!(
                            operation = %operation,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            if let Some(breaker) = &breaker {
                breaker.record_failure(&error);
            }

            if attempt >= max_attempts || !retry.should_retry(&error) {
                if layers.retry {
                    log_error!(
                        operation = %operation,
                        attempts = attempt,
                        error = %error,
                        "Operation failed after all retry attempts"
                    );
                }
                return Err(error);
            }

            let delay = retry.delay_for(attempt);
            log_debug!(
                operation = %operation,
                attempt = attempt,
                max_attempts = max_attempts,
                delay_ms = delay.as_millis(),
                error = %error,
                "Operation failed, retrying after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: the primary, then the fallback chain if it failed.
    async fn attempt<A, T, F, Fut>(
        &self,
        operation: &str,
        attempt: u32,
        use_fallback: bool,
        arg: A,
        f: &F,
        timeout: Option<std::time::Duration>,
    ) -> ResilienceResult<T>
    where
        A: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync,
        Fut: Future<Output = ResilienceResult<T>> + Send,
    {
        let call_arg = arg.clone();
        let primary = match call_with_timeout(operation, timeout, move || f(call_arg)).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        self.report(primary.clone(), operation, attempt);

        if !use_fallback {
            return Err(primary);
        }

        let config = self.registry.fallback_config(operation);
        let chain = FallbackChain::<A, T>::resolve(operation, &config, &self.registry);
        chain
            .execute(arg, primary, timeout, |name, error| {
                self.report(
                    error.clone(),
                    &format!("{operation}.fallback.{name}"),
                    attempt,
                );
            })
            .await
    }

    fn report(&self, error: ResilienceError, operation: &str, attempt: u32) {
        let context =
            ErrorContext::new(self.component.as_ref(), operation).with_info("attempt", attempt);
        self.pipeline.enqueue(ErrorRecord::from_error(error, context));
    }
}
