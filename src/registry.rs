//! Per-operation configuration, circuit breakers, fallbacks and handlers.
//!
//! The registry is an explicitly constructed object shared through `Arc`;
//! there is no process-wide instance. Reads vastly outnumber writes, so each
//! map sits behind its own `RwLock`. Circuit breakers are created lazily on
//! first use with an insert-if-absent under the write lock, which keeps
//! exactly one breaker per operation name.

use crate::config::{CircuitBreakerConfig, FallbackConfig, ResilienceConfig, RetryConfig};
use crate::core_types::ErrorRecord;
use crate::error::{ErrorKind, ResilienceResult};
use crate::internals::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics};
use crate::internals::fallback::{FallbackFn, FallbackFuture};
use crate::logging::{log_debug, log_warn};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Callback invoked by the error pipeline for records of a subscribed kind.
pub type ErrorHandler = Arc<dyn Fn(&ErrorRecord) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct OperationEntry {
    retry: Option<RetryConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    fallback: Option<FallbackConfig>,
    breaker: Option<Arc<CircuitBreaker>>,
}

/// Registry of everything the resilience layers look up by name.
pub struct Registry {
    global_retry: RetryConfig,
    global_circuit_breaker: CircuitBreakerConfig,
    global_fallback: FallbackConfig,
    operations: RwLock<HashMap<String, OperationEntry>>,
    fallbacks: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    handlers: RwLock<HashMap<ErrorKind, Vec<ErrorHandler>>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("global_retry", &self.global_retry)
            .field("global_circuit_breaker", &self.global_circuit_breaker)
            .field("global_fallback", &self.global_fallback)
            .field("operations", &self.operations())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(
            RetryConfig::default(),
            CircuitBreakerConfig::default(),
            FallbackConfig::default(),
        )
    }
}

impl Registry {
    /// Create a registry whose unconfigured operations use the given globals.
    pub fn new(
        global_retry: RetryConfig,
        global_circuit_breaker: CircuitBreakerConfig,
        global_fallback: FallbackConfig,
    ) -> Self {
        Self {
            global_retry,
            global_circuit_breaker,
            global_fallback,
            operations: RwLock::new(HashMap::new()),
            fallbacks: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Build a registry from a configuration document, registering every
    /// operation override it contains.
    pub fn from_config(config: &ResilienceConfig) -> ResilienceResult<Self> {
        let registry = Self::new(
            config.global_retry.clone(),
            config.global_circuit_breaker.clone(),
            config.global_fallback.clone(),
        );

        for (operation, resolved) in config.resolve_operations()? {
            if let Some(retry) = resolved.retry {
                registry.register_retry_config(&operation, retry);
            }
            if let Some(breaker) = resolved.circuit_breaker {
                registry.register_circuit_breaker_config(&operation, breaker);
            }
            if let Some(fallback) = resolved.fallback {
                registry.register_fallback_config(&operation, fallback);
            }
        }
        Ok(registry)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_retry_config(&self, operation: &str, config: RetryConfig) {
        log_debug!(operation = %operation, max_retries = config.max_retries, "Registered retry config");
        self.write_operations()
            .entry(operation.to_string())
            .or_default()
            .retry = Some(config);
    }

    /// Register a breaker config. A live breaker for the operation keeps its
    /// state and counters and picks up the new settings in place.
    pub fn register_circuit_breaker_config(&self, operation: &str, config: CircuitBreakerConfig) {
        log_debug!(
            operation = %operation,
            failure_threshold = config.failure_threshold,
            "Registered circuit breaker config"
        );
        let mut operations = self.write_operations();
        let entry = operations.entry(operation.to_string()).or_default();
        if let Some(breaker) = &entry.breaker {
            breaker.reconfigure(config.clone());
        }
        entry.circuit_breaker = Some(config);
    }

    pub fn register_fallback_config(&self, operation: &str, config: FallbackConfig) {
        log_debug!(
            operation = %operation,
            strategies = ?config.strategies,
            "Registered fallback config"
        );
        self.write_operations()
            .entry(operation.to_string())
            .or_default()
            .fallback = Some(config);
    }

    /// Register a named fallback taking the wrapped operation's argument.
    /// Registering the same name again replaces the previous strategy.
    pub fn register_fallback_strategy<A, T, F, Fut>(&self, name: &str, fallback: F)
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResilienceResult<T>> + Send + 'static,
    {
        let erased: FallbackFn<A, T> =
            Arc::new(move |arg: A| -> FallbackFuture<T> { Box::pin(fallback(arg)) });
        let previous = self
            .write(&self.fallbacks)
            .insert(name.to_string(), Arc::new(erased));
        if previous.is_some() {
            log_debug!(strategy = %name, "Replaced fallback strategy");
        }
    }

    /// Subscribe `handler` to records of `kind` and its descendant kinds.
    pub fn register_error_handler<H>(&self, kind: ErrorKind, handler: H)
    where
        H: Fn(&ErrorRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.write(&self.handlers)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn retry_config(&self, operation: &str) -> RetryConfig {
        self.read_operations()
            .get(operation)
            .and_then(|entry| entry.retry.clone())
            .unwrap_or_else(|| self.global_retry.clone())
    }

    pub fn circuit_breaker_config(&self, operation: &str) -> CircuitBreakerConfig {
        self.read_operations()
            .get(operation)
            .and_then(|entry| entry.circuit_breaker.clone())
            .unwrap_or_else(|| self.global_circuit_breaker.clone())
    }

    pub fn fallback_config(&self, operation: &str) -> FallbackConfig {
        self.read_operations()
            .get(operation)
            .and_then(|entry| entry.fallback.clone())
            .unwrap_or_else(|| self.global_fallback.clone())
    }

    /// The operation's breaker, created on first use.
    pub fn circuit_breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .read_operations()
            .get(operation)
            .and_then(|entry| entry.breaker.clone())
        {
            return breaker;
        }

        let mut operations = self.write_operations();
        let entry = operations.entry(operation.to_string()).or_default();
        // Another caller may have created it between the two locks
        if let Some(breaker) = &entry.breaker {
            return Arc::clone(breaker);
        }
        let config = entry
            .circuit_breaker
            .clone()
            .unwrap_or_else(|| self.global_circuit_breaker.clone());
        let breaker = Arc::new(CircuitBreaker::new(operation, config));
        entry.breaker = Some(Arc::clone(&breaker));
        breaker
    }

    /// Look up a fallback registered for argument type `A` and result `T`.
    pub fn fallback_strategy<A, T>(&self, name: &str) -> Option<FallbackFn<A, T>>
    where
        A: 'static,
        T: 'static,
    {
        let fallbacks = self.read(&self.fallbacks);
        let erased = fallbacks.get(name)?;
        match erased.downcast_ref::<FallbackFn<A, T>>() {
            Some(fallback) => Some(Arc::clone(fallback)),
            None => {
                log_warn!(
                    strategy = %name,
                    "Fallback strategy registered with a different signature"
                );
                None
            }
        }
    }

    /// Handlers subscribed to `kind` or any of its ancestors, nearest kind
    /// first.
    pub fn handlers_for(&self, kind: ErrorKind) -> Vec<ErrorHandler> {
        let handlers = self.read(&self.handlers);
        kind.ancestors()
            .filter_map(|k| handlers.get(&k))
            .flatten()
            .cloned()
            .collect()
    }

    /// Names of operations with registered config or a live breaker.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_operations().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Breaker management
    // =========================================================================

    /// Reset an operation's breaker. Returns `false` if none exists yet.
    pub fn reset_circuit_breaker(&self, operation: &str) -> bool {
        let breaker = self
            .read_operations()
            .get(operation)
            .and_then(|entry| entry.breaker.clone());
        match breaker {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all_breakers(&self) {
        for breaker in self.breakers() {
            breaker.reset();
        }
    }

    /// Metrics for every live breaker, ordered by operation name.
    pub fn breaker_metrics(&self) -> Vec<CircuitBreakerMetrics> {
        let mut metrics: Vec<_> = self.breakers().iter().map(|b| b.metrics()).collect();
        metrics.sort_by(|a, b| a.operation.cmp(&b.operation));
        metrics
    }

    // Collect first so breaker locks are never taken under the map lock
    fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.read_operations()
            .values()
            .filter_map(|entry| entry.breaker.clone())
            .collect()
    }

    fn read_operations(&self) -> RwLockReadGuard<'_, HashMap<String, OperationEntry>> {
        self.read(&self.operations)
    }

    fn write_operations(&self) -> RwLockWriteGuard<'_, HashMap<String, OperationEntry>> {
        self.write(&self.operations)
    }

    fn read<'a, V>(&self, lock: &'a RwLock<V>) -> RwLockReadGuard<'a, V> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write<'a, V>(&self, lock: &'a RwLock<V>) -> RwLockWriteGuard<'a, V> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}
