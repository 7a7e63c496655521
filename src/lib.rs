//! # resilience-core
//!
//! Retry, circuit breaking and fallback substitution for named operations,
//! with asynchronous classification and routing of every error they produce.
//!
//! ## Key Features
//!
//! - **Retry**: fixed, exponential, Fibonacci and random backoff with jitter
//! - **Circuit Breaking**: per-operation closed/open/half-open state machine
//! - **Fallbacks**: ordered substitute operations tried after a failure
//! - **Error Pipeline**: bounded queue and worker pool feeding logs,
//!   telemetry, alerts and kind-based handlers
//!
//! ## Example
//!
//! ```rust,no_run
//! use resilience_core::{
//!     ErrorKind, FallbackConfig, Resilience, ResilienceConfig, ResilienceError,
//! };
//!
//! # async fn example() -> resilience_core::ResilienceResult<()> {
//! let resilience = Resilience::new(ResilienceConfig::default())?;
//!
//! resilience.register_fallback_strategy("cached_quote", |symbol: String| async move {
//!     Ok::<_, ResilienceError>(format!("{symbol}: 101.5 (cached)"))
//! });
//! resilience.register_fallback_config(
//!     "fetch_quote",
//!     FallbackConfig::new().with_strategy("cached_quote"),
//! );
//!
//! let fetch_quote = resilience.with_resilience("fetch_quote", |_symbol: String| async move {
//!     Err::<String, _>(ResilienceError::operation_failed(
//!         ErrorKind::Connection,
//!         "quote service refused connection",
//!     ))
//! });
//!
//! let quote = fetch_quote.call("ACME".to_string()).await?;
//! assert!(quote.ends_with("(cached)"));
//! resilience.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod composer;
pub mod config;
pub mod core_types;
pub mod error;
pub mod internals;
pub mod registry;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use composer::{Resilience, ResilienceBuilder, ResilienceMetrics, Wrapped};
pub use config::{
    CircuitBreakerConfig, FallbackConfig, OperationConfig, OperationOverrides, PipelineSettings,
    ResilienceConfig, RetryConfig, RetryStrategy,
};
pub use core_types::{Category, ErrorContext, ErrorRecord, Severity};
pub use error::{ErrorKind, ResilienceError, ResilienceResult};
pub use internals::circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use internals::fallback::{FallbackChain, FallbackFn, FallbackFuture};
pub use internals::pipeline::{ErrorPipeline, PipelineMetrics};
pub use internals::retry::delay;
pub use internals::sinks::{AlertSink, NoopSink, TelemetrySink, TracingSink};
pub use registry::{ErrorHandler, Registry};
