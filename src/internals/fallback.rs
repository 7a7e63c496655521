//! Ordered fallback chain tried after a primary call fails.

use crate::config::FallbackConfig;
use crate::error::{ResilienceError, ResilienceResult};
use crate::internals::call_with_timeout;
use crate::logging::{log_debug, log_info, log_warn};
use crate::registry::Registry;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by a registered fallback.
pub type FallbackFuture<T> = BoxFuture<'static, ResilienceResult<T>>;

/// A registered fallback: called with the primary call's argument.
pub type FallbackFn<A, T> = Arc<dyn Fn(A) -> FallbackFuture<T> + Send + Sync>;

/// Fallbacks resolved for one operation, in configured order and already
/// limited to `max_fallbacks`.
pub struct FallbackChain<A, T> {
    operation: String,
    strategies: Vec<(String, FallbackFn<A, T>)>,
}

impl<A, T> FallbackChain<A, T>
where
    A: Clone + Send + 'static,
    T: Send + 'static,
{
    /// Look up the configured strategies. Names that are not registered (or
    /// were registered for a different signature) are skipped and do not
    /// count towards `max_fallbacks`.
    pub fn resolve(operation: &str, config: &FallbackConfig, registry: &Registry) -> Self {
        if !config.enabled {
            return Self::empty(operation);
        }

        let strategies = config
            .strategies
            .iter()
            .filter_map(|name| match registry.fallback_strategy::<A, T>(name) {
                Some(fallback) => Some((name.clone(), fallback)),
                None => {
                    log_debug!(
                        operation = %operation,
                        strategy = %name,
                        "Skipping unregistered fallback strategy"
                    );
                    None
                }
            })
            .take(config.max_fallbacks)
            .collect();

        Self {
            operation: operation.to_string(),
            strategies,
        }
    }

    pub fn empty(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            strategies: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each fallback in order and return the first success.
    ///
    /// `on_failure` is told about every fallback that fails, with the
    /// strategy name. With no fallbacks to try, the primary failure is
    /// returned unchanged; otherwise exhaustion yields
    /// [`ResilienceError::FallbacksExhausted`] carrying both the primary and
    /// the last fallback failure.
    pub async fn execute<F>(
        &self,
        arg: A,
        primary: ResilienceError,
        timeout: Option<Duration>,
        mut on_failure: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut(&str, &ResilienceError) + Send,
    {
        let mut last_error = None;

        for (name, fallback) in &self.strategies {
            let label = format!("{}.fallback.{}", self.operation, name);
            let call_arg = arg.clone();
            match call_with_timeout(&label, timeout, move || fallback(call_arg)).await {
                Ok(value) => {
                    log_info!(
                        operation = %self.operation,
                        strategy = %name,
                        primary_error = %primary,
                        "Recovered via fallback"
                    );
                    return Ok(value);
                }
                Err(error) => {
                    log_warn!(
                        operation = %self.operation,
                        strategy = %name,
                        error = %error,
                        "Fallback failed"
                    );
                    on_failure(name, &error);
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last) => Err(ResilienceError::fallbacks_exhausted(
                &self.operation,
                primary,
                last,
            )),
            None => Err(primary),
        }
    }
}
