//! Internal building blocks composed by [`Resilience`](crate::Resilience).
//!
//! Some types are re-exported through `lib.rs` for public use
//! (CircuitBreaker, ErrorPipeline, sink traits).

pub mod circuit_breaker;
pub mod fallback;
pub mod pipeline;
pub mod retry;
pub mod sinks;

use crate::error::{ErrorKind, ResilienceError, ResilienceResult};
use crate::logging::log_error;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Build and await the call produced by `make`, converting an elapsed
/// deadline into [`ResilienceError::Timeout`]. `None` means no deadline.
///
/// A panic while building or polling the call becomes an
/// [`ErrorKind::System`] failure, so the breaker and retry layers see it
/// like any other failed call.
pub(crate) async fn call_with_timeout<T, Fut, M>(
    operation: &str,
    timeout: Option<Duration>,
    make: M,
) -> ResilienceResult<T>
where
    M: FnOnce() -> Fut,
    Fut: Future<Output = ResilienceResult<T>>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(make)) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(operation, payload)),
    };
    let guarded = AssertUnwindSafe(fut).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_elapsed) => return Err(ResilienceError::timeout(operation, limit)),
        },
        None => guarded.await,
    };
    outcome.unwrap_or_else(|payload| Err(panicked(operation, payload)))
}

fn panicked(operation: &str, payload: Box<dyn Any + Send>) -> ResilienceError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    log_error!(operation = %operation, reason = %reason, "Wrapped call panicked");
    ResilienceError::operation_failed(ErrorKind::System, format!("{operation} panicked: {reason}"))
}
