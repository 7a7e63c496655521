//! Backoff delay calculation
//!
//! Pure function from (strategy, attempt) to the wait before the next retry:
//! - Fixed: `base`
//! - Exponential: `base * 2^(attempt-1)` (1s, 2s, 4s, 8s, ...)
//! - Fibonacci: `base * fib(attempt)` (1s, 1s, 2s, 3s, 5s, ...)
//! - Random: uniform in `[base, base * attempt]`
//!
//! The result is capped at `max`; jitter then scales it by up to ±10%.

use crate::config::RetryStrategy;
use std::time::Duration;

/// Compute the backoff delay for a 1-based `attempt`. Attempt 0 yields zero.
pub fn delay(
    strategy: RetryStrategy,
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter: bool,
) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_secs = base.as_secs_f64();
    let raw = match strategy {
        RetryStrategy::Fixed => base_secs,
        RetryStrategy::Exponential => {
            let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
            base_secs * 2f64.powi(exponent)
        }
        RetryStrategy::Fibonacci => base_secs * fibonacci(attempt),
        RetryStrategy::Random => {
            let upper = base_secs * f64::from(attempt);
            base_secs + fastrand::f64() * (upper - base_secs)
        }
    };

    // 0 * inf is NaN for a zero base with a huge attempt number
    let capped = if raw.is_nan() {
        0.0
    } else {
        raw.min(max.as_secs_f64())
    };

    let secs = if jitter {
        capped * (0.9 + fastrand::f64() * 0.2)
    } else {
        capped
    };

    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(max)
}

/// `fib(1) = fib(2) = 1`. Saturates to infinity for very large `n`.
fn fibonacci(n: u32) -> f64 {
    let (mut prev, mut curr) = (0.0_f64, 1.0_f64);
    for _ in 1..n {
        let next = prev + curr;
        prev = curr;
        curr = next;
        if curr.is_infinite() {
            break;
        }
    }
    curr
}
