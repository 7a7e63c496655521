//! Per-operation circuit breaker
//!
//! Three states:
//! - Closed: calls allowed, consecutive counted failures tracked
//! - Open: calls rejected until `recovery_timeout` has passed
//! - HalfOpen: trial calls allowed; one failure reopens, `success_threshold`
//!   successes close
//!
//! All state, the config included, lives behind one mutex per breaker, and
//! every public method takes it exactly once, so each operation is atomic
//! with respect to the others. The lock is never held across a call to user
//! code.

use crate::config::CircuitBreakerConfig;
use crate::error::ResilienceError;
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking requests
    HalfOpen, // Testing if service recovered
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Point-in-time view of a breaker, for metrics export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub operation: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_state_change: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerState {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Monotonic time the circuit last opened; drives the recovery timeout.
    opened_at: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    last_state_change: DateTime<Utc>,
}

impl BreakerState {
    fn closed(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            last_failure_time: None,
            last_success_time: None,
            last_state_change: Utc::now(),
        }
    }
}

/// Circuit breaker guarding a single named operation.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        log_debug!(
            operation = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis(),
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );
        Self {
            name,
            inner: Mutex::new(BreakerState::closed(config)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.lock().config.clone()
    }

    /// Swap in new settings without touching state or counters. An open
    /// circuit stays open; the new thresholds apply from the next call.
    pub fn reconfigure(&self, config: CircuitBreakerConfig) {
        let mut inner = self.lock();
        log_debug!(
            operation = %self.name,
            state = %inner.state,
            failure_threshold = config.failure_threshold,
            recovery_timeout_ms = config.recovery_timeout.as_millis(),
            success_threshold = config.success_threshold,
            "Circuit breaker reconfigured"
        );
        inner.config = config;
    }

    /// Get current circuit breaker state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Check whether a call may proceed.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// here, and the call is allowed.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let recovery_timeout = inner.config.recovery_timeout;
                let recovered = inner
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= recovery_timeout);
                if recovered {
                    log_debug!(
                        operation = %self.name,
                        recovery_timeout_ms = recovery_timeout.as_millis(),
                        "Circuit breaker attempting recovery"
                    );
                    inner.success_count = 0;
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                recovered
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.last_success_time = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= inner.config.success_threshold {
                    log_info!(
                        operation = %self.name,
                        success_count = inner.success_count,
                        "Circuit breaker recovered, returning to closed state"
                    );
                    inner.failure_count = 0;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // A call admitted before the circuit opened finished late
            CircuitState::Open => {}
        }
    }

    /// Record a failed call. Returns whether the failure was counted; kinds
    /// filtered out by the include/exclude lists leave the breaker untouched.
    pub fn record_failure(&self, error: &ResilienceError) -> bool {
        let mut inner = self.lock();
        if !inner.config.counts_failure(error.kind()) {
            log_debug!(
                operation = %self.name,
                kind = %error.kind(),
                "Failure kind not counted by circuit breaker"
            );
            return false;
        }

        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= inner.config.failure_threshold {
                    log_warn!(
                        operation = %self.name,
                        failure_count = inner.failure_count,
                        failure_threshold = inner.config.failure_threshold,
                        recovery_timeout_ms = inner.config.recovery_timeout.as_millis(),
                        "Circuit breaker opened due to repeated failures"
                    );
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                log_warn!(
                    operation = %self.name,
                    error = %error,
                    "Trial call failed, circuit breaker reopened"
                );
                inner.success_count = 0;
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
        true
    }

    /// Return to a fresh closed state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let config = inner.config.clone();
        *inner = BreakerState::closed(config);
        log_info!(operation = %self.name, "Circuit breaker reset");
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        CircuitBreakerMetrics {
            operation: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            last_state_change: inner.last_state_change,
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        inner.opened_at = Some(Instant::now());
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state != to {
            log_debug!(
                operation = %self.name,
                from = %inner.state,
                to = %to,
                "Circuit breaker state change"
            );
            inner.state = to;
            inner.last_state_change = Utc::now();
        }
    }

    // A panic while holding the lock cannot leave the counters torn, so a
    // poisoned mutex is still usable.
    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
