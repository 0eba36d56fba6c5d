//! Quota-protection circuit breaker.
//!
//! Opens after repeated quota-class failures so the daemon stops burning
//! API calls against an exhausted account; half-opens after the recovery
//! timeout to probe once, and closes again on success. Process-wide
//! singleton; state transitions are serialized behind a mutex.

use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::is_quota_error;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_count: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_threshold,
            recovery_timeout,
            failure_count: 0,
            opened_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// May an LLM call proceed right now? An OPEN breaker transitions to
    /// HALF_OPEN (allowing a single probe) once the recovery window has
    /// elapsed.
    pub fn check_can_proceed(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let Some(opened_at) = self.opened_at else {
                    return true; // safety reset
                };
                let elapsed = opened_at.elapsed();
                if elapsed >= self.recovery_timeout {
                    self.state = CircuitState::HalfOpen;
                    prismis_observability::log(
                        "circuit_breaker.state",
                        json!({"state": "half_open", "elapsed_seconds": elapsed.as_secs()}),
                    );
                    info!("circuit breaker HALF_OPEN: attempting recovery");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a failed LLM call. Only quota-class errors count toward the
    /// threshold; anything else is ignored here.
    pub fn record_failure(&mut self, message: &str) {
        if !is_quota_error(message) {
            return;
        }

        self.failure_count += 1;

        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            prismis_observability::log(
                "circuit_breaker.state",
                json!({
                    "state": "open",
                    "reason": "half_open_failure",
                    "failure_count": self.failure_count,
                }),
            );
            warn!("circuit breaker OPEN: recovery failed");
            return;
        }

        if self.failure_count >= self.failure_threshold {
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            prismis_observability::log(
                "circuit_breaker.state",
                json!({
                    "state": "open",
                    "reason": "threshold_exceeded",
                    "failure_count": self.failure_count,
                    "threshold": self.failure_threshold,
                }),
            );
            warn!(
                failures = self.failure_count,
                threshold = self.failure_threshold,
                "circuit breaker OPEN: quota errors exceeded threshold"
            );
        }
    }

    /// Record a successful call; a HALF_OPEN breaker closes.
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Closed;
            self.failure_count = 0;
            self.opened_at = None;
            prismis_observability::log(
                "circuit_breaker.state",
                json!({"state": "closed", "reason": "recovery_success"}),
            );
            info!("circuit breaker CLOSED: service recovered");
        }
    }

    pub fn status(&self) -> Value {
        let mut status = json!({
            "state": self.state.as_str(),
            "failure_count": self.failure_count,
            "failure_threshold": self.failure_threshold,
        });
        if let Some(opened_at) = self.opened_at {
            let remaining = self.recovery_timeout.saturating_sub(opened_at.elapsed());
            status["recovery_in_seconds"] = json!(remaining.as_secs());
        }
        status
    }
}

static BREAKER: OnceLock<Mutex<CircuitBreaker>> = OnceLock::new();

/// The process-wide breaker guarding all chat calls.
pub fn get_circuit_breaker() -> &'static Mutex<CircuitBreaker> {
    BREAKER.get_or_init(|| Mutex::new(CircuitBreaker::default()))
}

/// Reset the global breaker to CLOSED (test hook).
pub fn reset_circuit_breaker() {
    *get_circuit_breaker().lock().expect("breaker lock poisoned") = CircuitBreaker::default();
}
