//! # Circuit Breaker Implementation
//!
//! Fault isolation for a single unreliable dependency. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (exactly one
//! trial call in flight). Call outcomes only move the breaker along the
//! cycle closed → open → half-open → {closed | open}. The operator overrides
//! [`CircuitBreaker::force_open`] and [`CircuitBreaker::force_closed`] sit
//! outside that cycle.
//!
//! All state lives behind one `parking_lot::Mutex` that is never held across
//! an `.await`, so every admission decision and outcome recording is a single
//! atomic step even when many tasks share the breaker.

use crate::error::RosterError;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - a single trial call is allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

impl<E: Into<RosterError>> From<CircuitBreakerError<E>> for RosterError {
    fn from(err: CircuitBreakerError<E>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { component } => RosterError::CircuitOpen { component },
            CircuitBreakerError::OperationFailed(inner) => inner.into(),
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Which kind of admission a call received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Releases the half-open trial slot if the trial future is dropped before
/// recording an outcome (e.g. the caller's timeout fired).
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut core = self.breaker.core.lock();
            if core.state == CircuitState::HalfOpen {
                core.trial_in_flight = false;
            }
            drop(core);
            warn!(component = %self.breaker.name, "Half-open trial abandoned before completion");
        }
    }
}

/// Core circuit breaker shared by every caller of one dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            config,
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state.
    ///
    /// An open circuit whose timeout has elapsed still reports `Open` until a
    /// call arrives to perform the half-open transition.
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = match self.try_acquire() {
            Some(admission) => admission,
            None => {
                debug!(component = %self.name, "⛔ Call rejected, circuit open");
                return Err(CircuitBreakerError::CircuitOpen {
                    component: self.name.clone(),
                });
            }
        };

        let mut guard = TrialGuard {
            breaker: self,
            armed: admission == Admission::Trial,
        };

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        guard.armed = false;
        match &result {
            Ok(_) => self.record_success(admission, duration),
            Err(_) => self.record_failure(admission, duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed, performing open → half-open when due
    fn try_acquire(&self) -> Option<Admission> {
        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => Some(Admission::Normal),
            CircuitState::Open => {
                let elapsed = core
                    .last_failure_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.timeout);
                if elapsed >= self.config.timeout {
                    core.state = CircuitState::HalfOpen;
                    core.trial_in_flight = true;
                    drop(core);
                    info!(component = %self.name, "🟡 Circuit breaker half-open (testing recovery)");
                    Some(Admission::Trial)
                } else {
                    core.metrics.rejected_count += 1;
                    None
                }
            }
            CircuitState::HalfOpen => {
                if core.trial_in_flight {
                    core.metrics.rejected_count += 1;
                    None
                } else {
                    core.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            }
        }
    }

    /// Record a successful operation
    fn record_success(&self, admission: Admission, duration: Duration) {
        let mut core = self.core.lock();
        core.metrics.total_calls += 1;
        core.metrics.success_count += 1;
        core.metrics.total_duration += duration;

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "🟢 Operation succeeded"
        );

        match (admission, core.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                core.state = CircuitState::Closed;
                core.consecutive_failures = 0;
                core.trial_in_flight = false;
                core.last_failure_at = None;
                let total_calls = core.metrics.total_calls;
                drop(core);
                info!(
                    component = %self.name,
                    total_calls = total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            (_, CircuitState::Closed) => {
                core.consecutive_failures = 0;
            }
            _ => {
                // A forced transition happened while this call was in flight
            }
        }
    }

    /// Record a failed operation
    fn record_failure(&self, admission: Admission, duration: Duration) {
        let mut core = self.core.lock();
        core.metrics.total_calls += 1;
        core.metrics.failure_count += 1;
        core.metrics.total_duration += duration;
        core.last_failure_at = Some(Instant::now());

        match (admission, core.state) {
            (Admission::Trial, CircuitState::HalfOpen) => {
                core.state = CircuitState::Open;
                core.trial_in_flight = false;
                core.metrics.times_opened += 1;
                drop(core);
                error!(component = %self.name, "🔴 Circuit breaker re-opened (trial failed)");
            }
            (_, CircuitState::Closed) => {
                core.consecutive_failures += 1;
                let failures = core.consecutive_failures;
                if failures >= self.config.failure_threshold {
                    core.state = CircuitState::Open;
                    core.metrics.times_opened += 1;
                    drop(core);
                    error!(
                        component = %self.name,
                        consecutive_failures = failures,
                        failure_threshold = self.config.failure_threshold,
                        timeout_ms = self.config.timeout.as_millis() as u64,
                        "🔴 Circuit breaker opened (failing fast)"
                    );
                } else {
                    drop(core);
                    warn!(
                        component = %self.name,
                        consecutive_failures = failures,
                        duration_ms = duration.as_millis() as u64,
                        "🔴 Operation failed"
                    );
                }
            }
            _ => {}
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        let mut core = self.core.lock();
        core.state = CircuitState::Open;
        core.trial_in_flight = false;
        core.last_failure_at = Some(Instant::now());
        core.metrics.times_opened += 1;
        drop(core);
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
    }

    /// Administrative reset to closed state.
    ///
    /// Bypasses the half-open trial: whatever the current state, failure
    /// tracking starts over and every caller is admitted again. Never invoked
    /// by the fetch path; call outcomes alone drive the normal cycle.
    pub fn force_closed(&self) {
        let mut core = self.core.lock();
        core.state = CircuitState::Closed;
        core.consecutive_failures = 0;
        core.trial_in_flight = false;
        core.last_failure_at = None;
        drop(core);
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let core = self.core.lock();
        let mut snapshot = core.metrics.clone();
        snapshot.current_state = core.state;
        snapshot.consecutive_failures = core.consecutive_failures;

        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.success_rate = snapshot.success_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = snapshot.total_duration / snapshot.total_calls as u32;
        }

        snapshot
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }
        metrics.total_calls < 10 || metrics.failure_rate < 0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(threshold: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test", config(3, 100));
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("test", config(3, 100));
        let _ = circuit.call(|| async { Err::<(), _>("e") }).await;
        let _ = circuit.call(|| async { Err::<(), _>("e") }).await;
        let _ = circuit.call(|| async { Ok::<_, &str>(()) }).await;
        let _ = circuit.call(|| async { Err::<(), _>("e") }).await;
        let _ = circuit.call(|| async { Err::<(), _>("e") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_skips_operation() {
        let circuit = CircuitBreaker::new("test", config(2, 10_000));
        let invocations = AtomicUsize::new(0);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(circuit.metrics().rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let circuit = CircuitBreaker::new("test", config(1, 50));
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let circuit = CircuitBreaker::new("test", config(1, 50));
        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        tokio::time::advance(Duration::from_millis(60)).await;

        let _ = circuit.call(|| async { Err::<String, _>("still down") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit.call(|| async { Ok::<_, String>("nope") }).await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(circuit.metrics().times_opened, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_in_half_open() {
        let circuit = Arc::new(CircuitBreaker::new("test", config(1, 50)));
        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
        tokio::time::advance(Duration::from_millis(60)).await;

        let trial_circuit = Arc::clone(&circuit);
        let trial = tokio::spawn(async move {
            trial_circuit
                .call(|| async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, String>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let concurrent = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(concurrent.unwrap_err().is_circuit_open());

        assert!(trial.await.unwrap().is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_releases_slot() {
        let circuit = CircuitBreaker::new("test", config(1, 50));
        let _ = circuit.call(|| async { Err::<(), _>("error") }).await;
        tokio::time::advance(Duration::from_millis(60)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            circuit.call(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let retry = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(retry.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("test", config(1, 1_000));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
    }

    #[tokio::test]
    async fn test_force_closed_restarts_failure_tracking() {
        let circuit = CircuitBreaker::new("test", config(2, 60_000));

        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        circuit.force_open();
        circuit.force_closed();
        assert_eq!(circuit.metrics().consecutive_failures, 0);

        // one failure after the reset stays below the threshold of two
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_error_converts_to_roster_error() {
        let err: CircuitBreakerError<RosterError> = CircuitBreakerError::CircuitOpen {
            component: "member_fetch".to_string(),
        };
        let roster: RosterError = err.into();
        assert_eq!(roster.kind(), crate::error::ErrorKind::CircuitOpen);
    }
}
