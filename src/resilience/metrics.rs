//! # Circuit Breaker Metrics
//!
//! Counters for one circuit breaker, snapshotted for dashboards and the
//! analytics surface.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls that reached the guarded operation
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Calls rejected without touching the dependency
    pub rejected_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u32,

    /// How many times the circuit has opened
    pub times_opened: u64,

    /// Total duration of all operations
    pub total_duration: Duration,

    /// Current circuit breaker state
    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Calculated success rate (0.0 to 1.0)
    pub success_rate: f64,

    /// Average operation duration
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Create new metrics instance with zero values
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            times_opened: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            success_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing dependency health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Success: {:.1}% | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.success_rate * 100.0,
            self.failure_count,
            self.rejected_count,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_by_state() {
        let mut metrics = CircuitBreakerMetrics::new();
        assert!(metrics.is_healthy());

        metrics.current_state = CircuitState::Open;
        assert!(!metrics.is_healthy());
        assert!(metrics.format_summary().contains("Rejecting"));

        metrics.current_state = CircuitState::Closed;
        metrics.failure_rate = 0.5;
        assert!(!metrics.is_healthy());
    }
}
