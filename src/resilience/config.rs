//! # Circuit Breaker Configuration
//!
//! Per-breaker thresholds. System-wide values are loaded through
//! `crate::config::CircuitBreakerSettings` and converted with
//! `to_breaker_config()`.

use crate::constants;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time since the last failure before a single trial call is allowed
    pub timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Configuration for the chat platform's member-list endpoint
    pub fn for_member_fetch() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }

        if self.timeout > Duration::from_secs(3600) {
            return Err("timeout should not exceed 3600 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: constants::circuit_breaker::FAILURE_THRESHOLD,
            timeout: Duration::from_millis(constants::circuit_breaker::TIMEOUT_MS),
        }
    }
}
