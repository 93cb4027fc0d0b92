//! Retry scheduling for handler failures.

use crate::config::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Always wait the base delay
    Fixed,
    /// base × attempt
    #[default]
    Linear,
    /// base × 2^(attempt - 1)
    Exponential,
}

impl BackoffPolicy {
    /// Delay to wait after the `attempt`-th failure (1-based), capped at `max`
    pub fn delay(self, base: Duration, attempt: u32, max: Duration) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self {
            BackoffPolicy::Fixed => base,
            BackoffPolicy::Linear => base.saturating_mul(attempt),
            BackoffPolicy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        };
        delay.min(max)
    }
}

/// Bounded retry schedule for one pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.backoff,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: BackoffPolicy::Fixed,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.base_delay, attempt, self.max_delay)
    }
}
