//! # Roster Configuration System
//!
//! Layered configuration for the command-execution core. Defaults come from
//! [`crate::constants`], are overridden by optional TOML files, and finally by
//! `ROSTER__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roster_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().pipeline.timeout();
//! let threshold = manager.config().circuit_breaker.failure_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants;
use crate::pipeline::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RosterConfig {
    /// Admission and execution settings shared by every pipeline
    pub pipeline: PipelineConfig,

    /// Breaker guarding the member-fetch dependency
    pub circuit_breaker: CircuitBreakerSettings,

    /// Tiered member fetch settings
    pub fetch: FetchConfig,

    /// Background cache maintenance
    pub cache: CacheConfig,

    /// Handler loading behaviour
    pub registry: RegistryConfig,

    /// Scoped resource lifetime limits
    pub resources: ResourceConfig,

    /// Inbound routing and global throttling
    pub dispatcher: DispatcherConfig,

    /// Static admin list and permission grants
    pub access: AccessConfig,
}

impl RosterConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.pipeline.validate()?;
        self.circuit_breaker.validate()?;
        self.fetch.validate()?;
        self.cache.validate()?;
        self.resources.validate()?;
        self.dispatcher.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub rate_limit_max_calls: usize,
    pub rate_limit_window_secs: u64,
    pub max_concurrent_executions: usize,
    pub result_cache_enabled: bool,
    pub result_cache_ttl_ms: u64,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn result_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.result_cache_ttl_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.timeout_ms",
                self.timeout_ms,
                "must be greater than 0",
            ));
        }
        if self.rate_limit_max_calls == 0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.rate_limit_max_calls",
                self.rate_limit_max_calls,
                "must be greater than 0",
            ));
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.rate_limit_window_secs",
                self.rate_limit_window_secs,
                "must be greater than 0",
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.max_concurrent_executions",
                self.max_concurrent_executions,
                "must be greater than 0",
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "pipeline.retry_max_delay_ms",
                self.retry_max_delay_ms,
                "must not be lower than retry_base_delay_ms",
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: constants::pipeline::EXECUTION_TIMEOUT_MS,
            max_retries: constants::pipeline::MAX_RETRIES,
            backoff: BackoffPolicy::Linear,
            retry_base_delay_ms: constants::pipeline::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: constants::pipeline::RETRY_MAX_DELAY_MS,
            rate_limit_max_calls: constants::pipeline::RATE_LIMIT_MAX_CALLS,
            rate_limit_window_secs: constants::pipeline::RATE_LIMIT_WINDOW_SECS,
            max_concurrent_executions: constants::pipeline::MAX_CONCURRENT_EXECUTIONS,
            result_cache_enabled: true,
            result_cache_ttl_ms: constants::pipeline::RESULT_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub timeout_ms: u64,
}

impl CircuitBreakerSettings {
    pub fn validate(&self) -> ConfigResult<()> {
        self.to_breaker_config()
            .validate()
            .map_err(|reason| ConfigurationError::invalid_value("circuit_breaker", "", reason))
    }

    pub fn to_breaker_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: constants::circuit_breaker::FAILURE_THRESHOLD,
            timeout_ms: constants::circuit_breaker::TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub sufficiency_ratio: f64,
    pub full_timeout_ms: u64,
    pub partial_timeout_ms: u64,
    pub partial_limit: usize,
    pub filter_batch_size: usize,
    pub fresh_ttl_ms: u64,
    pub stale_retention_ms: u64,
    pub max_recorded_attempts: usize,
    pub progress_interval_ms: u64,
}

impl FetchConfig {
    pub fn full_timeout(&self) -> Duration {
        Duration::from_millis(self.full_timeout_ms)
    }

    pub fn partial_timeout(&self) -> Duration {
        Duration::from_millis(self.partial_timeout_ms)
    }

    pub fn fresh_ttl(&self) -> Duration {
        Duration::from_millis(self.fresh_ttl_ms)
    }

    pub fn stale_retention(&self) -> Duration {
        Duration::from_millis(self.stale_retention_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.sufficiency_ratio) {
            return Err(ConfigurationError::invalid_value(
                "fetch.sufficiency_ratio",
                self.sufficiency_ratio,
                "must be between 0.0 and 1.0",
            ));
        }
        if self.partial_timeout_ms == 0 || self.full_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "fetch.*_timeout_ms",
                format!("{}/{}", self.full_timeout_ms, self.partial_timeout_ms),
                "fetch timeouts must be greater than 0",
            ));
        }
        if self.partial_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "fetch.partial_limit",
                self.partial_limit,
                "must be greater than 0",
            ));
        }
        if self.filter_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "fetch.filter_batch_size",
                self.filter_batch_size,
                "must be greater than 0",
            ));
        }
        if self.stale_retention_ms < self.fresh_ttl_ms {
            return Err(ConfigurationError::invalid_value(
                "fetch.stale_retention_ms",
                self.stale_retention_ms,
                "must not be lower than fresh_ttl_ms",
            ));
        }
        Ok(())
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            sufficiency_ratio: constants::fetch::CACHE_SUFFICIENCY_RATIO,
            full_timeout_ms: constants::fetch::FULL_FETCH_TIMEOUT_MS,
            partial_timeout_ms: constants::fetch::PARTIAL_FETCH_TIMEOUT_MS,
            partial_limit: constants::fetch::PARTIAL_FETCH_LIMIT,
            filter_batch_size: constants::fetch::FILTER_BATCH_SIZE,
            fresh_ttl_ms: constants::fetch::FRESH_TTL_MS,
            stale_retention_ms: constants::fetch::STALE_RETENTION_MS,
            max_recorded_attempts: constants::fetch::MAX_RECORDED_ATTEMPTS,
            progress_interval_ms: constants::fetch::PROGRESS_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub sweep_interval_ms: u64,
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.sweep_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.sweep_interval_ms",
                self.sweep_interval_ms,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_ms: constants::cache::SWEEP_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub lazy_load_delay_ms: u64,
    pub slow_load_ms: u64,
    pub slow_execution_ms: u64,
    /// Commands disabled at startup
    pub disabled_commands: Vec<String>,
}

impl RegistryConfig {
    pub fn lazy_load_delay(&self) -> Duration {
        Duration::from_millis(self.lazy_load_delay_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lazy_load_delay_ms: constants::thresholds::LAZY_LOAD_DELAY_MS,
            slow_load_ms: constants::thresholds::SLOW_LOAD_MS,
            slow_execution_ms: constants::thresholds::SLOW_EXECUTION_MS,
            disabled_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max_lifetime_ms: u64,
}

impl ResourceConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_lifetime_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "resources.max_lifetime_ms",
                self.max_lifetime_ms,
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_lifetime_ms: constants::resources::MAX_LIFETIME_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub global_rate_limit_max_calls: usize,
    pub global_rate_limit_window_secs: u64,
}

impl DispatcherConfig {
    pub fn global_rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.global_rate_limit_window_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.global_rate_limit_max_calls == 0 || self.global_rate_limit_window_secs == 0 {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.global_rate_limit",
                format!(
                    "{}/{}s",
                    self.global_rate_limit_max_calls, self.global_rate_limit_window_secs
                ),
                "limit and window must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            global_rate_limit_max_calls: constants::dispatcher::GLOBAL_RATE_LIMIT_MAX_CALLS,
            global_rate_limit_window_secs: constants::pipeline::RATE_LIMIT_WINDOW_SECS,
        }
    }
}

/// Static access control: admin callers and per-caller permission grants
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    pub admins: HashSet<String>,
    pub grants: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RosterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.timeout_ms, 60_000);
        assert_eq!(config.fetch.full_timeout(), Duration::from_secs(30));
        assert_eq!(config.fetch.partial_timeout(), Duration::from_secs(10));
        assert_eq!(config.resources.max_lifetime(), Duration::from_secs(300));
        assert_eq!(config.pipeline.backoff, BackoffPolicy::Linear);
    }

    #[test]
    fn test_invalid_sections_are_rejected() {
        let mut config = RosterConfig::default();
        config.pipeline.max_concurrent_executions = 0;
        assert!(config.validate().is_err());

        let mut config = RosterConfig::default();
        config.fetch.sufficiency_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = RosterConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = RosterConfig::default();
        config.fetch.stale_retention_ms = 1;
        assert!(config.validate().is_err());
    }
}
