//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers, lowest precedence first:
//! compiled defaults, `roster.toml`, `roster.<environment>.toml`, then
//! `ROSTER__SECTION__KEY` environment variables.

use super::error::ConfigResult;
use super::RosterConfig;
use crate::logging::get_environment;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_NAME: &str = "roster.toml";
const ENV_PREFIX: &str = "ROSTER";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: RosterConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            timeout_ms = config.pipeline.timeout_ms,
            max_concurrent = config.pipeline.max_concurrent_executions,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "🔧 Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding applications)
    pub fn from_config(config: RosterConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: get_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with caller identities masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or_default();
        if let Some(access) = value.get_mut("access") {
            *access = serde_json::json!({
                "admins": format!("[{} masked]", self.config.access.admins.len()),
                "grants": format!("[{} masked]", self.config.access.grants.len()),
            });
        }
        value
    }

    fn default_config_directory() -> PathBuf {
        std::env::var("ROSTER_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(directory: &Path, environment: &str) -> ConfigResult<RosterConfig> {
        let defaults = ::config::Config::try_from(&RosterConfig::default())?;
        let env_file = directory.join(format!("roster.{environment}.toml"));

        let merged = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::from(directory.join(BASE_FILE_NAME)).required(false))
            .add_source(::config::File::from(env_file).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?;

        Ok(merged.try_deserialize::<RosterConfig>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_loads_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().pipeline.max_retries, 2);
        assert_eq!(manager.config().fetch.partial_limit, 1_000);
    }

    #[test]
    fn test_environment_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("roster.toml"),
            "[pipeline]\ntimeout_ms = 5000\nmax_retries = 4\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("roster.test.toml"),
            "[pipeline]\ntimeout_ms = 1500\n\n[access]\nadmins = [\"owner\"]\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        let config = manager.config();
        assert_eq!(config.pipeline.timeout_ms, 1_500);
        assert_eq!(config.pipeline.max_retries, 4);
        assert!(config.access.admins.contains("owner"));

        let debug = manager.debug_config();
        assert_eq!(debug["access"]["admins"], "[1 masked]");
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("roster.toml"),
            "[pipeline]\nmax_concurrent_executions = 0\n",
        )
        .unwrap();

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }
}
