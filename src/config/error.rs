//! Configuration error types

use crate::error::RosterError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(#[from] ::config::ConfigError),

    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ConfigurationError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigurationError> for RosterError {
    fn from(err: ConfigurationError) -> Self {
        RosterError::Configuration(err.to_string())
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
