use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing classification of every terminal outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    CooldownActive,
    RateLimited,
    ConcurrencyExceeded,
    Timeout,
    CircuitOpen,
    FetchUnavailable,
    HandlerError,
    CommandNotFound,
    CommandDisabled,
    Cancelled,
    Configuration,
    Registry,
}

impl ErrorKind {
    /// Admission rejections: terminal, caller-facing, never retried
    pub fn is_rejection(self) -> bool {
        matches!(
            self,
            ErrorKind::PermissionDenied
                | ErrorKind::CooldownActive
                | ErrorKind::RateLimited
                | ErrorKind::ConcurrencyExceeded
                | ErrorKind::CommandDisabled
                | ErrorKind::CommandNotFound
        )
    }

    /// Only unexpected business-logic failures are retried. Timeouts are not.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::HandlerError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::CooldownActive => "cooldown_active",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ConcurrencyExceeded => "concurrency_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::FetchUnavailable => "fetch_unavailable",
            ErrorKind::HandlerError => "handler_error",
            ErrorKind::CommandNotFound => "command_not_found",
            ErrorKind::CommandDisabled => "command_disabled",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Registry => "registry",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RosterError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Command is on cooldown, retry in {remaining_ms}ms")]
    CooldownActive { remaining_ms: u64 },

    #[error("Rate limit exceeded: {limit} calls per {window_secs}s")]
    RateLimited { limit: usize, window_secs: u64 },

    #[error("Too many commands in flight (limit {limit})")]
    ConcurrencyExceeded { limit: usize },

    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Member list unavailable for scope {scope_id}: {guidance}")]
    FetchUnavailable { scope_id: String, guidance: String },

    #[error("Handler error: {0}")]
    HandlerError(String),

    #[error("Unknown command: {0}")]
    CommandNotFound(String),

    #[error("Command is disabled: {0}")]
    CommandDisabled(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Registry error: {0}")]
    Registry(String),
}

impl RosterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RosterError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            RosterError::CooldownActive { .. } => ErrorKind::CooldownActive,
            RosterError::RateLimited { .. } => ErrorKind::RateLimited,
            RosterError::ConcurrencyExceeded { .. } => ErrorKind::ConcurrencyExceeded,
            RosterError::Timeout { .. } => ErrorKind::Timeout,
            RosterError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            RosterError::FetchUnavailable { .. } => ErrorKind::FetchUnavailable,
            RosterError::HandlerError(_) => ErrorKind::HandlerError,
            RosterError::CommandNotFound(_) => ErrorKind::CommandNotFound,
            RosterError::CommandDisabled(_) => ErrorKind::CommandDisabled,
            RosterError::Cancelled(_) => ErrorKind::Cancelled,
            RosterError::Configuration(_) => ErrorKind::Configuration,
            RosterError::Registry(_) => ErrorKind::Registry,
        }
    }

    pub fn handler(msg: impl Into<String>) -> Self {
        RosterError::HandlerError(msg.into())
    }
}

impl From<serde_json::Error> for RosterError {
    fn from(err: serde_json::Error) -> Self {
        RosterError::HandlerError(format!("Serialization failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, RosterError>;
