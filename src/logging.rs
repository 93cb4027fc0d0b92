//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing command executions, fetch
//! tiers and registry activity across many concurrent tasks.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_output = wants_json_output();

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let layer = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = json_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("ROSTER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn wants_json_output() -> bool {
    std::env::var("ROSTER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for a completed command execution
pub fn log_command_operation(
    command: &str,
    caller_id: &str,
    scope_id: Option<&str>,
    trace_id: &str,
    status: &str,
    duration_ms: u64,
    details: Option<&str>,
) {
    tracing::info!(
        command = %command,
        caller_id = %caller_id,
        scope_id = scope_id,
        trace_id = %trace_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "⚡ COMMAND_OPERATION"
    );
}

/// Log structured data for a single fetch tier attempt
pub fn log_fetch_attempt(
    scope_id: &str,
    tier: &str,
    outcome: &str,
    duration_ms: u64,
    member_count: Option<usize>,
) {
    tracing::info!(
        scope_id = %scope_id,
        tier = %tier,
        outcome = %outcome,
        duration_ms = duration_ms,
        member_count = member_count,
        timestamp = %Utc::now().to_rfc3339(),
        "📡 FETCH_ATTEMPT"
    );
}

/// Log structured data for registry operations
pub fn log_registry_operation(
    operation: &str,
    name: Option<&str>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        name = name,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📚 REGISTRY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
