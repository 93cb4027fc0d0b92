//! Result envelope returned for every dispatched command.

use crate::error::{ErrorKind, RosterError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a handler produces on success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub message: Option<String>,
    pub data: Option<Value>,
}

impl CommandOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            message: None,
            data: Some(data),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Caller-facing error description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RosterError> for ErrorInfo {
    fn from(err: &RosterError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Coarse outcome classification used for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub execution_time_ms: u64,
    /// Handler attempts made; zero when rejected before execution
    #[serde(default)]
    pub attempts: u32,
    /// Served from the result cache without running the handler
    #[serde(default)]
    pub cached: bool,
}

impl ExecutionResult {
    pub fn success(output: CommandOutput, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            message: output.message,
            data: output.data,
            error: None,
            execution_time_ms,
            attempts: 1,
            cached: false,
        }
    }

    pub fn failure(err: &RosterError, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(ErrorInfo::from(err)),
            execution_time_ms,
            attempts: 0,
            cached: false,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn outcome(&self) -> Outcome {
        match self.error_kind() {
            None => Outcome::Success,
            Some(kind) if kind.is_rejection() => Outcome::Rejected,
            Some(_) => Outcome::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_serializes_camel_case() {
        let result = ExecutionResult::success(
            CommandOutput::message("pong").with_data(json!({"latencyMs": 3})),
            12,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["message"], json!("pong"));
        assert_eq!(value["executionTimeMs"], json!(12));
        assert!(value.get("error").is_none());
        assert_eq!(result.outcome(), Outcome::Success);
    }

    #[test]
    fn test_failure_envelope_carries_kind() {
        let err = RosterError::RateLimited {
            limit: 10,
            window_secs: 60,
        };
        let result = ExecutionResult::failure(&err, 1);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], json!("rate_limited"));
        assert_eq!(result.outcome(), Outcome::Rejected);

        let result = ExecutionResult::failure(&RosterError::Timeout { timeout_ms: 30_000 }, 30_000);
        assert_eq!(result.outcome(), Outcome::Failed);
    }
}
