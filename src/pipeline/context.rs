//! Per-request execution context.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Parsed command arguments keyed by option name
pub type CommandArgs = HashMap<String, Value>;

/// Everything a handler knows about the request it is serving
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub caller_id: String,
    /// `None` for direct messages and other scope-less requests
    pub scope_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Uuid,
    /// Fires on timeout, shutdown or explicit cancellation
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(caller_id: impl Into<String>, scope_id: Option<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            scope_id: scope_id.filter(|s| !s.is_empty()),
            timestamp: Utc::now(),
            trace_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Copy of this context whose token is a child of the current one
    pub fn child(&self) -> Self {
        Self {
            cancellation: self.cancellation.child_token(),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Typed accessors over raw argument maps
pub trait ArgsExt {
    fn str_arg(&self, key: &str) -> Option<&str>;
    fn u64_arg(&self, key: &str) -> Option<u64>;
    fn bool_arg(&self, key: &str) -> Option<bool>;
}

impl ArgsExt for CommandArgs {
    fn str_arg(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn u64_arg(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn bool_arg(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
