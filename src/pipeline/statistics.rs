//! # Execution Statistics
//!
//! Per-command counters shared by every pipeline and rendered by the
//! analytics surface. Every terminal outcome is recorded, including
//! admission rejections and cache hits.

use crate::error::ErrorKind;
use crate::fetch::FetchAttempt;
use crate::pipeline::{ExecutionResult, Outcome};
use crate::registry::RegistryStats;
use crate::resilience::CircuitBreakerMetrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommandStatistics {
    pub command: String,
    pub total_executions: u64,
    pub successful: u64,
    pub failed: u64,
    pub rejected: u64,
    pub cache_hits: u64,
    pub retries: u64,
    pub average_latency_ms: f64,
    pub max_latency_ms: u64,
    pub error_kinds: HashMap<ErrorKind, u64>,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl CommandStatistics {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, result: &ExecutionResult) {
        self.total_executions += 1;
        match result.outcome() {
            Outcome::Success => self.successful += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Failed => self.failed += 1,
        }
        if result.cached {
            self.cache_hits += 1;
        }
        self.retries += u64::from(result.attempts.saturating_sub(1));
        if let Some(kind) = result.error_kind() {
            *self.error_kinds.entry(kind).or_insert(0) += 1;
        }

        let latency = result.execution_time_ms;
        self.average_latency_ms +=
            (latency as f64 - self.average_latency_ms) / self.total_executions as f64;
        self.max_latency_ms = self.max_latency_ms.max(latency);
        self.last_executed_at = Some(Utc::now());
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total_executions as f64
    }
}

/// Shared statistics store keyed by canonical command name
#[derive(Debug, Default)]
pub struct StatisticsStore {
    commands: DashMap<String, CommandStatistics>,
}

impl StatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command: &str, result: &ExecutionResult) {
        self.commands
            .entry(command.to_string())
            .or_insert_with(|| CommandStatistics::new(command))
            .record(result);
    }

    pub fn get(&self, command: &str) -> Option<CommandStatistics> {
        self.commands.get(command).map(|s| s.value().clone())
    }

    /// All commands, busiest first
    pub fn all(&self) -> Vec<CommandStatistics> {
        let mut all: Vec<CommandStatistics> =
            self.commands.iter().map(|s| s.value().clone()).collect();
        all.sort_by(|a, b| {
            b.total_executions
                .cmp(&a.total_executions)
                .then_with(|| a.command.cmp(&b.command))
        });
        all
    }

    pub fn total_executions(&self) -> u64 {
        self.commands.iter().map(|s| s.total_executions).sum()
    }

    /// Commands whose average latency exceeds `threshold_ms`
    pub fn slow_commands(&self, threshold_ms: u64) -> Vec<String> {
        let mut slow: Vec<String> = self
            .commands
            .iter()
            .filter(|s| s.average_latency_ms > threshold_ms as f64)
            .map(|s| s.command.clone())
            .collect();
        slow.sort();
        slow
    }

    /// Error counts aggregated across every command
    pub fn error_histogram(&self) -> HashMap<ErrorKind, u64> {
        let mut histogram = HashMap::new();
        for stats in self.commands.iter() {
            for (kind, count) in &stats.error_kinds {
                *histogram.entry(*kind).or_insert(0) += count;
            }
        }
        histogram
    }

    pub fn reset(&self) {
        self.commands.clear();
    }

    pub fn analytics(&self, slow_threshold_ms: u64) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            generated_at: Utc::now(),
            total_executions: self.total_executions(),
            commands: self.all(),
            slow_commands: self.slow_commands(slow_threshold_ms),
            error_histogram: self.error_histogram(),
            registry: None,
            circuit_breaker: None,
            recent_fetch_attempts: Vec::new(),
        }
    }
}

/// Point-in-time operator view of the whole core
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub generated_at: DateTime<Utc>,
    pub total_executions: u64,
    pub commands: Vec<CommandStatistics>,
    pub slow_commands: Vec<String>,
    pub error_histogram: HashMap<ErrorKind, u64>,
    pub registry: Option<RegistryStats>,
    pub circuit_breaker: Option<CircuitBreakerMetrics>,
    pub recent_fetch_attempts: Vec<FetchAttempt>,
}
