//! Inbound command routing.
//!
//! The dispatcher turns a raw request into a command execution: it
//! normalizes the name, applies the global per-caller throttle, resolves the
//! command through the registry, and runs it through that command's pipeline.
//! Pipelines are built on first use and kept for the life of the process so
//! cooldown and rate-limit state persists across requests.

use crate::config::{DispatcherConfig, PipelineConfig};
use crate::constants::dispatcher::COMMAND_PREFIXES;
use crate::error::RosterError;
use crate::logging::log_command_operation;
use crate::pipeline::{
    CommandArgs, ExecutionContext, ExecutionPipeline, ExecutionResult, PipelineDeps,
    SlidingWindowLimiter, StatisticsStore,
};
use crate::registry::CommandRegistry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Statistics bucket for requests naming no registered command
pub const UNKNOWN_COMMAND: &str = "<unknown>";

/// A command invocation as received from the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    pub command_name: String,
    pub caller_id: String,
    /// Empty for direct messages
    #[serde(default)]
    pub scope_id: String,
    #[serde(default)]
    pub args: CommandArgs,
}

impl InboundRequest {
    pub fn new(
        command_name: impl Into<String>,
        caller_id: impl Into<String>,
        scope_id: impl Into<String>,
    ) -> Self {
        Self {
            command_name: command_name.into(),
            caller_id: caller_id.into(),
            scope_id: scope_id.into(),
            args: CommandArgs::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// Lowercase the name and strip one leading command prefix
pub fn normalize_command_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix(COMMAND_PREFIXES)
        .unwrap_or(trimmed);
    stripped.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStats {
    pub pipelines: usize,
    pub requests: u64,
    pub unknown_commands: u64,
    pub throttled: u64,
}

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
    pipelines: DashMap<String, Arc<ExecutionPipeline>>,
    pipeline_config: PipelineConfig,
    deps: PipelineDeps,
    global_limiter: SlidingWindowLimiter,
    shutdown: CancellationToken,
    requests: AtomicU64,
    unknown: AtomicU64,
    throttled: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CommandRegistry>,
        pipeline_config: PipelineConfig,
        dispatcher_config: &DispatcherConfig,
        deps: PipelineDeps,
    ) -> Self {
        Self {
            registry,
            pipelines: DashMap::new(),
            pipeline_config,
            deps,
            global_limiter: SlidingWindowLimiter::new(
                dispatcher_config.global_rate_limit_max_calls,
                dispatcher_config.global_rate_limit_window(),
            ),
            shutdown: CancellationToken::new(),
            requests: AtomicU64::new(0),
            unknown: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn statistics(&self) -> &Arc<StatisticsStore> {
        &self.deps.statistics
    }

    /// Token cancelled on shutdown; every request context derives from it
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Route one request to its command and return the result envelope
    pub async fn dispatch(&self, request: InboundRequest) -> ExecutionResult {
        let start = Instant::now();
        self.requests.fetch_add(1, Ordering::Relaxed);

        let ctx = ExecutionContext::new(request.caller_id.clone(), Some(request.scope_id.clone()))
            .with_cancellation(self.shutdown.child_token());
        let name = normalize_command_name(&request.command_name);

        debug!(
            command = %name,
            caller_id = %ctx.caller_id,
            trace_id = %ctx.trace_id,
            "Dispatching command"
        );

        if self.shutdown.is_cancelled() {
            let err = RosterError::Cancelled("dispatcher is shutting down".to_string());
            return self.finish_rejection(&name, &ctx, &err, start);
        }

        let Some(canonical) = self.registry.resolve(&name).map(str::to_string) else {
            self.unknown.fetch_add(1, Ordering::Relaxed);
            let err = RosterError::CommandNotFound(name.clone());
            return self.finish_rejection(UNKNOWN_COMMAND, &ctx, &err, start);
        };

        if let Err(err) = self.global_limiter.check(&ctx.caller_id) {
            self.throttled.fetch_add(1, Ordering::Relaxed);
            return self.finish_rejection(&canonical, &ctx, &err, start);
        }

        let Some(pipeline) = self.pipeline_for(&canonical).await else {
            let err = RosterError::CommandNotFound(format!("{canonical} is unavailable"));
            return self.finish_rejection(&canonical, &ctx, &err, start);
        };

        let result = pipeline.execute(&ctx, &request.args).await;
        self.registry.record_execution(
            &canonical,
            Duration::from_millis(result.execution_time_ms),
            result.success,
        );
        ctx.cancellation.cancel();
        result
    }

    /// Pipeline for a canonical command name, built on first use
    async fn pipeline_for(&self, canonical: &str) -> Option<Arc<ExecutionPipeline>> {
        if let Some(pipeline) = self.pipelines.get(canonical) {
            return Some(Arc::clone(pipeline.value()));
        }

        let command = self.registry.get_command(canonical).await?;
        let pipeline = self
            .pipelines
            .entry(canonical.to_string())
            .or_insert_with(|| {
                info!(command = %canonical, "Building execution pipeline");
                Arc::new(ExecutionPipeline::new(
                    command,
                    &self.pipeline_config,
                    self.deps.clone(),
                ))
            })
            .clone();
        Some(pipeline)
    }

    fn finish_rejection(
        &self,
        command: &str,
        ctx: &ExecutionContext,
        err: &RosterError,
        start: Instant,
    ) -> ExecutionResult {
        let result = ExecutionResult::failure(err, start.elapsed().as_millis() as u64);
        self.deps.statistics.record(command, &result);
        log_command_operation(
            command,
            &ctx.caller_id,
            ctx.scope_id.as_deref(),
            &ctx.trace_id.to_string(),
            err.kind().as_str(),
            result.execution_time_ms,
            Some(&err.to_string()),
        );
        result
    }

    /// Drop cached results of one command, or of every command
    pub fn invalidate_results(&self, command: Option<&str>) {
        match command.and_then(|c| self.registry.resolve(c)) {
            Some(name) => {
                if let Some(pipeline) = self.pipelines.get(name) {
                    pipeline.invalidate_cache();
                }
            }
            None => {
                for pipeline in self.pipelines.iter() {
                    pipeline.invalidate_cache();
                }
            }
        }
    }

    /// Pipeline already built for a command name or alias
    pub fn pipeline(&self, command: &str) -> Option<Arc<ExecutionPipeline>> {
        let name = self.registry.resolve(command)?;
        self.pipelines.get(name).map(|p| Arc::clone(p.value()))
    }

    pub fn global_limiter(&self) -> &SlidingWindowLimiter {
        &self.global_limiter
    }

    /// Prune idle admission state across the global throttle and every pipeline
    pub fn prune_idle_state(&self) -> usize {
        let pipelines: Vec<Arc<ExecutionPipeline>> =
            self.pipelines.iter().map(|p| Arc::clone(p.value())).collect();
        let pruned = self.global_limiter.prune_idle()
            + pipelines
                .iter()
                .map(|p| p.prune_idle_state())
                .sum::<usize>();
        if pruned > 0 {
            debug!(pruned = pruned, "🧹 Pruned idle admission state");
        }
        pruned
    }

    /// Periodically prune idle admission state until `shutdown` fires
    pub fn spawn_maintenance(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        dispatcher.prune_idle_state();
                    }
                }
            }
            debug!("Dispatcher maintenance stopped");
        })
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pipelines: self.pipelines.len(),
            requests: self.requests.load(Ordering::Relaxed),
            unknown_commands: self.unknown.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }

    /// Cancel every in-flight request and refuse new ones
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("🛑 Dispatcher shutting down");
            self.shutdown.cancel();
        }
    }
}
