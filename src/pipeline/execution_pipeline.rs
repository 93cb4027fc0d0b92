//! # Execution Pipeline
//!
//! Wraps one command with the full admission and execution policy. Stages
//! run in a fixed order and the first rejection short-circuits the rest:
//!
//! ```text
//! enabled → authorize → cooldown → rate limit → result cache
//!         → concurrency slot → timeout(handler) with retry → statistics
//! ```
//!
//! Only unexpected handler failures are retried. Rejections and timeouts are
//! terminal. Statistics are recorded for every outcome, and the reported
//! execution time covers all attempts and backoff waits.

use crate::cache::TtlCache;
use crate::config::PipelineConfig;
use crate::error::{Result, RosterError};
use crate::logging::log_command_operation;
use crate::pipeline::{
    AccessDecision, AccessPolicy, CommandArgs, CommandOutput, ConcurrencyGate, CooldownTracker,
    ExecutionContext, ExecutionResult, RetryPolicy, SlidingWindowLimiter, StatisticsStore,
};
use crate::registry::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Collaborators shared by every pipeline in the process
#[derive(Debug, Clone)]
pub struct PipelineDeps {
    pub access: Arc<dyn AccessPolicy>,
    pub concurrency: Arc<ConcurrencyGate>,
    pub statistics: Arc<StatisticsStore>,
}

#[derive(Debug)]
pub struct ExecutionPipeline {
    command: Arc<Command>,
    deps: PipelineDeps,
    cooldown: CooldownTracker,
    rate_limiter: SlidingWindowLimiter,
    retry: RetryPolicy,
    timeout: Duration,
    result_cache: Option<TtlCache<String, ExecutionResult>>,
}

impl ExecutionPipeline {
    pub fn new(command: Arc<Command>, config: &PipelineConfig, deps: PipelineDeps) -> Self {
        let cooldown = CooldownTracker::new(Duration::from_secs(command.metadata.cooldown_seconds));
        let result_cache = config.result_cache_enabled.then(|| {
            TtlCache::new(
                format!("results:{}", command.name()),
                config.result_cache_ttl(),
            )
        });

        Self {
            cooldown,
            rate_limiter: SlidingWindowLimiter::new(
                config.rate_limit_max_calls,
                config.rate_limit_window(),
            ),
            retry: RetryPolicy::from_config(config),
            timeout: config.timeout(),
            result_cache,
            command,
            deps,
        }
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn name(&self) -> &str {
        self.command.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rate_limiter(&self) -> &SlidingWindowLimiter {
        &self.rate_limiter
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Release per-caller state that no longer affects admission, plus
    /// expired cached results. Returns the number of entries dropped.
    pub fn prune_idle_state(&self) -> usize {
        let mut pruned = self.cooldown.prune_expired() + self.rate_limiter.prune_idle();
        if let Some(cache) = &self.result_cache {
            pruned += cache.purge_expired();
        }
        pruned
    }

    pub fn cached_results(&self) -> usize {
        self.result_cache.as_ref().map_or(0, |cache| cache.len())
    }

    /// Drop every cached result for this command
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.result_cache {
            cache.clear();
        }
    }

    /// Run the request through every stage and return the terminal envelope
    pub async fn execute(&self, ctx: &ExecutionContext, args: &CommandArgs) -> ExecutionResult {
        let start = Instant::now();

        let mut result = match self.admit(ctx) {
            Err(err) => {
                debug!(command = %self.name(), caller_id = %ctx.caller_id, error = %err, "Request rejected at admission");
                ExecutionResult::failure(&err, 0)
            }
            Ok(()) => {
                let cache_key = self.cache_key(ctx, args);
                match cache_key.as_ref().and_then(|key| self.cached_result(key)) {
                    Some(hit) => hit,
                    None => self.run_admitted(ctx, args, cache_key).await,
                }
            }
        };
        result.execution_time_ms = start.elapsed().as_millis() as u64;

        self.deps.statistics.record(self.name(), &result);
        let status = if result.success {
            "success"
        } else {
            result.error_kind().map(|k| k.as_str()).unwrap_or("error")
        };
        log_command_operation(
            self.name(),
            &ctx.caller_id,
            ctx.scope_id.as_deref(),
            &ctx.trace_id.to_string(),
            status,
            result.execution_time_ms,
            result.error.as_ref().map(|e| e.message.as_str()),
        );

        result
    }

    /// Stages 1-4. Each stage either passes or returns the rejection.
    fn admit(&self, ctx: &ExecutionContext) -> Result<()> {
        if !self.command.is_enabled() {
            return Err(RosterError::CommandDisabled(self.name().to_string()));
        }

        if let AccessDecision::Denied(reason) =
            self.deps.access.authorize(ctx, &self.command.metadata)
        {
            return Err(RosterError::PermissionDenied(reason));
        }

        self.cooldown.check_and_record(&ctx.caller_id)?;
        self.rate_limiter.check(&ctx.caller_id)?;
        Ok(())
    }

    fn cache_key(&self, ctx: &ExecutionContext, args: &CommandArgs) -> Option<String> {
        self.result_cache.as_ref()?;
        self.command
            .handler
            .cache_key(ctx, args)
            .map(|key| format!("{}:{}", self.name(), key))
    }

    fn cached_result(&self, key: &String) -> Option<ExecutionResult> {
        let mut hit = self.result_cache.as_ref()?.get(key)?;
        hit.cached = true;
        hit.attempts = 0;
        debug!(command = %self.name(), key = %key, "Result cache hit");
        Some(hit)
    }

    /// Stages 6-7: hold a concurrency slot for the whole retry loop
    async fn run_admitted(
        &self,
        ctx: &ExecutionContext,
        args: &CommandArgs,
        cache_key: Option<String>,
    ) -> ExecutionResult {
        let permit = match self.deps.concurrency.try_acquire(Uuid::new_v4()) {
            Ok(permit) => permit,
            Err(err) => return ExecutionResult::failure(&err, 0),
        };

        let (outcome, attempts) = self.execute_with_retry(ctx, args).await;
        drop(permit);

        match outcome {
            Ok(output) => {
                let result = ExecutionResult::success(output, 0).with_attempts(attempts);
                if let (Some(cache), Some(key)) = (&self.result_cache, cache_key) {
                    cache.insert(key, result.clone());
                }
                result
            }
            Err(err) => ExecutionResult::failure(&err, 0).with_attempts(attempts),
        }
    }

    async fn execute_with_retry(
        &self,
        ctx: &ExecutionContext,
        args: &CommandArgs,
    ) -> (Result<CommandOutput>, u32) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.execute_once(ctx, args).await;

            match outcome {
                Err(err) if err.kind().is_retryable() && attempt < self.retry.max_attempts() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        command = %self.name(),
                        trace_id = %ctx.trace_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "🔁 Handler failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = ctx.cancellation.cancelled() => {
                            return (Err(RosterError::Cancelled(self.name().to_string())), attempt);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                outcome => return (outcome, attempt),
            }
        }
    }

    /// One handler attempt raced against the timeout and the request token.
    ///
    /// On timeout the handler future is dropped and the attempt's child
    /// token is cancelled so anything it spawned winds down too.
    async fn execute_once(&self, ctx: &ExecutionContext, args: &CommandArgs) -> Result<CommandOutput> {
        let attempt_ctx = ctx.child();
        let handler = Arc::clone(&self.command.handler);

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                Err(RosterError::Cancelled(self.name().to_string()))
            }
            timed = tokio::time::timeout(self.timeout, handler.execute(&attempt_ctx, args)) => {
                match timed {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            command = %self.name(),
                            trace_id = %ctx.trace_id,
                            timeout_ms = self.timeout.as_millis() as u64,
                            "⏰ Handler timed out, cancelling"
                        );
                        Err(RosterError::Timeout {
                            timeout_ms: self.timeout.as_millis() as u64,
                        })
                    }
                }
            }
        };

        attempt_ctx.cancellation.cancel();
        outcome
    }
}
