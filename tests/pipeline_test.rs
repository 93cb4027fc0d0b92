//! Execution pipeline admission, caching and accounting.

mod common;

use common::*;
use futures::future::join_all;
use roster_core::config::PipelineConfig;
use roster_core::error::ErrorKind;
use roster_core::pipeline::{
    CommandArgs, ExecutionContext, ExecutionPipeline, PipelineDeps, StaticAccessPolicy,
};
use roster_core::registry::{Command, CommandHandler, CommandMetadata};
use std::sync::Arc;
use std::time::Duration;

fn pipeline(
    metadata: CommandMetadata,
    handler: Arc<CountingHandler>,
    config: &PipelineConfig,
    deps: PipelineDeps,
) -> ExecutionPipeline {
    let handler: Arc<dyn CommandHandler> = handler;
    ExecutionPipeline::new(Arc::new(Command::new(metadata, handler)), config, deps)
}

fn ctx(caller: &str) -> ExecutionContext {
    ExecutionContext::new(caller, Some("guild-1".to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_rejects_until_elapsed() {
    let handler = Arc::new(CountingHandler::new());
    let pipeline = pipeline(
        CommandMetadata::new("roll", "Roll a die").with_cooldown(5),
        Arc::clone(&handler),
        &PipelineConfig::default(),
        pipeline_deps(10),
    );
    let args = CommandArgs::new();

    assert!(pipeline.execute(&ctx("alice"), &args).await.success);

    let rejected = pipeline.execute(&ctx("alice"), &args).await;
    assert_eq!(rejected.error_kind(), Some(ErrorKind::CooldownActive));
    assert_eq!(rejected.attempts, 0);

    // other callers are unaffected
    assert!(pipeline.execute(&ctx("bob"), &args).await.success);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(pipeline.execute(&ctx("alice"), &args).await.success);
    assert_eq!(handler.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window_slides() {
    let config = PipelineConfig {
        rate_limit_max_calls: 3,
        rate_limit_window_secs: 60,
        ..PipelineConfig::default()
    };
    let pipeline = pipeline(
        CommandMetadata::new("echo", "Echo"),
        Arc::new(CountingHandler::new()),
        &config,
        pipeline_deps(10),
    );
    let args = CommandArgs::new();

    for _ in 0..3 {
        assert!(pipeline.execute(&ctx("alice"), &args).await.success);
    }
    let limited = pipeline.execute(&ctx("alice"), &args).await;
    assert_eq!(limited.error_kind(), Some(ErrorKind::RateLimited));

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(pipeline.execute(&ctx("alice"), &args).await.success);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_under_burst() {
    let handler = Arc::new(CountingHandler::new().with_delay(Duration::from_secs(1)));
    let pipeline = pipeline(
        CommandMetadata::new("slow", "Slow"),
        Arc::clone(&handler),
        &PipelineConfig::default(),
        pipeline_deps(2),
    );
    let args = CommandArgs::new();

    let callers: Vec<String> = (0..5).map(|i| format!("caller-{i}")).collect();
    let results = join_all(callers.iter().map(|c| {
        let ctx = ctx(c);
        let pipeline = &pipeline;
        let args = &args;
        async move { pipeline.execute(&ctx, args).await }
    }))
    .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    let capped = results
        .iter()
        .filter(|r| r.error_kind() == Some(ErrorKind::ConcurrencyExceeded))
        .count();
    assert_eq!(succeeded, 2);
    assert_eq!(capped, 3);
    assert_eq!(handler.calls(), 2);

    // slots are released once the burst finishes
    assert!(pipeline.execute(&ctx("late"), &args).await.success);
}

#[tokio::test(start_paused = true)]
async fn test_result_cache_serves_repeat_requests() {
    let handler = Arc::new(CountingHandler::new().cached_under("summary"));
    let pipeline = pipeline(
        CommandMetadata::new("summary", "Summary"),
        Arc::clone(&handler),
        &PipelineConfig::default(),
        pipeline_deps(10),
    );
    let args = CommandArgs::new();

    let first = pipeline.execute(&ctx("alice"), &args).await;
    let second = pipeline.execute(&ctx("bob"), &args).await;
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.attempts, 0);
    assert_eq!(second.message, first.message);
    assert_eq!(handler.calls(), 1);

    pipeline.invalidate_cache();
    assert!(!pipeline.execute(&ctx("carol"), &args).await.cached);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_are_not_cached() {
    let config = PipelineConfig {
        max_retries: 0,
        ..PipelineConfig::default()
    };
    let handler = Arc::new(CountingHandler::new().failing_first(1).cached_under("k"));
    let pipeline = pipeline(
        CommandMetadata::new("flaky", "Flaky"),
        Arc::clone(&handler),
        &config,
        pipeline_deps(10),
    );
    let args = CommandArgs::new();

    let failed = pipeline.execute(&ctx("alice"), &args).await;
    assert_eq!(failed.error_kind(), Some(ErrorKind::HandlerError));
    assert_eq!(failed.attempts, 1);

    let retried = pipeline.execute(&ctx("alice"), &args).await;
    assert!(retried.success);
    assert!(!retried.cached);
    assert_eq!(handler.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_permissions_and_admins() {
    let policy = StaticAccessPolicy::new()
        .with_admin("root")
        .with_grant("moderator", "manage_members");
    let pipeline = pipeline(
        CommandMetadata::new("prune", "Prune").with_permissions(&["manage_members"]),
        Arc::new(CountingHandler::new()),
        &PipelineConfig::default(),
        pipeline_deps_with_policy(10, policy),
    );
    let args = CommandArgs::new();

    let denied = pipeline.execute(&ctx("visitor"), &args).await;
    assert_eq!(denied.error_kind(), Some(ErrorKind::PermissionDenied));
    assert!(denied
        .error
        .as_ref()
        .is_some_and(|e| e.message.contains("manage_members")));

    assert!(pipeline.execute(&ctx("moderator"), &args).await.success);
    assert!(pipeline.execute(&ctx("root"), &args).await.success);
}

#[tokio::test(start_paused = true)]
async fn test_scope_only_command_in_direct_message() {
    let pipeline = pipeline(
        CommandMetadata::new("census", "Census").scope_only(),
        Arc::new(CountingHandler::new()),
        &PipelineConfig::default(),
        pipeline_deps_with_policy(10, StaticAccessPolicy::new().with_admin("root")),
    );

    let direct = ExecutionContext::new("root", None);
    let result = pipeline.execute(&direct, &CommandArgs::new()).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::PermissionDenied));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_handler() {
    let handler = Arc::new(CountingHandler::new().with_delay(Duration::from_secs(30)));
    let pipeline = pipeline(
        CommandMetadata::new("long", "Long"),
        Arc::clone(&handler),
        &PipelineConfig::default(),
        pipeline_deps(10),
    );
    let context = ctx("alice");
    let token = context.cancellation.clone();

    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    };
    let args = CommandArgs::new();
    let (result, ()) = tokio::join!(pipeline.execute(&context, &args), canceller);

    assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
    assert!(result.execution_time_ms < 30_000);
}

#[tokio::test(start_paused = true)]
async fn test_statistics_cover_every_outcome() {
    let config = PipelineConfig {
        max_retries: 0,
        rate_limit_max_calls: 2,
        ..PipelineConfig::default()
    };
    let deps = pipeline_deps(10);
    let statistics = Arc::clone(&deps.statistics);
    let pipeline = pipeline(
        CommandMetadata::new("mixed", "Mixed"),
        Arc::new(CountingHandler::new().failing_first(1)),
        &config,
        deps,
    );
    let args = CommandArgs::new();

    pipeline.execute(&ctx("alice"), &args).await; // handler error
    pipeline.execute(&ctx("alice"), &args).await; // success
    pipeline.execute(&ctx("alice"), &args).await; // rate limited

    let stats = statistics.get("mixed").expect("statistics recorded");
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.error_kinds.get(&ErrorKind::RateLimited), Some(&1));
    assert_eq!(stats.error_kinds.get(&ErrorKind::HandlerError), Some(&1));
}
