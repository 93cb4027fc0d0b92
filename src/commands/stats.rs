//! Operator analytics: per-command statistics, breaker health and recent
//! fetch attempts.

use crate::constants::thresholds::SLOW_EXECUTION_MS;
use crate::error::{Result, RosterError};
use crate::fetch::ResilientFetchStrategy;
use crate::pipeline::{ArgsExt, CommandArgs, CommandOutput, ExecutionContext, StatisticsStore};
use crate::registry::{
    CommandDescriptor, CommandHandler, CommandMetadata, ServiceDependency, Services,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const RECENT_ATTEMPTS_SHOWN: usize = 10;

#[derive(Debug)]
pub struct StatsHandler {
    statistics: Arc<StatisticsStore>,
    fetch: Option<Arc<ResilientFetchStrategy>>,
}

impl StatsHandler {
    pub fn new(statistics: Arc<StatisticsStore>, fetch: Option<Arc<ResilientFetchStrategy>>) -> Self {
        Self { statistics, fetch }
    }
}

#[async_trait]
impl CommandHandler for StatsHandler {
    async fn execute(&self, _ctx: &ExecutionContext, args: &CommandArgs) -> Result<CommandOutput> {
        if let Some(command) = args.str_arg("command") {
            let stats = self.statistics.get(command).ok_or_else(|| {
                RosterError::handler(format!("no statistics recorded for {command}"))
            })?;
            let message = format!(
                "{}: {} runs, {:.0}% success, {:.1}ms average",
                stats.command,
                stats.total_executions,
                stats.success_rate() * 100.0,
                stats.average_latency_ms
            );
            return Ok(CommandOutput::message(message).with_data(serde_json::to_value(&stats)?));
        }

        let mut snapshot = self.statistics.analytics(SLOW_EXECUTION_MS);
        if let Some(fetch) = &self.fetch {
            snapshot.circuit_breaker = Some(fetch.breaker().metrics());
            let attempts = fetch.recent_attempts();
            let skip = attempts.len().saturating_sub(RECENT_ATTEMPTS_SHOWN);
            snapshot.recent_fetch_attempts = attempts.into_iter().skip(skip).collect();
        }

        let mut message = format!(
            "{} executions across {} commands",
            snapshot.total_executions,
            snapshot.commands.len()
        );
        if let Some(breaker) = &snapshot.circuit_breaker {
            message.push_str(&format!("; member fetch: {}", breaker.format_summary()));
        }

        Ok(CommandOutput::message(message).with_data(json!({ "analytics": snapshot })))
    }
}

fn construct(services: &Services) -> Result<Arc<dyn CommandHandler>> {
    let statistics = services
        .statistics
        .clone()
        .ok_or_else(|| RosterError::Registry("statistics store missing".to_string()))?;
    Ok(Arc::new(StatsHandler::new(
        statistics,
        services.member_fetch.clone(),
    )))
}

pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor::lazy(
        CommandMetadata::new("stats", "Show command usage and dependency health")
            .with_aliases(&["statistics"])
            .admin_only(),
        construct,
    )
    .depends_on(&[ServiceDependency::Statistics])
}
