//! Liveness check.

use crate::error::Result;
use crate::pipeline::{CommandArgs, CommandOutput, ExecutionContext};
use crate::registry::{CommandDescriptor, CommandHandler, CommandMetadata, Services};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    async fn execute(&self, ctx: &ExecutionContext, _args: &CommandArgs) -> Result<CommandOutput> {
        let latency_ms = (Utc::now() - ctx.timestamp).num_milliseconds().max(0);
        Ok(CommandOutput::message("Pong!").with_data(json!({ "latencyMs": latency_ms })))
    }
}

fn construct(_services: &Services) -> Result<Arc<dyn CommandHandler>> {
    Ok(Arc::new(PingHandler))
}

pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor::core(
        CommandMetadata::new("ping", "Check that the bot is responsive"),
        construct,
    )
}
