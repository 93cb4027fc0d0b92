//! Command listing.

use crate::error::Result;
use crate::pipeline::{ArgsExt, CommandArgs, CommandOutput, ExecutionContext};
use crate::registry::{CommandDescriptor, CommandHandler, CommandMetadata, Services};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug)]
pub struct HelpHandler {
    catalog: Vec<CommandMetadata>,
}

impl HelpHandler {
    pub fn new(catalog: Vec<CommandMetadata>) -> Self {
        Self { catalog }
    }

    fn find(&self, name: &str) -> Option<&CommandMetadata> {
        let name = name.trim_start_matches(['!', '/']).to_lowercase();
        self.catalog
            .iter()
            .find(|m| m.name == name || m.aliases.iter().any(|a| a.eq_ignore_ascii_case(&name)))
    }
}

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn execute(&self, _ctx: &ExecutionContext, args: &CommandArgs) -> Result<CommandOutput> {
        if let Some(name) = args.str_arg("command") {
            return Ok(match self.find(name) {
                Some(meta) => {
                    let mut message = format!("{}: {}", meta.name, meta.description);
                    if !meta.aliases.is_empty() {
                        message.push_str(&format!(" (aliases: {})", meta.aliases.join(", ")));
                    }
                    CommandOutput::message(message).with_data(serde_json::to_value(meta)?)
                }
                None => CommandOutput::message(format!("No command named {name}")),
            });
        }

        let lines: Vec<String> = self
            .catalog
            .iter()
            .filter(|m| !m.admin_only)
            .map(|m| format!("{}: {}", m.name, m.description))
            .collect();
        Ok(CommandOutput::message(lines.join("\n")).with_data(json!({ "commands": self.catalog })))
    }

    fn cache_key(&self, _ctx: &ExecutionContext, args: &CommandArgs) -> Option<String> {
        Some(args.str_arg("command").unwrap_or("*").to_lowercase())
    }
}

fn construct(services: &Services) -> Result<Arc<dyn CommandHandler>> {
    Ok(Arc::new(HelpHandler::new(services.catalog.clone())))
}

pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor::lazy(
        CommandMetadata::new("help", "List available commands").with_aliases(&["commands"]),
        construct,
    )
}
