//! Command handler contract and the descriptors the registry loads from.

use crate::commands::ActivityStore;
use crate::error::Result;
use crate::fetch::ResilientFetchStrategy;
use crate::pipeline::{CommandArgs, CommandOutput, ExecutionContext, StatisticsStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Static description of a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    /// Every listed permission is required unless the caller is an admin
    pub permissions: Vec<String>,
    pub cooldown_seconds: u64,
    pub admin_only: bool,
    /// Only usable inside a community scope
    pub scope_only: bool,
}

impl CommandMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: description.into(),
            permissions: Vec::new(),
            cooldown_seconds: 0,
            admin_only: false,
            scope_only: false,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_cooldown(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }

    pub fn scope_only(mut self) -> Self {
        self.scope_only = true;
        self
    }
}

/// Business logic behind one command
#[async_trait]
pub trait CommandHandler: Send + Sync + Debug {
    async fn execute(&self, ctx: &ExecutionContext, args: &CommandArgs) -> Result<CommandOutput>;

    /// Key under which a successful result may be cached; `None` disables caching
    fn cache_key(&self, _ctx: &ExecutionContext, _args: &CommandArgs) -> Option<String> {
        None
    }
}

/// A loaded command: metadata, handler instance and runtime enabled flag
#[derive(Debug)]
pub struct Command {
    pub metadata: CommandMetadata,
    pub handler: Arc<dyn CommandHandler>,
    enabled: Arc<AtomicBool>,
}

impl Command {
    pub fn new(metadata: CommandMetadata, handler: Arc<dyn CommandHandler>) -> Self {
        Self::with_enabled_flag(metadata, handler, Arc::new(AtomicBool::new(true)))
    }

    /// Share the enabled flag with the registry so toggles apply before and after loading
    pub(crate) fn with_enabled_flag(
        metadata: CommandMetadata,
        handler: Arc<dyn CommandHandler>,
        enabled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            metadata,
            handler,
            enabled,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// When a handler is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    /// Loaded eagerly during initialization; failure is fatal
    Core,
    /// Loaded in the background or on first use; failure is isolated
    Lazy,
}

/// Shared services a handler may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceDependency {
    MemberFetch,
    ActivityStore,
    Statistics,
}

/// Services handed to handler constructors
#[derive(Debug, Clone, Default)]
pub struct Services {
    pub member_fetch: Option<Arc<ResilientFetchStrategy>>,
    pub activity_store: Option<Arc<dyn ActivityStore>>,
    pub statistics: Option<Arc<StatisticsStore>>,
    /// Metadata of every registered command, for listings
    pub catalog: Vec<CommandMetadata>,
}

impl Services {
    pub fn provides(&self, dependency: ServiceDependency) -> bool {
        match dependency {
            ServiceDependency::MemberFetch => self.member_fetch.is_some(),
            ServiceDependency::ActivityStore => self.activity_store.is_some(),
            ServiceDependency::Statistics => self.statistics.is_some(),
        }
    }
}

pub type HandlerConstructor = fn(&Services) -> Result<Arc<dyn CommandHandler>>;

/// Everything the registry needs to know about a command before loading it
#[derive(Clone)]
pub struct CommandDescriptor {
    pub metadata: CommandMetadata,
    pub category: CommandCategory,
    pub dependencies: Vec<ServiceDependency>,
    pub constructor: HandlerConstructor,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.metadata.name)
            .field("category", &self.category)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    pub fn core(metadata: CommandMetadata, constructor: HandlerConstructor) -> Self {
        Self {
            metadata,
            category: CommandCategory::Core,
            dependencies: Vec::new(),
            constructor,
        }
    }

    pub fn lazy(metadata: CommandMetadata, constructor: HandlerConstructor) -> Self {
        Self {
            category: CommandCategory::Lazy,
            ..Self::core(metadata, constructor)
        }
    }

    pub fn depends_on(mut self, dependencies: &[ServiceDependency]) -> Self {
        self.dependencies = dependencies.to_vec();
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn missing_dependencies(&self, services: &Services) -> Vec<ServiceDependency> {
        self.dependencies
            .iter()
            .copied()
            .filter(|dep| !services.provides(*dep))
            .collect()
    }
}
