//! # Runtime Bootstrap
//!
//! Wires configuration, the member-fetch breaker, the fetch strategy, the
//! command registry and the dispatcher into one [`RosterRuntime`] handle.
//!
//! The platform layer supplies the two collaborators the core cannot build
//! itself: a [`MemberFetcher`] talking to the chat platform and an
//! [`ActivityStore`] holding last-seen timestamps.
//!
//! ```rust,ignore
//! let manager = ConfigManager::load()?;
//! let runtime = RosterRuntime::build(manager, collaborators)?;
//! runtime.initialize().await?;
//! let result = runtime.dispatch(InboundRequest::new("!report", caller, guild)).await;
//! runtime.shutdown();
//! ```

use crate::commands::{builtin_catalog, ActivityStore};
use crate::config::{ConfigManager, RosterConfig};
use crate::dispatch::{Dispatcher, DispatcherStats, InboundRequest};
use crate::error::Result;
use crate::fetch::{MemberFetcher, ResilientFetchStrategy};
use crate::logging::log_error;
use crate::pipeline::{
    AccessPolicy, AnalyticsSnapshot, ConcurrencyGate, ExecutionResult, PipelineDeps,
    StaticAccessPolicy, StatisticsStore,
};
use crate::registry::{CommandDescriptor, CommandRegistry, Services};
use crate::resilience::CircuitBreaker;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Platform-side dependencies handed to the runtime
#[derive(Debug, Clone)]
pub struct RosterCollaborators {
    pub member_fetcher: Arc<dyn MemberFetcher>,
    pub activity_store: Arc<dyn ActivityStore>,
    /// Overrides the policy built from `[access]` configuration
    pub access_policy: Option<Arc<dyn AccessPolicy>>,
}

impl RosterCollaborators {
    pub fn new(
        member_fetcher: Arc<dyn MemberFetcher>,
        activity_store: Arc<dyn ActivityStore>,
    ) -> Self {
        Self {
            member_fetcher,
            activity_store,
            access_policy: None,
        }
    }

    pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus {
    pub environment: String,
    pub initialized: bool,
    pub shutting_down: bool,
    pub breaker_healthy: bool,
    pub dispatcher: DispatcherStats,
}

#[derive(Debug)]
pub struct RosterRuntime {
    config_manager: Arc<ConfigManager>,
    fetch: Arc<ResilientFetchStrategy>,
    statistics: Arc<StatisticsStore>,
    registry: Arc<CommandRegistry>,
    dispatcher: Arc<Dispatcher>,
    activity_store: Arc<dyn ActivityStore>,
    background: CancellationToken,
    initialized: AtomicBool,
}

impl RosterRuntime {
    /// Build a runtime with the built-in command catalog
    pub fn build(
        config_manager: Arc<ConfigManager>,
        collaborators: RosterCollaborators,
    ) -> Result<Self> {
        Self::build_with_catalog(config_manager, collaborators, builtin_catalog())
    }

    /// Build a runtime from an explicit set of command descriptors
    pub fn build_with_catalog(
        config_manager: Arc<ConfigManager>,
        collaborators: RosterCollaborators,
        descriptors: Vec<CommandDescriptor>,
    ) -> Result<Self> {
        let config: &RosterConfig = config_manager.config();
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(
            "member_fetch",
            config.circuit_breaker.to_breaker_config(),
        ));
        info!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            timeout_ms = config.circuit_breaker.timeout_ms,
            "🛡️ BOOTSTRAP: Member fetch circuit breaker configured"
        );

        let fetch = Arc::new(ResilientFetchStrategy::new(
            collaborators.member_fetcher,
            breaker,
            config.fetch.clone(),
            config.resources.max_lifetime(),
        ));

        let statistics = Arc::new(StatisticsStore::new());
        let access = collaborators
            .access_policy
            .unwrap_or_else(|| Arc::new(StaticAccessPolicy::from_config(&config.access)));
        let deps = PipelineDeps {
            access,
            concurrency: ConcurrencyGate::new(config.pipeline.max_concurrent_executions),
            statistics: Arc::clone(&statistics),
        };

        let registry = Arc::new(CommandRegistry::new(descriptors, config.registry.clone())?);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config.pipeline.clone(),
            &config.dispatcher,
            deps,
        ));

        info!(
            environment = %config_manager.environment(),
            commands = registry.stats().total_commands,
            "✅ BOOTSTRAP: Roster runtime built"
        );

        Ok(Self {
            config_manager,
            fetch,
            statistics,
            registry,
            dispatcher,
            activity_store: collaborators.activity_store,
            background: CancellationToken::new(),
            initialized: AtomicBool::new(false),
        })
    }

    /// Load core commands, schedule lazy ones and start cache and admission
    /// maintenance
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let services = Services {
            member_fetch: Some(Arc::clone(&self.fetch)),
            activity_store: Some(Arc::clone(&self.activity_store)),
            statistics: Some(Arc::clone(&self.statistics)),
            catalog: Vec::new(),
        };
        if let Err(e) = self.registry.initialize(services).await {
            log_error("bootstrap", "initialize", &e.to_string(), None);
            self.initialized.store(false, Ordering::Release);
            return Err(e);
        }

        let sweep_interval = self.config().cache.sweep_interval();
        self.fetch
            .snapshot_cache()
            .spawn_sweeper(sweep_interval, self.background.child_token());
        self.dispatcher
            .spawn_maintenance(sweep_interval, self.background.child_token());
        info!("🚀 BOOTSTRAP: Roster runtime initialized");
        Ok(())
    }

    pub async fn dispatch(&self, request: InboundRequest) -> ExecutionResult {
        self.dispatcher.dispatch(request).await
    }

    /// Statistics plus registry, breaker and fetch-attempt state
    pub fn analytics(&self) -> AnalyticsSnapshot {
        let mut snapshot = self
            .statistics
            .analytics(self.config().registry.slow_execution_ms);
        snapshot.registry = Some(self.registry.stats());
        snapshot.circuit_breaker = Some(self.fetch.breaker().metrics());
        snapshot.recent_fetch_attempts = self.fetch.recent_attempts();
        snapshot
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            environment: self.config_manager.environment().to_string(),
            initialized: self.registry.is_initialized(),
            shutting_down: self.background.is_cancelled(),
            breaker_healthy: self.fetch.breaker().is_healthy(),
            dispatcher: self.dispatcher.stats(),
        }
    }

    /// Cancel in-flight work and stop background tasks
    pub fn shutdown(&self) {
        if self.background.is_cancelled() {
            warn!("Roster runtime already shut down");
            return;
        }
        self.dispatcher.shutdown();
        self.registry.shutdown();
        self.background.cancel();
        info!("🛑 Roster runtime shut down");
    }

    pub fn config(&self) -> &RosterConfig {
        self.config_manager.config()
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn fetch_strategy(&self) -> &Arc<ResilientFetchStrategy> {
        &self.fetch
    }

    pub fn statistics(&self) -> &Arc<StatisticsStore> {
        &self.statistics
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
