//! # Command Registry
//!
//! Resolves command names and aliases to handlers and owns their loading
//! lifecycle. Core handlers load eagerly during initialization and any
//! failure aborts startup. Lazy handlers load in the background after a
//! short delay or on first use, whichever comes first, and a failure only
//! affects that command.
//!
//! Each descriptor owns a `tokio::sync::OnceCell`, so concurrent first uses
//! of the same command construct exactly one handler instance. A failed load
//! leaves the cell empty and the next lookup retries.

use crate::config::RegistryConfig;
use crate::error::{Result, RosterError};
use crate::logging::log_registry_operation;
use crate::registry::{Command, CommandCategory, CommandDescriptor, CommandMetadata, Services};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
struct RegistryEntry {
    descriptor: CommandDescriptor,
    loaded: OnceCell<Arc<Command>>,
    enabled: Arc<AtomicBool>,
}

/// Load and execution counters for one command
#[derive(Debug, Clone, Serialize)]
pub struct CommandLoadMetrics {
    pub name: String,
    pub category: CommandCategory,
    pub load_time_ms: Option<u64>,
    pub load_failures: u64,
    pub last_load_error: Option<String>,
    pub executions: u64,
    pub execution_failures: u64,
    pub slow_executions: u64,
    pub total_execution_ms: u64,
}

impl CommandLoadMetrics {
    fn new(name: &str, category: CommandCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            load_time_ms: None,
            load_failures: 0,
            last_load_error: None,
            executions: 0,
            execution_failures: 0,
            slow_executions: 0,
            total_execution_ms: 0,
        }
    }

    pub fn average_execution_ms(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.total_execution_ms as f64 / self.executions as f64
    }
}

/// Registry statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_commands: usize,
    pub core_commands: usize,
    pub lazy_commands: usize,
    pub loaded_commands: usize,
    pub disabled_commands: usize,
    pub load_failures: u64,
    pub slow_loads: usize,
    pub total_executions: u64,
}

#[derive(Debug)]
pub struct CommandRegistry {
    config: RegistryConfig,
    entries: HashMap<String, RegistryEntry>,
    /// lowercase alias -> canonical name
    aliases: HashMap<String, String>,
    services: RwLock<Option<Arc<Services>>>,
    metrics: DashMap<String, CommandLoadMetrics>,
    initialized: AtomicBool,
    lazy_loader: Mutex<Option<JoinHandle<()>>>,
}

impl CommandRegistry {
    /// Build a registry from descriptors. Names and aliases must be unique
    /// across the whole catalog (case-insensitive).
    pub fn new(descriptors: Vec<CommandDescriptor>, config: RegistryConfig) -> Result<Self> {
        let mut entries = HashMap::new();
        let mut aliases: HashMap<String, String> = HashMap::new();
        let metrics = DashMap::new();

        for descriptor in descriptors {
            let name = descriptor.name().to_lowercase();
            if entries.contains_key(&name) || aliases.contains_key(&name) {
                return Err(RosterError::Registry(format!(
                    "duplicate command name: {name}"
                )));
            }
            for alias in &descriptor.metadata.aliases {
                let alias = alias.to_lowercase();
                if alias == name || entries.contains_key(&alias) || aliases.contains_key(&alias) {
                    return Err(RosterError::Registry(format!(
                        "alias {alias} of {name} conflicts with an existing command"
                    )));
                }
                aliases.insert(alias, name.clone());
            }

            metrics.insert(
                name.clone(),
                CommandLoadMetrics::new(&name, descriptor.category),
            );
            entries.insert(
                name,
                RegistryEntry {
                    descriptor,
                    loaded: OnceCell::new(),
                    enabled: Arc::new(AtomicBool::new(true)),
                },
            );
        }

        let registry = Self {
            config,
            entries,
            aliases,
            services: RwLock::new(None),
            metrics,
            initialized: AtomicBool::new(false),
            lazy_loader: Mutex::new(None),
        };

        for name in &registry.config.disabled_commands {
            if registry.disable(name).is_err() {
                warn!(command = %name, "Configured disabled command is not registered");
            }
        }

        log_registry_operation(
            "metadata_loaded",
            None,
            "success",
            None,
            Some(&format!("{} commands", registry.entries.len())),
        );
        Ok(registry)
    }

    /// Canonical name for a command name or alias
    pub fn resolve(&self, name_or_alias: &str) -> Option<&str> {
        let key = name_or_alias.trim().to_lowercase();
        if let Some((name, _)) = self.entries.get_key_value(&key) {
            return Some(name.as_str());
        }
        self.aliases.get(&key).map(String::as_str)
    }

    pub fn contains(&self, name_or_alias: &str) -> bool {
        self.resolve(name_or_alias).is_some()
    }

    /// Metadata for every registered command, sorted by name
    pub fn catalog(&self) -> Vec<CommandMetadata> {
        let mut catalog: Vec<CommandMetadata> = self
            .entries
            .values()
            .map(|e| e.descriptor.metadata.clone())
            .collect();
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        catalog
    }

    pub fn metadata(&self, name_or_alias: &str) -> Option<&CommandMetadata> {
        let name = self.resolve(name_or_alias)?;
        self.entries.get(name).map(|e| &e.descriptor.metadata)
    }

    /// Load every core handler and schedule the lazy ones.
    ///
    /// Fails if any core handler cannot be constructed. Calling it again
    /// after a successful initialization is a no-op.
    pub async fn initialize(self: &Arc<Self>, mut services: Services) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            debug!("Command registry already initialized");
            return Ok(());
        }

        let start = Instant::now();
        if services.catalog.is_empty() {
            services.catalog = self.catalog();
        }
        *self.services.write() = Some(Arc::new(services));

        let mut core_names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| e.descriptor.category == CommandCategory::Core)
            .map(|(name, _)| name.as_str())
            .collect();
        core_names.sort_unstable();

        for name in &core_names {
            if let Err(e) = self.load(name).await {
                error!(command = %name, error = %e, "🚨 Core command failed to load");
                log_registry_operation("initialize", Some(name), "failed", None, Some(&e.to_string()));
                return Err(RosterError::Registry(format!(
                    "core command {name} failed to load: {e}"
                )));
            }
        }

        self.initialized.store(true, Ordering::Release);
        self.schedule_lazy_loading();

        info!(
            core_loaded = core_names.len(),
            lazy_pending = self.entries.len() - core_names.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "✅ Command registry initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn schedule_lazy_loading(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        let delay = self.config.lazy_load_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let loaded = registry.load_lazy_commands().await;
            debug!(loaded = loaded, "Background lazy loading finished");
        });
        if let Some(previous) = self.lazy_loader.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Load every lazy handler that is not loaded yet. Failures are logged
    /// and isolated. Returns how many handlers are loaded afterwards.
    pub async fn load_lazy_commands(&self) -> usize {
        let mut lazy_names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| e.descriptor.category == CommandCategory::Lazy)
            .map(|(name, _)| name.as_str())
            .collect();
        lazy_names.sort_unstable();

        let mut loaded = 0;
        for name in lazy_names {
            match self.load(name).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!(command = %name, error = %e, "Lazy command failed to load"),
            }
        }
        loaded
    }

    /// Loaded command for a name or alias, loading it on first use.
    ///
    /// Returns `None` for unknown names and for handlers that fail to load.
    pub async fn get_command(&self, name_or_alias: &str) -> Option<Arc<Command>> {
        let name = self.resolve(name_or_alias)?;
        match self.load(name).await {
            Ok(command) => Some(command),
            Err(e) => {
                warn!(command = %name, error = %e, "Command unavailable");
                None
            }
        }
    }

    /// Load a handler exactly once
    pub async fn load(&self, name_or_alias: &str) -> Result<Arc<Command>> {
        let name = self
            .resolve(name_or_alias)
            .ok_or_else(|| RosterError::CommandNotFound(name_or_alias.to_string()))?;
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RosterError::CommandNotFound(name.to_string()))?;

        if let Some(command) = entry.loaded.get() {
            return Ok(Arc::clone(command));
        }

        let services = self
            .services
            .read()
            .clone()
            .ok_or_else(|| RosterError::Registry("registry is not initialized".to_string()))?;

        entry
            .loaded
            .get_or_try_init(|| async { self.construct(entry, &services) })
            .await
            .map(Arc::clone)
    }

    fn construct(&self, entry: &RegistryEntry, services: &Services) -> Result<Arc<Command>> {
        let descriptor = &entry.descriptor;
        let name = descriptor.name();

        let missing = descriptor.missing_dependencies(services);
        if !missing.is_empty() {
            let err = RosterError::Registry(format!(
                "{name} is missing services: {missing:?}"
            ));
            self.record_load_failure(name, &err);
            return Err(err);
        }

        let start = Instant::now();
        let handler = match (descriptor.constructor)(services) {
            Ok(handler) => handler,
            Err(e) => {
                self.record_load_failure(name, &e);
                return Err(e);
            }
        };
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        if let Some(mut metrics) = self.metrics.get_mut(name) {
            metrics.load_time_ms = Some(elapsed_ms);
        }
        if elapsed > Duration::from_millis(self.config.slow_load_ms) {
            warn!(command = %name, load_time_ms = elapsed_ms, "🐢 Slow command load");
        }
        log_registry_operation("load", Some(name), "success", Some(elapsed_ms), None);

        Ok(Arc::new(Command::with_enabled_flag(
            descriptor.metadata.clone(),
            handler,
            Arc::clone(&entry.enabled),
        )))
    }

    fn record_load_failure(&self, name: &str, err: &RosterError) {
        if let Some(mut metrics) = self.metrics.get_mut(name) {
            metrics.load_failures += 1;
            metrics.last_load_error = Some(err.to_string());
        }
        log_registry_operation("load", Some(name), "failed", None, Some(&err.to_string()));
    }

    pub fn is_loaded(&self, name_or_alias: &str) -> bool {
        self.resolve(name_or_alias)
            .and_then(|name| self.entries.get(name))
            .is_some_and(|e| e.loaded.initialized())
    }

    /// Record one execution outcome and flag slow executions
    pub fn record_execution(&self, name: &str, duration: Duration, success: bool) {
        let Some(name) = self.resolve(name) else {
            return;
        };
        let duration_ms = duration.as_millis() as u64;
        let slow = duration_ms > self.config.slow_execution_ms;

        if let Some(mut metrics) = self.metrics.get_mut(name) {
            metrics.executions += 1;
            metrics.total_execution_ms += duration_ms;
            if !success {
                metrics.execution_failures += 1;
            }
            if slow {
                metrics.slow_executions += 1;
            }
        }
        if slow {
            warn!(command = %name, duration_ms = duration_ms, "🐢 Slow command execution");
        }
    }

    pub fn disable(&self, name_or_alias: &str) -> Result<()> {
        self.set_enabled(name_or_alias, false)
    }

    pub fn enable(&self, name_or_alias: &str) -> Result<()> {
        self.set_enabled(name_or_alias, true)
    }

    fn set_enabled(&self, name_or_alias: &str, enabled: bool) -> Result<()> {
        let name = self
            .resolve(name_or_alias)
            .ok_or_else(|| RosterError::CommandNotFound(name_or_alias.to_string()))?;
        if let Some(entry) = self.entries.get(name) {
            entry.enabled.store(enabled, Ordering::Release);
        }
        log_registry_operation(
            if enabled { "enable" } else { "disable" },
            Some(name),
            "success",
            None,
            None,
        );
        Ok(())
    }

    pub fn is_enabled(&self, name_or_alias: &str) -> bool {
        self.resolve(name_or_alias)
            .and_then(|name| self.entries.get(name))
            .is_some_and(|e| e.enabled.load(Ordering::Acquire))
    }

    pub fn command_metrics(&self, name_or_alias: &str) -> Option<CommandLoadMetrics> {
        let name = self.resolve(name_or_alias)?;
        self.metrics.get(name).map(|m| m.value().clone())
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_commands: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            match entry.descriptor.category {
                CommandCategory::Core => stats.core_commands += 1,
                CommandCategory::Lazy => stats.lazy_commands += 1,
            }
            if entry.loaded.initialized() {
                stats.loaded_commands += 1;
            }
            if !entry.enabled.load(Ordering::Acquire) {
                stats.disabled_commands += 1;
            }
        }
        for metrics in self.metrics.iter() {
            stats.load_failures += metrics.load_failures;
            stats.total_executions += metrics.executions;
            if metrics
                .load_time_ms
                .is_some_and(|ms| ms > self.config.slow_load_ms)
            {
                stats.slow_loads += 1;
            }
        }
        stats
    }

    /// Stop the background lazy loader if it is still pending
    pub fn shutdown(&self) {
        if let Some(handle) = self.lazy_loader.lock().take() {
            handle.abort();
        }
    }
}
