#![allow(clippy::doc_markdown)] // Allow technical terms like TTL, API in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Roster Core
//!
//! Command-execution core for community operator bots.
//!
//! ## Overview
//!
//! Roster Core sits between a chat platform adapter and the bot's command
//! handlers. Every inbound command passes through a uniform execution
//! pipeline (permission checks, per-caller cooldowns and rate limits, a
//! global concurrency cap, a result cache, timeouts and retry with backoff)
//! and every membership lookup goes through a tiered fetch strategy guarded
//! by a circuit breaker, so an overloaded platform API degrades results
//! instead of failing commands.
//!
//! ## Module Organization
//!
//! - [`dispatch`] - Inbound request routing and global throttling
//! - [`pipeline`] - Admission control, execution, retry and statistics
//! - [`registry`] - Command metadata, core/lazy handler loading
//! - [`fetch`] - Resilient tiered member fetching
//! - [`resilience`] - Circuit breaker
//! - [`cache`] - TTL cache with background sweeping
//! - [`resources`] - Scoped timers and cancellation
//! - [`commands`] - Built-in command handlers
//! - [`bootstrap`] - Runtime wiring
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roster_core::{ConfigManager, InboundRequest, RosterCollaborators, RosterRuntime};
//!
//! # async fn example(collaborators: RosterCollaborators) -> roster_core::Result<()> {
//! let runtime = RosterRuntime::build(ConfigManager::load()?, collaborators)?;
//! runtime.initialize().await?;
//!
//! let result = runtime
//!     .dispatch(InboundRequest::new("!report", "caller-1", "guild-1"))
//!     .await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod bootstrap;
pub mod cache;
pub mod commands;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod resilience;
pub mod resources;

pub use bootstrap::{RosterCollaborators, RosterRuntime, RuntimeStatus};
pub use cache::TtlCache;
pub use config::{ConfigManager, RosterConfig};
pub use dispatch::{Dispatcher, InboundRequest};
pub use error::{ErrorKind, Result, RosterError};
pub use fetch::{
    FetchRequest, FetchResult, FetchTier, MemberFetcher, MemberId, MemberRecord,
    ResilientFetchStrategy,
};
pub use pipeline::{
    CommandArgs, CommandOutput, ExecutionContext, ExecutionPipeline, ExecutionResult,
};
pub use registry::{CommandDescriptor, CommandHandler, CommandMetadata, CommandRegistry};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use resources::ResourceManager;
