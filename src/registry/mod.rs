//! # Command Registry
//!
//! Command metadata, the handler contract and the registry that loads
//! handlers on demand.
//!
//! ## Architecture
//!
//! ```text
//! CommandDescriptor (metadata + category + constructor)
//!        │
//!        ▼
//! CommandRegistry ── core: loaded during initialize()
//!                 └─ lazy: loaded after a delay or on first use
//!        │
//!        ▼
//! Command (metadata + Arc<dyn CommandHandler> + enabled flag)
//! ```

pub mod command_registry;
pub mod handler;

pub use command_registry::{CommandLoadMetrics, CommandRegistry, RegistryStats};
pub use handler::{
    Command, CommandCategory, CommandDescriptor, CommandHandler, CommandMetadata,
    HandlerConstructor, ServiceDependency, Services,
};
