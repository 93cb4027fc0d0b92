//! # Scoped Resources
//!
//! A [`ResourceManager`] owns the cancellation token and every timer created
//! for one long-running operation and releases all of them exactly once.

pub mod resource_manager;

pub use resource_manager::{ResourceManager, ResourceStats, TimerId};
