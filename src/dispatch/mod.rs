//! # Dispatch
//!
//! Entry point for inbound command requests.

pub mod dispatcher;

pub use dispatcher::{
    normalize_command_name, Dispatcher, DispatcherStats, InboundRequest, UNKNOWN_COMMAND,
};
