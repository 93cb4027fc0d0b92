//! # Built-in Commands
//!
//! Handlers shipped with the core. Each module exposes its handler type and a
//! `descriptor()` the registry loads from.
//!
//! | Command           | Category | Aliases               |
//! |-------------------|----------|-----------------------|
//! | `ping`            | core     |                       |
//! | `activity-report` | core     | `report`, `inactive`  |
//! | `stats`           | lazy     | `statistics`          |
//! | `help`            | lazy     | `commands`            |

pub mod activity;
pub mod help;
pub mod ping;
pub mod stats;

pub use activity::{classify_activity, ActivityBuckets, ActivityReportHandler, ActivityStore};
pub use help::HelpHandler;
pub use ping::PingHandler;
pub use stats::StatsHandler;

use crate::registry::CommandDescriptor;

/// Descriptors for every built-in command
pub fn builtin_catalog() -> Vec<CommandDescriptor> {
    vec![
        ping::descriptor(),
        activity::descriptor(),
        stats::descriptor(),
        help::descriptor(),
    ]
}
