//! # Command Execution Pipeline
//!
//! Admission control, bounded execution and outcome accounting for a single
//! command. The dispatcher builds one [`ExecutionPipeline`] per command and
//! shares the concurrency gate, access policy and statistics store between
//! all of them.

pub mod access;
pub mod admission;
pub mod context;
pub mod execution_pipeline;
pub mod result;
pub mod retry;
pub mod statistics;

pub use access::{AccessDecision, AccessPolicy, StaticAccessPolicy};
pub use admission::{AdmissionPermit, ConcurrencyGate, CooldownTracker, SlidingWindowLimiter};
pub use context::{ArgsExt, CommandArgs, ExecutionContext};
pub use execution_pipeline::{ExecutionPipeline, PipelineDeps};
pub use result::{CommandOutput, ErrorInfo, ExecutionResult, Outcome};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use statistics::{AnalyticsSnapshot, CommandStatistics, StatisticsStore};
