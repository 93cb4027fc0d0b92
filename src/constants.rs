//! # System Constants
//!
//! Default thresholds and limits that define the operational boundaries of the
//! command-execution core. Every value here is a default; the configuration
//! layer can override it.

/// Registry and pipeline timing thresholds
pub mod thresholds {
    /// A single handler load slower than this is logged as a warning
    pub const SLOW_LOAD_MS: u64 = 100;
    /// A single handler execution slower than this is logged as a warning
    pub const SLOW_EXECUTION_MS: u64 = 1_000;
    /// Delay before lazy handlers are loaded in the background
    pub const LAZY_LOAD_DELAY_MS: u64 = 1_000;
}

/// Execution pipeline defaults
pub mod pipeline {
    /// Must exceed the full plus partial fetch timeouts so the fetch chain can finish
    pub const EXECUTION_TIMEOUT_MS: u64 = 60_000;
    pub const MAX_RETRIES: u32 = 2;
    pub const RETRY_BASE_DELAY_MS: u64 = 1_000;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
    pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
    pub const RATE_LIMIT_MAX_CALLS: usize = 10;
    pub const MAX_CONCURRENT_EXECUTIONS: usize = 10;
    pub const RESULT_CACHE_TTL_MS: u64 = 60_000;
}

/// Circuit breaker defaults
pub mod circuit_breaker {
    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const TIMEOUT_MS: u64 = 60_000;
}

/// Resilient fetch defaults
pub mod fetch {
    /// Cached snapshot must cover this share of the known total to skip the network
    pub const CACHE_SUFFICIENCY_RATIO: f64 = 0.8;
    pub const FULL_FETCH_TIMEOUT_MS: u64 = 30_000;
    pub const PARTIAL_FETCH_TIMEOUT_MS: u64 = 10_000;
    pub const PARTIAL_FETCH_LIMIT: usize = 1_000;
    pub const FILTER_BATCH_SIZE: usize = 500;
    /// Snapshots younger than this are eligible for the sufficiency check
    pub const FRESH_TTL_MS: u64 = 5 * 60_000;
    /// Snapshots are retained this long for the stale fallback tier
    pub const STALE_RETENTION_MS: u64 = 60 * 60_000;
    pub const MAX_RECORDED_ATTEMPTS: usize = 100;
    pub const PROGRESS_INTERVAL_MS: u64 = 5_000;
    pub const UNAVAILABLE_GUIDANCE: &str = "every fetch tier failed and no cached member list exists; \
        verify the bot has the member-list intent enabled and permission to view members in this scope";
}

/// Resource manager defaults
pub mod resources {
    pub const MAX_LIFETIME_MS: u64 = 5 * 60_000;
}

/// Cache sweeper defaults
pub mod cache {
    pub const SWEEP_INTERVAL_MS: u64 = 60_000;
}

/// Dispatcher defaults
pub mod dispatcher {
    pub const GLOBAL_RATE_LIMIT_MAX_CALLS: usize = 30;
    pub const COMMAND_PREFIXES: &[char] = &['!', '/'];
}

/// Permission names used by built-in commands
pub mod permissions {
    pub const MANAGE_MEMBERS: &str = "manage_members";
}
