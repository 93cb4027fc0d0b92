#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use roster_core::bootstrap::{RosterCollaborators, RosterRuntime};
use roster_core::config::{ConfigManager, RosterConfig};
use roster_core::fetch::{MemberCollection, MemberRecord};
use roster_core::pipeline::{
    ConcurrencyGate, PipelineDeps, StaticAccessPolicy, StatisticsStore,
};
use std::sync::Arc;

/// `count` members with sortable ids `m00000`, `m00001`, ...
pub fn member_collection(count: usize) -> MemberCollection {
    (0..count)
        .map(|i| {
            let record = MemberRecord::new(format!("m{i:05}"), format!("member {i}"));
            (record.id.clone(), record)
        })
        .collect()
}

/// Pipeline dependencies with a permissive policy and fresh statistics
pub fn pipeline_deps(concurrency_limit: usize) -> PipelineDeps {
    pipeline_deps_with_policy(concurrency_limit, StaticAccessPolicy::new())
}

pub fn pipeline_deps_with_policy(
    concurrency_limit: usize,
    policy: StaticAccessPolicy,
) -> PipelineDeps {
    PipelineDeps {
        access: Arc::new(policy),
        concurrency: ConcurrencyGate::new(concurrency_limit),
        statistics: Arc::new(StatisticsStore::new()),
    }
}

/// Configuration tuned for tests: no startup delay for lazy commands
pub fn test_config() -> RosterConfig {
    let mut config = RosterConfig::default();
    config.registry.lazy_load_delay_ms = 0;
    config
}

pub fn build_runtime(
    config: RosterConfig,
    fetcher: Arc<MockFetcher>,
    store: Arc<MockActivityStore>,
) -> RosterRuntime {
    roster_core::logging::init_structured_logging();
    let manager = ConfigManager::from_config(config).expect("test configuration is valid");
    RosterRuntime::build(manager, RosterCollaborators::new(fetcher, store))
        .expect("runtime builds")
}
