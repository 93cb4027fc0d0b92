use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use roster_core::commands::ActivityStore;
use roster_core::error::Result;
use roster_core::fetch::{FetchError, MemberCollection, MemberFetcher, MemberId, MemberRecord};
use roster_core::pipeline::{CommandArgs, CommandOutput, ExecutionContext};
use roster_core::registry::CommandHandler;
use roster_core::RosterError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scriptable platform member listing.
///
/// Calls without a limit are full fetches, calls with one are partial
/// fetches; each kind has its own delay and failure switch.
#[derive(Debug)]
pub struct MockFetcher {
    members: MemberCollection,
    reported_total: Option<usize>,
    count_delay: Duration,
    full_delay: Duration,
    partial_delay: Duration,
    fail_full: AtomicBool,
    fail_partial: AtomicBool,
    calls: AtomicUsize,
    count_calls: AtomicUsize,
    limits: Mutex<Vec<Option<usize>>>,
}

impl MockFetcher {
    pub fn new(members: MemberCollection) -> Self {
        Self {
            members,
            reported_total: None,
            count_delay: Duration::ZERO,
            full_delay: Duration::ZERO,
            partial_delay: Duration::ZERO,
            fail_full: AtomicBool::new(false),
            fail_partial: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            limits: Mutex::new(Vec::new()),
        }
    }

    pub fn with_members(count: usize) -> Self {
        Self::new(super::member_collection(count))
    }

    /// Answer `member_count` with this total
    pub fn reporting_total(mut self, total: usize) -> Self {
        self.reported_total = Some(total);
        self
    }

    /// Delay before `member_count` answers
    pub fn with_count_delay(mut self, delay: Duration) -> Self {
        self.count_delay = delay;
        self
    }

    pub fn with_full_delay(mut self, delay: Duration) -> Self {
        self.full_delay = delay;
        self
    }

    pub fn with_partial_delay(mut self, delay: Duration) -> Self {
        self.partial_delay = delay;
        self
    }

    pub fn set_full_failing(&self, failing: bool) {
        self.fail_full.store(failing, Ordering::SeqCst);
    }

    pub fn set_partial_failing(&self, failing: bool) {
        self.fail_partial.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.set_full_failing(failing);
        self.set_partial_failing(failing);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls to `member_count`
    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Limit passed on each call, in call order
    pub fn limits(&self) -> Vec<Option<usize>> {
        self.limits.lock().clone()
    }
}

#[async_trait]
impl MemberFetcher for MockFetcher {
    async fn fetch_all(
        &self,
        _scope_id: &str,
        limit: Option<usize>,
    ) -> std::result::Result<MemberCollection, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().push(limit);

        let (delay, failing) = match limit {
            None => (self.full_delay, self.fail_full.load(Ordering::SeqCst)),
            Some(_) => (self.partial_delay, self.fail_partial.load(Ordering::SeqCst)),
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(FetchError::Transport("gateway unavailable".to_string()));
        }

        let mut ids: Vec<&MemberId> = self.members.keys().collect();
        ids.sort();
        let take = limit.unwrap_or(ids.len());
        Ok(ids
            .into_iter()
            .take(take)
            .filter_map(|id| self.members.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn member_count(
        &self,
        _scope_id: &str,
    ) -> std::result::Result<Option<usize>, FetchError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if !self.count_delay.is_zero() {
            tokio::time::sleep(self.count_delay).await;
        }
        Ok(self.reported_total)
    }
}

/// In-memory last-seen timestamps
#[derive(Debug, Default)]
pub struct MockActivityStore {
    seen: Mutex<HashMap<MemberId, DateTime<Utc>>>,
}

impl MockActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, member: impl Into<MemberId>, at: DateTime<Utc>) {
        self.seen.lock().insert(member.into(), at);
    }
}

#[async_trait]
impl ActivityStore for MockActivityStore {
    async fn last_seen(
        &self,
        _scope_id: &str,
        members: &[MemberId],
    ) -> Result<HashMap<MemberId, DateTime<Utc>>> {
        let seen = self.seen.lock();
        Ok(members
            .iter()
            .filter_map(|id| seen.get(id).map(|at| (id.clone(), *at)))
            .collect())
    }
}

/// Handler that counts calls, optionally sleeps, and fails its first
/// `failures` calls
#[derive(Debug, Default)]
pub struct CountingHandler {
    calls: AtomicUsize,
    failures: usize,
    delay: Duration,
    cache_key: Option<String>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn cached_under(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandHandler for CountingHandler {
    async fn execute(&self, _ctx: &ExecutionContext, _args: &CommandArgs) -> Result<CommandOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if call <= self.failures {
            return Err(RosterError::handler(format!("call {call} failed")));
        }
        Ok(CommandOutput::message(format!("call {call}")))
    }

    fn cache_key(&self, _ctx: &ExecutionContext, _args: &CommandArgs) -> Option<String> {
        self.cache_key.clone()
    }
}

/// Member record with the given roles
pub fn member_with_roles(id: &str, roles: &[&str]) -> MemberRecord {
    let mut record = MemberRecord::new(id, id);
    record.roles = roles.iter().map(|r| r.to_string()).collect();
    record
}
