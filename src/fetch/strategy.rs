//! # Resilient Member Fetch
//!
//! Acquires the member list of a scope through an ordered fallback chain:
//!
//! 1. **cache**: a fresh snapshot covering at least the sufficiency ratio of
//!    the known total is returned without any network call
//! 2. **full**: complete listing through the circuit breaker under the full
//!    timeout; success replaces the snapshot
//! 3. **partial**: capped listing through the breaker under the shorter
//!    timeout
//! 4. **stale_cache**: whatever snapshot is still retained, flagged stale
//!
//! Only when every tier fails and nothing is retained does the fetch fail
//! with `FetchUnavailable`. Each call runs inside its own
//! [`ResourceManager`], so timers and the cancellation token are released on
//! every exit path.

use crate::cache::TtlCache;
use crate::config::FetchConfig;
use crate::constants::fetch::UNAVAILABLE_GUIDANCE;
use crate::error::{Result, RosterError};
use crate::fetch::filter::filter_in_batches;
use crate::fetch::progress::ProgressReporter;
use crate::fetch::{
    AttemptOutcome, FetchAttempt, FetchError, FetchMetadata, FetchResult, FetchStage, FetchTier,
    MemberCollection, MemberFetcher, MemberId, MemberRecord, MemberSnapshot, ProgressCallback,
};
use crate::logging::log_fetch_attempt;
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use crate::resources::ResourceManager;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type MemberPredicate = Arc<dyn Fn(&MemberRecord) -> bool + Send + Sync>;

/// One member-list request
#[derive(Clone)]
pub struct FetchRequest {
    pub scope_id: String,
    /// Known member total; asked from the fetcher when absent
    pub expected_total: Option<usize>,
    pub filter: Option<MemberPredicate>,
    pub progress: Option<ProgressCallback>,
    /// Parent token, usually the calling command's
    pub cancellation: Option<CancellationToken>,
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("scope_id", &self.scope_id)
            .field("expected_total", &self.expected_total)
            .field("filtered", &self.filter.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl FetchRequest {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            expected_total: None,
            filter: None,
            progress: None,
            cancellation: None,
        }
    }

    pub fn with_expected_total(mut self, total: usize) -> Self {
        self.expected_total = Some(total);
        self
    }

    pub fn with_filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&MemberRecord) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Members acquired by one tier, before filtering
struct Acquired {
    members: Arc<MemberCollection>,
    tier: FetchTier,
    cache_hit: bool,
    stale: bool,
    complete: bool,
    snapshot_age: Option<Duration>,
}

#[derive(Debug)]
pub struct ResilientFetchStrategy {
    fetcher: Arc<dyn MemberFetcher>,
    breaker: Arc<CircuitBreaker>,
    snapshots: Arc<TtlCache<String, MemberSnapshot>>,
    config: FetchConfig,
    resource_lifetime: Duration,
    recent_attempts: Mutex<VecDeque<FetchAttempt>>,
}

impl ResilientFetchStrategy {
    pub fn new(
        fetcher: Arc<dyn MemberFetcher>,
        breaker: Arc<CircuitBreaker>,
        config: FetchConfig,
        resource_lifetime: Duration,
    ) -> Self {
        // snapshots are retained past freshness for the stale tier
        let snapshots = Arc::new(TtlCache::new("member_snapshots", config.stale_retention()));
        Self {
            fetcher,
            breaker,
            snapshots,
            config,
            resource_lifetime,
            recent_attempts: Mutex::new(VecDeque::new()),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn snapshot_cache(&self) -> &Arc<TtlCache<String, MemberSnapshot>> {
        &self.snapshots
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Store a snapshot directly, e.g. from a gateway member chunk
    pub fn store_snapshot(&self, scope_id: &str, members: MemberCollection, complete: bool) {
        self.snapshots
            .insert(scope_id.to_string(), MemberSnapshot::new(members, complete));
    }

    /// Forget the cached snapshot for a scope
    pub fn invalidate(&self, scope_id: &str) -> bool {
        self.snapshots.remove(&scope_id.to_string()).is_some()
    }

    /// Most recent tier attempts across all scopes, oldest first
    pub fn recent_attempts(&self) -> Vec<FetchAttempt> {
        self.recent_attempts.lock().iter().cloned().collect()
    }

    pub async fn fetch_members(&self, request: FetchRequest) -> Result<FetchResult> {
        let name = format!("member_fetch:{}", request.scope_id);
        let resources = match &request.cancellation {
            Some(parent) => ResourceManager::with_parent(name, parent, self.resource_lifetime),
            None => ResourceManager::new(name, self.resource_lifetime),
        };

        let reporter = ProgressReporter::new(&request.scope_id, request.progress.clone());
        reporter.stage(FetchStage::Initializing, None);
        if reporter.is_active() {
            let heartbeat = reporter.clone();
            resources.add_interval(self.config.progress_interval(), move || heartbeat.heartbeat())?;
        }

        let outcome = resources
            .scope(self.fetch_within(&request, &resources, &reporter))
            .await;

        match &outcome {
            Ok(result) => {
                reporter.stage(FetchStage::Completed, Some(result.metadata.strategy));
                info!(
                    scope_id = %request.scope_id,
                    strategy = %result.metadata.strategy,
                    cache_hit = result.metadata.cache_hit,
                    stale = result.metadata.stale,
                    members = result.metadata.member_count,
                    duration_ms = result.metadata.fetch_duration_ms,
                    "📡 Member fetch completed"
                );
            }
            Err(e) => {
                reporter.stage(FetchStage::Failed, None);
                warn!(scope_id = %request.scope_id, error = %e, "📡 Member fetch failed");
            }
        }
        outcome
    }

    async fn fetch_within(
        &self,
        request: &FetchRequest,
        resources: &ResourceManager,
        reporter: &ProgressReporter,
    ) -> Result<FetchResult> {
        let start = Instant::now();
        let scope_id = request.scope_id.as_str();
        let token = resources.signal();
        let mut attempts = Vec::new();

        let expected_total = match request.expected_total {
            Some(total) => Some(total),
            None => self.lookup_member_count(scope_id, &token).await?,
        };

        let acquired = match self.sufficient_snapshot(scope_id, expected_total, &mut attempts) {
            Some(acquired) => acquired,
            None => {
                self.fetch_from_network(scope_id, &token, reporter, &mut attempts)
                    .await?
            }
        };
        resources.check()?;

        let acquired_count = acquired.members.len();
        let mut members: Vec<MemberRecord> = acquired.members.values().cloned().collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));

        if let Some(predicate) = &request.filter {
            reporter.filtering(0, acquired_count);
            members = filter_in_batches(
                members,
                |m| predicate(m),
                self.config.filter_batch_size,
                &token,
                |processed| reporter.filtering(processed, acquired_count),
            )
            .await?;
        }

        let metadata = FetchMetadata {
            strategy: acquired.tier,
            cache_hit: acquired.cache_hit,
            stale: acquired.stale,
            complete: acquired.complete,
            fetch_duration_ms: start.elapsed().as_millis() as u64,
            member_count: acquired_count,
            returned_count: members.len(),
            expected_total,
            snapshot_age_ms: acquired.snapshot_age.map(|age| age.as_millis() as u64),
            attempts,
        };

        Ok(FetchResult { members, metadata })
    }

    /// Ask the fetcher for the scope's total without listing it.
    ///
    /// Skipped unless the breaker is closed, bounded by the partial timeout,
    /// and raced against cancellation. Any failure means an unknown total; it
    /// is not recorded against the breaker, whose state tracks the listing
    /// tiers.
    async fn lookup_member_count(
        &self,
        scope_id: &str,
        token: &CancellationToken,
    ) -> Result<Option<usize>> {
        if self.breaker.state() != CircuitState::Closed {
            debug!(scope_id = %scope_id, "Circuit not closed, skipping member count");
            return Ok(None);
        }

        let timeout = self.config.partial_timeout();
        let counted = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(RosterError::Cancelled(format!("member count for {scope_id}")));
            }
            counted = tokio::time::timeout(timeout, self.fetcher.member_count(scope_id)) => counted,
        };

        match counted {
            Ok(Ok(total)) => Ok(total),
            Ok(Err(e)) => {
                debug!(scope_id = %scope_id, error = %e, "Member count unavailable");
                Ok(None)
            }
            Err(_) => {
                warn!(
                    scope_id = %scope_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Member count timed out"
                );
                Ok(None)
            }
        }
    }

    /// Tier 1. A fresh snapshot is sufficient when it covers the ratio of a
    /// known total, or when the total is unknown and the snapshot is complete.
    fn sufficient_snapshot(
        &self,
        scope_id: &str,
        expected_total: Option<usize>,
        attempts: &mut Vec<FetchAttempt>,
    ) -> Option<Acquired> {
        let Some(entry) = self.snapshots.get_entry(&scope_id.to_string()) else {
            self.record_attempt(
                attempts,
                FetchAttempt::new(scope_id, FetchTier::Cache, AttemptOutcome::Miss),
            );
            return None;
        };

        let age = entry.age();
        let snapshot = entry.value;
        let fresh = age <= self.config.fresh_ttl();
        let covered = match expected_total {
            Some(0) => true,
            Some(total) => snapshot.len() as f64 >= total as f64 * self.config.sufficiency_ratio,
            None => snapshot.complete,
        };

        if fresh && covered {
            self.record_attempt(
                attempts,
                FetchAttempt::new(scope_id, FetchTier::Cache, AttemptOutcome::Success)
                    .with_count(snapshot.len()),
            );
            return Some(Acquired {
                members: snapshot.members,
                tier: FetchTier::Cache,
                cache_hit: true,
                stale: false,
                complete: snapshot.complete,
                snapshot_age: Some(age),
            });
        }

        let reason = if fresh { "below sufficiency ratio" } else { "snapshot too old" };
        self.record_attempt(
            attempts,
            FetchAttempt::new(scope_id, FetchTier::Cache, AttemptOutcome::Insufficient)
                .with_count(snapshot.len())
                .with_error(reason),
        );
        None
    }

    /// Tiers 2 to 4
    async fn fetch_from_network(
        &self,
        scope_id: &str,
        token: &CancellationToken,
        reporter: &ProgressReporter,
        attempts: &mut Vec<FetchAttempt>,
    ) -> Result<Acquired> {
        reporter.stage(FetchStage::Fetching, Some(FetchTier::Full));
        let full_timeout = self.config.full_timeout();
        if let Some(members) = self
            .guarded_fetch(FetchTier::Full, scope_id, None, full_timeout, token, attempts)
            .await?
        {
            let snapshot = MemberSnapshot::new(members, true);
            self.snapshots.insert(scope_id.to_string(), snapshot.clone());
            return Ok(Acquired {
                members: snapshot.members,
                tier: FetchTier::Full,
                cache_hit: false,
                stale: false,
                complete: true,
                snapshot_age: None,
            });
        }

        reporter.stage(FetchStage::Fetching, Some(FetchTier::Partial));
        let limit = Some(self.config.partial_limit);
        let partial_timeout = self.config.partial_timeout();
        if let Some(members) = self
            .guarded_fetch(FetchTier::Partial, scope_id, limit, partial_timeout, token, attempts)
            .await?
        {
            let snapshot = MemberSnapshot::new(members, false);
            // never replace a retained snapshot with a partial one
            if !self.snapshots.contains_key(&scope_id.to_string()) {
                self.snapshots.insert(scope_id.to_string(), snapshot.clone());
            }
            return Ok(Acquired {
                members: snapshot.members,
                tier: FetchTier::Partial,
                cache_hit: false,
                stale: false,
                complete: false,
                snapshot_age: None,
            });
        }

        if let Some(entry) = self.snapshots.get_entry(&scope_id.to_string()) {
            let age = entry.age();
            let snapshot = entry.value;
            self.record_attempt(
                attempts,
                FetchAttempt::new(scope_id, FetchTier::StaleCache, AttemptOutcome::Success)
                    .with_count(snapshot.len()),
            );
            warn!(
                scope_id = %scope_id,
                age_ms = age.as_millis() as u64,
                members = snapshot.len(),
                "Serving stale member snapshot"
            );
            return Ok(Acquired {
                members: snapshot.members,
                tier: FetchTier::StaleCache,
                cache_hit: true,
                stale: true,
                complete: snapshot.complete,
                snapshot_age: Some(age),
            });
        }

        self.record_attempt(
            attempts,
            FetchAttempt::new(scope_id, FetchTier::StaleCache, AttemptOutcome::Miss),
        );
        Err(RosterError::FetchUnavailable {
            scope_id: scope_id.to_string(),
            guidance: UNAVAILABLE_GUIDANCE.to_string(),
        })
    }

    /// One network tier through the breaker and a timeout.
    ///
    /// `Ok(None)` means the tier failed and the chain should continue;
    /// `Err` is returned only on cancellation.
    async fn guarded_fetch(
        &self,
        tier: FetchTier,
        scope_id: &str,
        limit: Option<usize>,
        timeout: Duration,
        token: &CancellationToken,
        attempts: &mut Vec<FetchAttempt>,
    ) -> Result<Option<MemberCollection>> {
        let started_at = Utc::now();
        let start = Instant::now();
        let timeout_ms = timeout.as_millis() as u64;

        let fetcher = &self.fetcher;
        let guarded = self.breaker.call(move || async move {
            match tokio::time::timeout(timeout, fetcher.fetch_all(scope_id, limit)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout { timeout_ms }),
            }
        });

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(RosterError::Cancelled(format!("member fetch for {scope_id}")));
            }
            outcome = guarded => outcome,
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(mut members) => {
                if let Some(limit) = limit {
                    members = truncate_by_id(members, limit);
                }
                self.record_attempt(
                    attempts,
                    FetchAttempt::new(scope_id, tier, AttemptOutcome::Success)
                        .started_at(started_at, elapsed)
                        .with_count(members.len()),
                );
                Ok(Some(members))
            }
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                debug!(scope_id = %scope_id, tier = %tier, "Circuit open, skipping tier");
                self.record_attempt(
                    attempts,
                    FetchAttempt::new(scope_id, tier, AttemptOutcome::CircuitOpen)
                        .started_at(started_at, elapsed)
                        .with_error("circuit open"),
                );
                Ok(None)
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                let outcome = match e {
                    FetchError::Timeout { .. } => AttemptOutcome::TimedOut,
                    _ => AttemptOutcome::Failed,
                };
                warn!(scope_id = %scope_id, tier = %tier, error = %e, "Fetch tier failed");
                self.record_attempt(
                    attempts,
                    FetchAttempt::new(scope_id, tier, outcome)
                        .started_at(started_at, elapsed)
                        .with_error(e.to_string()),
                );
                Ok(None)
            }
        }
    }

    fn record_attempt(&self, attempts: &mut Vec<FetchAttempt>, attempt: FetchAttempt) {
        log_fetch_attempt(
            &attempt.scope_id,
            attempt.tier.as_str(),
            attempt.outcome.as_str(),
            attempt.duration_ms,
            attempt.member_count,
        );

        {
            let mut recent = self.recent_attempts.lock();
            recent.push_back(attempt.clone());
            while recent.len() > self.config.max_recorded_attempts {
                recent.pop_front();
            }
        }
        attempts.push(attempt);
    }
}

/// Keep the `limit` members with the lowest ids
fn truncate_by_id(members: MemberCollection, limit: usize) -> MemberCollection {
    if members.len() <= limit {
        return members;
    }
    let mut records: Vec<(MemberId, MemberRecord)> = members.into_iter().collect();
    records.sort_by(|a, b| a.0.cmp(&b.0));
    records.truncate(limit);
    records.into_iter().collect()
}
