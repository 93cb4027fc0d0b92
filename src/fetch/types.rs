//! Member records, fetch attempts and result metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    pub id: MemberId,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub bot: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

impl MemberRecord {
    pub fn new(id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
            bot: false,
            joined_at: None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

pub type MemberCollection = HashMap<MemberId, MemberRecord>;

/// Fallback level within the fetch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTier {
    Cache,
    Full,
    Partial,
    StaleCache,
}

impl FetchTier {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchTier::Cache => "cache",
            FetchTier::Full => "full",
            FetchTier::Partial => "partial",
            FetchTier::StaleCache => "stale_cache",
        }
    }
}

impl fmt::Display for FetchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// No snapshot cached for the scope
    Miss,
    /// Snapshot present but too old or too small
    Insufficient,
    TimedOut,
    CircuitOpen,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Miss => "miss",
            AttemptOutcome::Insufficient => "insufficient",
            AttemptOutcome::TimedOut => "timed_out",
            AttemptOutcome::CircuitOpen => "circuit_open",
            AttemptOutcome::Failed => "failed",
        }
    }
}

/// One tier attempt, kept for observability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchAttempt {
    pub scope_id: String,
    pub tier: FetchTier,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    pub member_count: Option<usize>,
    pub error: Option<String>,
}

impl FetchAttempt {
    pub fn new(scope_id: &str, tier: FetchTier, outcome: AttemptOutcome) -> Self {
        Self {
            scope_id: scope_id.to_string(),
            tier,
            started_at: Utc::now(),
            duration_ms: 0,
            outcome,
            member_count: None,
            error: None,
        }
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>, duration: std::time::Duration) -> Self {
        self.started_at = started_at;
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_count(mut self, member_count: usize) -> Self {
        self.member_count = Some(member_count);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetadata {
    /// Tier that produced the members
    pub strategy: FetchTier,
    pub cache_hit: bool,
    /// Served by the stale-cache fallback tier
    pub stale: bool,
    /// The underlying snapshot covers the whole scope
    pub complete: bool,
    pub fetch_duration_ms: u64,
    /// Members acquired before filtering
    pub member_count: usize,
    /// Members left after filtering
    pub returned_count: usize,
    pub expected_total: Option<usize>,
    pub snapshot_age_ms: Option<u64>,
    pub attempts: Vec<FetchAttempt>,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub members: Vec<MemberRecord>,
    pub metadata: FetchMetadata,
}

/// Cached member list for one scope
#[derive(Debug, Clone)]
pub struct MemberSnapshot {
    pub members: Arc<MemberCollection>,
    pub fetched_at: DateTime<Utc>,
    pub complete: bool,
}

impl MemberSnapshot {
    pub fn new(members: MemberCollection, complete: bool) -> Self {
        Self {
            members: Arc::new(members),
            fetched_at: Utc::now(),
            complete,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
