//! Inactivity report: which members of a community have not been seen
//! within a threshold.

use crate::constants::permissions::MANAGE_MEMBERS;
use crate::error::{Result, RosterError};
use crate::fetch::{FetchRequest, MemberId, MemberRecord, ResilientFetchStrategy};
use crate::pipeline::{ArgsExt, CommandArgs, CommandOutput, ExecutionContext};
use crate::registry::{
    CommandDescriptor, CommandHandler, CommandMetadata, ServiceDependency, Services,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

const DEFAULT_THRESHOLD_DAYS: u64 = 30;
const MAX_THRESHOLD_DAYS: u64 = 365;
const MAX_LISTED: usize = 50;

/// Persistent record of when members were last active
#[async_trait]
pub trait ActivityStore: Send + Sync + Debug {
    async fn last_seen(
        &self,
        scope_id: &str,
        members: &[MemberId],
    ) -> Result<HashMap<MemberId, DateTime<Utc>>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBuckets {
    pub active: Vec<MemberId>,
    pub inactive: Vec<MemberId>,
    /// No recorded activity at all
    pub never_seen: Vec<MemberId>,
}

impl ActivityBuckets {
    pub fn total(&self) -> usize {
        self.active.len() + self.inactive.len() + self.never_seen.len()
    }
}

/// Bucket members by last activity relative to `now - threshold`.
///
/// Members who joined after the cutoff and were never seen count as active.
pub fn classify_activity(
    members: &[MemberRecord],
    last_seen: &HashMap<MemberId, DateTime<Utc>>,
    threshold: Duration,
    now: DateTime<Utc>,
) -> ActivityBuckets {
    let cutoff = now - threshold;
    let mut buckets = ActivityBuckets::default();

    for member in members {
        match last_seen.get(&member.id) {
            Some(seen) if *seen >= cutoff => buckets.active.push(member.id.clone()),
            Some(_) => buckets.inactive.push(member.id.clone()),
            None if member.joined_at.is_some_and(|joined| joined >= cutoff) => {
                buckets.active.push(member.id.clone())
            }
            None => buckets.never_seen.push(member.id.clone()),
        }
    }
    buckets
}

#[derive(Debug)]
pub struct ActivityReportHandler {
    fetch: Arc<ResilientFetchStrategy>,
    store: Arc<dyn ActivityStore>,
}

impl ActivityReportHandler {
    pub fn new(fetch: Arc<ResilientFetchStrategy>, store: Arc<dyn ActivityStore>) -> Self {
        Self { fetch, store }
    }
}

struct ReportOptions {
    days: u64,
    role: Option<String>,
    include_bots: bool,
}

impl ReportOptions {
    fn from_args(args: &CommandArgs) -> Self {
        Self {
            days: args
                .u64_arg("days")
                .unwrap_or(DEFAULT_THRESHOLD_DAYS)
                .clamp(1, MAX_THRESHOLD_DAYS),
            role: args.str_arg("role").map(str::to_string),
            include_bots: args.bool_arg("include_bots").unwrap_or(false),
        }
    }
}

#[async_trait]
impl CommandHandler for ActivityReportHandler {
    async fn execute(&self, ctx: &ExecutionContext, args: &CommandArgs) -> Result<CommandOutput> {
        let scope_id = ctx.scope_id.as_deref().ok_or_else(|| {
            RosterError::PermissionDenied("activity reports need a community".to_string())
        })?;
        let options = ReportOptions::from_args(args);

        let role = options.role.clone();
        let include_bots = options.include_bots;
        let request = FetchRequest::new(scope_id)
            .with_cancellation(ctx.cancellation.clone())
            .with_filter(move |member| {
                (include_bots || !member.bot)
                    && role.as_deref().map_or(true, |r| member.has_role(r))
            });

        let fetched = self.fetch.fetch_members(request).await?;
        let ids: Vec<MemberId> = fetched.members.iter().map(|m| m.id.clone()).collect();
        let last_seen = self.store.last_seen(scope_id, &ids).await?;

        let buckets = classify_activity(
            &fetched.members,
            &last_seen,
            Duration::days(options.days as i64),
            Utc::now(),
        );

        let not_active = buckets.inactive.len() + buckets.never_seen.len();
        let mut message = format!(
            "{not_active} of {} members inactive for {}+ days",
            buckets.total(),
            options.days
        );
        if fetched.metadata.stale {
            message.push_str(" (from cached member list)");
        } else if !fetched.metadata.complete {
            message.push_str(" (partial member list)");
        }

        let listed: Vec<&MemberId> = buckets
            .inactive
            .iter()
            .chain(buckets.never_seen.iter())
            .take(MAX_LISTED)
            .collect();

        Ok(CommandOutput::message(message).with_data(json!({
            "scopeId": scope_id,
            "thresholdDays": options.days,
            "role": options.role,
            "totalMembers": buckets.total(),
            "activeCount": buckets.active.len(),
            "inactiveCount": buckets.inactive.len(),
            "neverSeenCount": buckets.never_seen.len(),
            "inactiveMembers": listed,
            "metadata": fetched.metadata,
        })))
    }

    fn cache_key(&self, ctx: &ExecutionContext, args: &CommandArgs) -> Option<String> {
        let scope_id = ctx.scope_id.as_deref()?;
        let options = ReportOptions::from_args(args);
        Some(format!(
            "{scope_id}:{}:{}:{}",
            options.days,
            options.role.unwrap_or_default(),
            options.include_bots
        ))
    }
}

fn construct(services: &Services) -> Result<Arc<dyn CommandHandler>> {
    let fetch = services
        .member_fetch
        .clone()
        .ok_or_else(|| RosterError::Registry("member fetch service missing".to_string()))?;
    let store = services
        .activity_store
        .clone()
        .ok_or_else(|| RosterError::Registry("activity store missing".to_string()))?;
    Ok(Arc::new(ActivityReportHandler::new(fetch, store)))
}

pub fn descriptor() -> CommandDescriptor {
    CommandDescriptor::core(
        CommandMetadata::new(
            "activity-report",
            "List members with no recorded activity in the last N days",
        )
        .with_aliases(&["report", "inactive"])
        .with_permissions(&[MANAGE_MEMBERS])
        .with_cooldown(30)
        .scope_only(),
        construct,
    )
    .depends_on(&[ServiceDependency::MemberFetch, ServiceDependency::ActivityStore])
}
