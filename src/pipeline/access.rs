//! Authorization of callers against command metadata.

use crate::config::AccessConfig;
use crate::pipeline::ExecutionContext;
use crate::registry::CommandMetadata;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(String),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

/// Decides whether a caller may run a command.
///
/// Implementations are consulted on every request and must not block.
pub trait AccessPolicy: Send + Sync + Debug {
    fn authorize(&self, ctx: &ExecutionContext, metadata: &CommandMetadata) -> AccessDecision;
}

/// Admin list plus per-caller permission grants, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticAccessPolicy {
    admins: HashSet<String>,
    grants: HashMap<String, HashSet<String>>,
}

impl StaticAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            admins: config.admins.clone(),
            grants: config
                .grants
                .iter()
                .map(|(caller, perms)| (caller.clone(), perms.iter().cloned().collect()))
                .collect(),
        }
    }

    pub fn with_admin(mut self, caller_id: impl Into<String>) -> Self {
        self.admins.insert(caller_id.into());
        self
    }

    pub fn with_grant(mut self, caller_id: impl Into<String>, permission: impl Into<String>) -> Self {
        self.grants
            .entry(caller_id.into())
            .or_default()
            .insert(permission.into());
        self
    }

    pub fn is_admin(&self, caller_id: &str) -> bool {
        self.admins.contains(caller_id)
    }
}

impl AccessPolicy for StaticAccessPolicy {
    fn authorize(&self, ctx: &ExecutionContext, metadata: &CommandMetadata) -> AccessDecision {
        if metadata.scope_only && ctx.scope_id.is_none() {
            return AccessDecision::Denied(format!(
                "{} can only be used inside a community",
                metadata.name
            ));
        }

        if self.is_admin(&ctx.caller_id) {
            return AccessDecision::Granted;
        }

        if metadata.admin_only {
            return AccessDecision::Denied(format!("{} is restricted to administrators", metadata.name));
        }

        let granted = self.grants.get(&ctx.caller_id);
        let missing: Vec<&str> = metadata
            .permissions
            .iter()
            .filter(|perm| !granted.is_some_and(|g| g.contains(perm.as_str())))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied(format!("missing permissions: {}", missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(permissions: &[&str], admin_only: bool, scope_only: bool) -> CommandMetadata {
        CommandMetadata {
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            admin_only,
            scope_only,
            ..CommandMetadata::new("report", "Inactivity report")
        }
    }

    #[test]
    fn test_missing_permission_is_denied() {
        let policy = StaticAccessPolicy::new().with_grant("mod", "manage_members");
        let meta = metadata(&["manage_members"], false, false);

        let ctx = ExecutionContext::new("mod", Some("g1".into()));
        assert!(policy.authorize(&ctx, &meta).is_granted());

        let ctx = ExecutionContext::new("member", Some("g1".into()));
        assert_eq!(
            policy.authorize(&ctx, &meta),
            AccessDecision::Denied("missing permissions: manage_members".into())
        );
    }

    #[test]
    fn test_admins_bypass_permissions_but_not_scope() {
        let policy = StaticAccessPolicy::new().with_admin("root");
        let meta = metadata(&["manage_members"], true, true);

        assert!(policy
            .authorize(&ExecutionContext::new("root", Some("g1".into())), &meta)
            .is_granted());
        assert!(!policy
            .authorize(&ExecutionContext::new("root", None), &meta)
            .is_granted());
    }

    #[test]
    fn test_admin_only_rejects_regular_callers() {
        let policy = StaticAccessPolicy::new();
        let meta = metadata(&[], true, false);
        assert!(!policy
            .authorize(&ExecutionContext::new("anyone", None), &meta)
            .is_granted());
    }

    #[test]
    fn test_from_config() {
        let mut config = AccessConfig::default();
        config.admins.insert("root".into());
        config
            .grants
            .insert("mod".into(), vec!["manage_members".into()]);
        let policy = StaticAccessPolicy::from_config(&config);
        assert!(policy.is_admin("root"));
        assert!(policy
            .authorize(
                &ExecutionContext::new("mod", Some("g1".into())),
                &metadata(&["manage_members"], false, true)
            )
            .is_granted());
    }
}
