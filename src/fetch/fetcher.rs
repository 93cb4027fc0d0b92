//! Downstream member-list client contract.

use crate::error::RosterError;
use crate::fetch::MemberCollection;
use async_trait::async_trait;
use std::fmt::Debug;

/// Failures reported by the platform client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("member fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("member fetch rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("missing permission to list members: {0}")]
    PermissionDenied(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<FetchError> for RosterError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout { timeout_ms } => RosterError::Timeout { timeout_ms },
            other => RosterError::HandlerError(other.to_string()),
        }
    }
}

/// Platform client able to list the members of a scope
#[async_trait]
pub trait MemberFetcher: Send + Sync + Debug {
    /// Fetch members of `scope_id`, at most `limit` when given
    async fn fetch_all(
        &self,
        scope_id: &str,
        limit: Option<usize>,
    ) -> Result<MemberCollection, FetchError>;

    /// Total member count when the client knows it without listing
    async fn member_count(&self, _scope_id: &str) -> Result<Option<usize>, FetchError> {
        Ok(None)
    }
}
