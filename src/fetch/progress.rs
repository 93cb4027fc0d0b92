//! Progress reporting for long member fetches.

use crate::fetch::FetchTier;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    Initializing,
    Fetching,
    Filtering,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchProgress {
    pub scope_id: String,
    pub stage: FetchStage,
    pub tier: Option<FetchTier>,
    pub elapsed_ms: u64,
    pub processed: usize,
    pub total: Option<usize>,
}

pub type ProgressCallback = Arc<dyn Fn(&FetchProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct ProgressState {
    stage: FetchStage,
    tier: Option<FetchTier>,
    processed: usize,
    total: Option<usize>,
}

/// Tracks the current stage and forwards updates to an optional callback.
///
/// Cheap to clone; clones share state so the heartbeat timer re-emits the
/// latest stage.
#[derive(Clone)]
pub(crate) struct ProgressReporter {
    scope_id: Arc<str>,
    callback: Option<ProgressCallback>,
    started: Instant,
    state: Arc<Mutex<ProgressState>>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("scope_id", &self.scope_id)
            .field("active", &self.callback.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub(crate) fn new(scope_id: &str, callback: Option<ProgressCallback>) -> Self {
        Self {
            scope_id: Arc::from(scope_id),
            callback,
            started: Instant::now(),
            state: Arc::new(Mutex::new(ProgressState {
                stage: FetchStage::Initializing,
                tier: None,
                processed: 0,
                total: None,
            })),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    pub(crate) fn stage(&self, stage: FetchStage, tier: Option<FetchTier>) {
        {
            let mut state = self.state.lock();
            state.stage = stage;
            if tier.is_some() {
                state.tier = tier;
            }
        }
        self.emit();
    }

    pub(crate) fn filtering(&self, processed: usize, total: usize) {
        {
            let mut state = self.state.lock();
            state.stage = FetchStage::Filtering;
            state.processed = processed;
            state.total = Some(total);
        }
        self.emit();
    }

    /// Re-emit the current stage with a fresh elapsed time
    pub(crate) fn heartbeat(&self) {
        self.emit();
    }

    fn emit(&self) {
        let Some(callback) = &self.callback else {
            return;
        };
        let state = *self.state.lock();
        callback(&FetchProgress {
            scope_id: self.scope_id.to_string(),
            stage: state.stage,
            tier: state.tier,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            processed: state.processed,
            total: state.total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_forwards_stage_transitions() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |p: &FetchProgress| sink.lock().push(p.stage));

        let reporter = ProgressReporter::new("g1", Some(callback));
        reporter.stage(FetchStage::Initializing, None);
        reporter.stage(FetchStage::Fetching, Some(FetchTier::Full));
        reporter.filtering(500, 1_000);
        reporter.heartbeat();
        reporter.stage(FetchStage::Completed, None);

        assert_eq!(
            *seen.lock(),
            vec![
                FetchStage::Initializing,
                FetchStage::Fetching,
                FetchStage::Filtering,
                FetchStage::Filtering,
                FetchStage::Completed
            ]
        );
    }

    #[test]
    fn test_inactive_reporter_is_silent() {
        let reporter = ProgressReporter::new("g1", None);
        assert!(!reporter.is_active());
        reporter.stage(FetchStage::Failed, None);
    }
}
