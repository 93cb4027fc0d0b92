//! Resource manager for one guarded operation.
//!
//! Timers are tokio tasks whose abort handles are tracked; the cancellation
//! token is cooperative and must be polled by long-running steps. Cleanup
//! runs on explicit request, when the guarded scope exits, when the maximum
//! lifetime elapses, or when the manager is dropped, whichever comes first.

use crate::error::{Result, RosterError};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStats {
    pub name: String,
    pub active_timers: usize,
    pub timers_created: u64,
    pub cancelled: bool,
    pub cleaned_up: bool,
}

#[derive(Debug)]
pub struct ResourceManager {
    name: String,
    token: CancellationToken,
    timers: Mutex<HashMap<TimerId, AbortHandle>>,
    next_timer_id: AtomicU64,
    cleaned_up: AtomicBool,
    watchdog: Mutex<Option<AbortHandle>>,
}

impl ResourceManager {
    /// Create a manager whose resources are released after `max_lifetime` at the latest
    pub fn new(name: impl Into<String>, max_lifetime: Duration) -> Arc<Self> {
        Self::build(name.into(), CancellationToken::new(), max_lifetime)
    }

    /// Create a manager whose signal is also cancelled when `parent` is
    pub fn with_parent(
        name: impl Into<String>,
        parent: &CancellationToken,
        max_lifetime: Duration,
    ) -> Arc<Self> {
        Self::build(name.into(), parent.child_token(), max_lifetime)
    }

    fn build(name: String, token: CancellationToken, max_lifetime: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            name,
            token,
            timers: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(1),
            cleaned_up: AtomicBool::new(false),
            watchdog: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&manager);
        let token = manager.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(max_lifetime) => {
                    if let Some(manager) = weak.upgrade() {
                        warn!(
                            resource = %manager.name,
                            max_lifetime_ms = max_lifetime.as_millis() as u64,
                            "⏰ Maximum lifetime exceeded, forcing cleanup"
                        );
                        manager.cleanup();
                    }
                }
            }
        });
        *manager.watchdog.lock() = Some(handle.abort_handle());

        manager
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancellation token that cooperative steps must poll
    pub fn signal(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Return `Cancelled` if the signal has fired
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(RosterError::Cancelled(format!(
                "{} was cancelled",
                self.name
            )));
        }
        Ok(())
    }

    /// Run `callback` once after `delay` unless cleanup happens first
    pub fn add_timeout<F>(&self, delay: Duration, callback: F) -> Result<TimerId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check()?;
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => callback(),
            }
        });
        Ok(self.track(handle.abort_handle()))
    }

    /// Run `callback` every `period` until cleared or cleaned up
    pub fn add_interval<F>(&self, period: Duration, mut callback: F) -> Result<TimerId>
    where
        F: FnMut() + Send + 'static,
    {
        self.check()?;
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => callback(),
                }
            }
        });
        Ok(self.track(handle.abort_handle()))
    }

    fn track(&self, handle: AbortHandle) -> TimerId {
        let id = TimerId(self.next_timer_id.fetch_add(1, Ordering::Relaxed));
        self.timers.lock().insert(id, handle);
        id
    }

    /// Stop a single timer early
    pub fn clear_timer(&self, id: TimerId) -> bool {
        match self.timers.lock().remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the signal and stop every tracked timer. Idempotent.
    pub fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::AcqRel) {
            return;
        }

        self.token.cancel();
        let timers: Vec<AbortHandle> = self.timers.lock().drain().map(|(_, h)| h).collect();
        let cleared = timers.len();
        for handle in timers {
            handle.abort();
        }
        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }

        debug!(resource = %self.name, timers_cleared = cleared, "🧹 Resources released");
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    pub fn active_timers(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            name: self.name.clone(),
            active_timers: self.active_timers(),
            timers_created: self.next_timer_id.load(Ordering::Relaxed) - 1,
            cancelled: self.token.is_cancelled(),
            cleaned_up: self.is_cleaned_up(),
        }
    }

    /// Run `operation` inside this scope.
    ///
    /// Returns `Cancelled` as soon as the signal fires (external cancellation
    /// or lifetime expiry) and always cleans up before returning.
    pub async fn scope<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let token = self.token.clone();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(RosterError::Cancelled(format!(
                "{} was cancelled before completion",
                self.name
            ))),
            result = operation => result,
        };
        self.cleanup();
        result
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_and_cleanup_clears_timers() {
        let manager = ResourceManager::new("test", Duration::from_secs(300));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        manager
            .add_timeout(Duration::from_millis(10), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let counter = Arc::clone(&fired);
        manager
            .add_timeout(Duration::from_secs(60), move || {
                counter.fetch_add(100, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(manager.active_timers(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        manager.cleanup();
        assert!(manager.is_cancelled());
        assert_eq!(manager.active_timers(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_runs_until_cleared() {
        let manager = ResourceManager::new("test", Duration::from_secs(300));
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let id = manager
            .add_interval(Duration::from_secs(1), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        assert!(manager.clear_timer(id));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_lifetime_triggers_cleanup() {
        let manager = ResourceManager::new("test", Duration::from_secs(300));
        let signal = manager.signal();

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(signal.is_cancelled());
        assert!(manager.is_cleaned_up());
        assert!(manager.add_timeout(Duration::from_secs(1), || {}).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_cleans_up_on_success_and_error() {
        let manager = ResourceManager::new("ok", Duration::from_secs(300));
        let value = manager.scope(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert!(manager.is_cleaned_up());

        let manager = ResourceManager::new("err", Duration::from_secs(300));
        let result: Result<()> = manager
            .scope(async { Err(RosterError::handler("boom")) })
            .await;
        assert!(result.is_err());
        assert!(manager.is_cleaned_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_aborts_scope() {
        let parent = CancellationToken::new();
        let manager = ResourceManager::with_parent("child", &parent, Duration::from_secs(300));

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result: Result<()> = manager
            .scope(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RosterError::Cancelled(_))));
        assert!(manager.is_cleaned_up());
    }
}
