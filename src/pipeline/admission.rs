//! Admission control: cooldowns, sliding-window rate limits and the global
//! concurrency gate.
//!
//! Every check-and-record is a single critical section under a
//! `parking_lot::Mutex` that is never held across an `.await`, so two
//! concurrent requests can never both squeeze through the last slot.

use crate::error::{Result, RosterError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Per-caller cooldown between successive admissions
#[derive(Debug)]
pub struct CooldownTracker {
    cooldown: Duration,
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn check_and_record(&self, caller_id: &str) -> Result<()> {
        self.check_and_record_at(caller_id, Instant::now())
    }

    /// Reject when `caller_id` was admitted less than one cooldown before `now`
    pub fn check_and_record_at(&self, caller_id: &str, now: Instant) -> Result<()> {
        if self.cooldown.is_zero() {
            return Ok(());
        }

        let mut last_admitted = self.last_admitted.lock();
        if let Some(previous) = last_admitted.get(caller_id).copied() {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return Err(RosterError::CooldownActive {
                    remaining_ms: remaining.as_millis().max(1) as u64,
                });
            }
        }
        last_admitted.insert(caller_id.to_string(), now);
        Ok(())
    }

    pub fn reset(&self, caller_id: &str) {
        self.last_admitted.lock().remove(caller_id);
    }

    pub fn tracked_callers(&self) -> usize {
        self.last_admitted.lock().len()
    }

    /// Forget callers whose cooldown has fully elapsed
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let mut last_admitted = self.last_admitted.lock();
        let before = last_admitted.len();
        last_admitted.retain(|_, at| now.saturating_duration_since(*at) < self.cooldown);
        before - last_admitted.len()
    }
}

/// Sliding-window limiter keyed by caller
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, caller_id: &str) -> Result<()> {
        self.check_at(caller_id, Instant::now())
    }

    /// Admit and record a call at `now`, or reject if `max_calls` were already
    /// admitted within the trailing window
    pub fn check_at(&self, caller_id: &str, now: Instant) -> Result<()> {
        let mut calls = self.calls.lock();
        let window = calls.entry(caller_id.to_string()).or_default();
        while let Some(oldest) = window.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_calls {
            debug!(caller_id = %caller_id, limit = self.max_calls, "Rate limit reached");
            return Err(RosterError::RateLimited {
                limit: self.max_calls,
                window_secs: self.window.as_secs(),
            });
        }
        window.push_back(now);
        Ok(())
    }

    /// Calls still available to `caller_id` in the current window
    pub fn remaining(&self, caller_id: &str) -> usize {
        let now = Instant::now();
        let calls = self.calls.lock();
        let used = calls
            .get(caller_id)
            .map(|w| {
                w.iter()
                    .filter(|t| now.saturating_duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0);
        self.max_calls.saturating_sub(used)
    }

    pub fn tracked_callers(&self) -> usize {
        self.calls.lock().len()
    }

    /// Drop callers whose windows are empty
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Instant::now())
    }

    pub fn prune_idle_at(&self, now: Instant) -> usize {
        let mut calls = self.calls.lock();
        let before = calls.len();
        calls.retain(|_, w| {
            w.retain(|t| now.saturating_duration_since(*t) < self.window);
            !w.is_empty()
        });
        before - calls.len()
    }
}

/// Process-wide cap on executions in flight
#[derive(Debug)]
pub struct ConcurrencyGate {
    limit: usize,
    in_flight: Mutex<HashSet<Uuid>>,
    peak: Mutex<usize>,
}

impl ConcurrencyGate {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            in_flight: Mutex::new(HashSet::new()),
            peak: Mutex::new(0),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Claim a slot for `execution_id`; the slot is held until the permit drops
    pub fn try_acquire(self: &Arc<Self>, execution_id: Uuid) -> Result<AdmissionPermit> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.len() >= self.limit {
            return Err(RosterError::ConcurrencyExceeded { limit: self.limit });
        }
        in_flight.insert(execution_id);
        let current = in_flight.len();
        drop(in_flight);

        let mut peak = self.peak.lock();
        if current > *peak {
            *peak = current;
        }

        Ok(AdmissionPermit {
            gate: Arc::clone(self),
            execution_id,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Highest number of simultaneous executions observed
    pub fn peak(&self) -> usize {
        *self.peak.lock()
    }
}

/// RAII slot in the [`ConcurrencyGate`]
#[derive(Debug)]
pub struct AdmissionPermit {
    gate: Arc<ConcurrencyGate>,
    execution_id: Uuid,
}

impl AdmissionPermit {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.gate.in_flight.lock().remove(&self.execution_id);
    }
}
