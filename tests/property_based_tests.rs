use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;
use roster_core::commands::classify_activity;
use roster_core::dispatch::normalize_command_name;
use roster_core::cache::TtlCache;
use roster_core::fetch::{MemberId, MemberRecord};
use roster_core::pipeline::{BackoffPolicy, CooldownTracker, SlidingWindowLimiter};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

fn backoff_strategy() -> impl Strategy<Value = BackoffPolicy> {
    prop_oneof![
        Just(BackoffPolicy::Fixed),
        Just(BackoffPolicy::Linear),
        Just(BackoffPolicy::Exponential),
    ]
}

/// Monotonic call times in milliseconds
fn call_times_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..5_000, 1..80).prop_map(|gaps| {
        gaps.into_iter()
            .scan(0u64, |t, gap| {
                *t += gap;
                Some(*t)
            })
            .collect()
    })
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    /// Property: an entry is readable until its TTL and gone once older
    #[test]
    fn ttl_entries_expire_after_ttl(ttl_ms in 1u64..60_000, read_at_ms in 0u64..120_000) {
        let runtime = paused_runtime();
        let (before, after) = runtime.block_on(async {
            let cache: TtlCache<String, u32> = TtlCache::new("prop", Duration::from_millis(ttl_ms));
            cache.insert("k".to_string(), 7);
            tokio::time::advance(Duration::from_millis(read_at_ms)).await;
            let before = cache.get(&"k".to_string());
            tokio::time::advance(Duration::from_millis(ttl_ms + 1)).await;
            (before, cache.get(&"k".to_string()))
        });

        if read_at_ms <= ttl_ms {
            prop_assert_eq!(before, Some(7));
        } else {
            prop_assert_eq!(before, None);
        }
        prop_assert_eq!(after, None);
    }

    /// Property: no window ever admits more than the configured maximum
    #[test]
    fn sliding_window_never_exceeds_limit(
        max_calls in 1usize..10,
        window_ms in 100u64..20_000,
        times in call_times_strategy(),
    ) {
        let limiter = SlidingWindowLimiter::new(max_calls, Duration::from_millis(window_ms));
        let base = Instant::now();
        let mut admitted: Vec<u64> = Vec::new();

        for t in times {
            if limiter.check_at("caller", base + Duration::from_millis(t)).is_ok() {
                admitted.push(t);
            }
        }

        for &t in &admitted {
            let in_window = admitted
                .iter()
                .filter(|&&other| other <= t && t - other < window_ms)
                .count();
            prop_assert!(in_window <= max_calls, "{} calls within {}ms", in_window, window_ms);
        }
    }

    /// Property: the first call is always admitted and calls spaced a full
    /// window apart are always admitted
    #[test]
    fn sliding_window_admits_spaced_calls(max_calls in 1usize..10, count in 1usize..20) {
        let window = Duration::from_secs(60);
        let limiter = SlidingWindowLimiter::new(max_calls, window);
        let base = Instant::now();
        for i in 0..count {
            prop_assert!(limiter.check_at("caller", base + window * i as u32).is_ok());
        }
    }

    /// Property: admitted calls are at least one cooldown apart
    #[test]
    fn cooldown_spaces_admitted_calls(cooldown_ms in 1u64..10_000, times in call_times_strategy()) {
        let tracker = CooldownTracker::new(Duration::from_millis(cooldown_ms));
        let base = Instant::now();
        let mut last: Option<u64> = None;

        for t in times {
            if tracker.check_and_record_at("caller", base + Duration::from_millis(t)).is_ok() {
                if let Some(previous) = last {
                    prop_assert!(t - previous >= cooldown_ms);
                }
                last = Some(t);
            }
        }
    }

    /// Property: backoff never shrinks between attempts and never exceeds the cap
    #[test]
    fn backoff_is_monotonic_and_capped(
        policy in backoff_strategy(),
        base_ms in 1u64..5_000,
        max_ms in 1u64..120_000,
        attempts in 1u32..40,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = Duration::from_millis(max_ms);
        let mut previous = Duration::ZERO;

        for attempt in 1..=attempts {
            let delay = policy.delay(base, attempt, max);
            prop_assert!(delay <= max);
            prop_assert!(delay >= previous);
            previous = delay;
        }
    }

    /// Property: one leading prefix and letter case never change the resolved name
    #[test]
    fn normalized_names_ignore_prefix_and_case(name in "[a-z][a-z-]{0,15}", prefix in "[!/]?") {
        let raw = format!("{prefix}{}", name.to_uppercase());
        prop_assert_eq!(normalize_command_name(&raw), name);
    }

    /// Property: every member lands in exactly one activity bucket
    #[test]
    fn activity_buckets_partition_members(
        seen_days_ago in prop::collection::vec(prop::option::of(0i64..400), 0..200),
        threshold_days in 1i64..365,
    ) {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut members = Vec::new();
        let mut last_seen = HashMap::new();
        for (i, days) in seen_days_ago.iter().enumerate() {
            let record = MemberRecord::new(format!("m{i:04}"), "member");
            if let Some(days) = days {
                last_seen.insert(record.id.clone(), now - ChronoDuration::days(*days));
            }
            members.push(record);
        }

        let buckets = classify_activity(&members, &last_seen, ChronoDuration::days(threshold_days), now);

        prop_assert_eq!(buckets.total(), members.len());
        let never = seen_days_ago.iter().filter(|d| d.is_none()).count();
        prop_assert_eq!(buckets.never_seen.len(), never);
        let mut all: Vec<&MemberId> = buckets
            .active
            .iter()
            .chain(&buckets.inactive)
            .chain(&buckets.never_seen)
            .collect();
        all.sort();
        all.dedup();
        prop_assert_eq!(all.len(), members.len());
    }
}
