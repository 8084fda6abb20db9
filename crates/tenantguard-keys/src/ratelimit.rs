//! Hourly Rate Limiting
//!
//! Fixed clock-hour buckets keyed by `(key_id, hour_start)`. Each request
//! increments its bucket first and then compares against the key's ceiling,
//! so the N-th request of the hour passes and the N+1-th is denied.
//!
//! Buckets are process-local. Behind a load balancer every instance counts
//! on its own, so the effective fleet ceiling is per instance.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use tenantguard_common::{Clock, GateError, SharedClock};
use tracing::debug;
use uuid::Uuid;

const HOUR_SECS: i64 = 3600;

/// Snapshot of a key's window after counting the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the window resets
    pub reset_at: i64,
    pub allowed: bool,
    /// Seconds until the reset, from the instant of the check
    pub retry_after_secs: u64,
}

impl RateLimitStatus {
    /// Denial carrying this window
    pub fn exceeded(&self) -> GateError {
        GateError::RateLimitExceeded {
            limit: self.limit,
            reset_at: self.reset_at,
            retry_after_secs: self.retry_after_secs,
        }
    }
}

/// Per-key fixed-window counter
#[derive(Debug)]
pub struct HourlyRateLimiter {
    buckets: DashMap<(Uuid, i64), u32>,
    /// Hour start of the last stale-bucket sweep
    swept_hour: AtomicI64,
    clock: SharedClock,
}

impl HourlyRateLimiter {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            buckets: DashMap::new(),
            swept_hour: AtomicI64::new(i64::MIN),
            clock,
        }
    }

    /// Count one request for `key_id` against `limit` per hour
    pub fn check(&self, key_id: Uuid, limit: u32) -> RateLimitStatus {
        let now = self.clock.now().timestamp();
        let hour_start = now - now.rem_euclid(HOUR_SECS);
        let reset_at = hour_start + HOUR_SECS;

        let count = {
            let mut bucket = self.buckets.entry((key_id, hour_start)).or_insert(0);
            *bucket = bucket.saturating_add(1);
            *bucket
        };

        if self.swept_hour.swap(hour_start, Ordering::AcqRel) < hour_start {
            self.purge_before(hour_start);
        }

        RateLimitStatus {
            limit,
            remaining: limit.saturating_sub(count),
            reset_at,
            allowed: count <= limit,
            retry_after_secs: u64::try_from(reset_at - now).unwrap_or(0),
        }
    }

    /// Drop buckets for hours that have ended
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now().timestamp();
        self.purge_before(now - now.rem_euclid(HOUR_SECS))
    }

    fn purge_before(&self, hour_start: i64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|(_, hour), _| *hour >= hour_start);
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "pruned stale rate limit buckets");
        }
        removed
    }

    /// Live bucket count
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use std::sync::Arc;
    use tenantguard_common::ManualClock;

    fn limiter_at(h: u32, m: u32) -> (HourlyRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()));
        (HourlyRateLimiter::new(clock.clone()), clock)
    }

    #[test]
    fn test_nth_passes_next_denied() {
        let (limiter, _) = limiter_at(14, 20);
        let key = Uuid::new_v4();

        for i in 1..=5 {
            let status = limiter.check(key, 5);
            assert!(status.allowed, "request {i} should pass");
            assert_eq!(status.remaining, 5 - i);
        }
        let denied = limiter.check(key, 5);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_secs, 40 * 60);
        assert_eq!(denied.exceeded().code(), "rate_limit_exceeded");
    }

    #[test]
    fn test_resets_at_top_of_hour() {
        let (limiter, clock) = limiter_at(14, 59);
        let key = Uuid::new_v4();
        limiter.check(key, 1);
        assert!(!limiter.check(key, 1).allowed);

        clock.advance(Duration::minutes(1));
        let status = limiter.check(key, 1);
        assert!(status.allowed);
        assert_eq!(status.reset_at, Utc.with_ymd_and_hms(2026, 3, 10, 16, 0, 0).unwrap().timestamp());
        // The previous hour's bucket was swept
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _) = limiter_at(9, 0);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        limiter.check(a, 1);
        assert!(!limiter.check(a, 1).allowed);
        assert!(limiter.check(b, 1).allowed);
    }

    proptest! {
        #[test]
        fn prop_allowed_iff_within_limit(limit in 1u32..50, requests in 1u32..120) {
            let (limiter, _) = limiter_at(10, 30);
            let key = Uuid::new_v4();
            for n in 1..=requests {
                let status = limiter.check(key, limit);
                prop_assert_eq!(status.allowed, n <= limit);
                prop_assert_eq!(status.remaining, limit.saturating_sub(n));
            }
        }
    }
}
