// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Lets an action through at most once per interval, across all threads.
///
/// Used through [`rate_limited!`], which gives every call-site its own limiter.
pub(crate) struct RateLimit {
    // seconds since `process_epoch()` before which nothing is let through
    next_allowed: AtomicU64,
}

impl RateLimit {
    pub(crate) const fn new() -> Self {
        Self {
            next_allowed: AtomicU64::new(0),
        }
    }

    pub(crate) fn try_acquire(&self, interval: Duration) -> bool {
        self.try_acquire_at(process_epoch().elapsed(), interval)
    }

    fn try_acquire_at(&self, now: Duration, interval: Duration) -> bool {
        let now = now.as_secs();
        let next = self.next_allowed.load(Ordering::Relaxed);
        if now < next {
            return false;
        }
        let new_next = now.saturating_add(interval.as_secs());
        self.next_allowed
            .compare_exchange(next, new_next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// `rate_limited!(interval, expr)` evaluates `expr` at most once per `interval` for this
/// call-site.
///
/// Export failures repeat on every tick while the collector is down; this keeps the first one
/// visible without flooding the host's logs.
macro_rules! rate_limited {
    ($interval:expr, $call:expr) => {{
        static LIMIT: $crate::rate_limit::RateLimit = $crate::rate_limit::RateLimit::new();
        let interval: ::std::time::Duration = $interval;
        debug_assert!(
            interval >= ::std::time::Duration::from_secs(1),
            "rate limiting has second granularity"
        );
        if LIMIT.try_acquire(interval) {
            $call;
        }
    }};
}
pub(crate) use rate_limited;
