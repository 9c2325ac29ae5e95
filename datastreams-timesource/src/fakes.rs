// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::Time;

/// A clock that always returns the same time.
#[derive(Debug, Clone, Copy)]
pub struct StaticTimeSource {
    now: SystemTime,
}

impl StaticTimeSource {
    /// Create a clock stopped at `time`.
    ///
    /// ```
    /// use datastreams_timesource::{TimeSource, fakes::StaticTimeSource};
    /// use std::time::UNIX_EPOCH;
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(UNIX_EPOCH));
    /// assert_eq!(ts.system_time(), UNIX_EPOCH);
    /// ```
    pub fn at_time(time: impl Into<SystemTime>) -> Self {
        Self { now: time.into() }
    }

    /// Create a clock stopped `nanos` nanoseconds after the Unix epoch.
    pub fn at_nanos(nanos: u64) -> Self {
        Self::at_time(UNIX_EPOCH + Duration::from_nanos(nanos))
    }
}

impl Time for StaticTimeSource {
    fn now(&self) -> SystemTime {
        self.now
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give another to the code under
/// test.
#[derive(Debug, Clone)]
pub struct ManuallyAdvancedTimeSource(Arc<Mutex<SystemTime>>);

impl ManuallyAdvancedTimeSource {
    /// Create a clock starting at `time`.
    pub fn at_time(time: impl Into<SystemTime>) -> Self {
        Self(Arc::new(Mutex::new(time.into())))
    }

    /// Create a clock starting `nanos` nanoseconds after the Unix epoch.
    pub fn at_nanos(nanos: u64) -> Self {
        Self::at_time(UNIX_EPOCH + Duration::from_nanos(nanos))
    }

    /// Set the current time.
    ///
    /// ```
    /// use datastreams_timesource::{TimeSource, fakes::ManuallyAdvancedTimeSource};
    /// use std::time::{Duration, UNIX_EPOCH};
    ///
    /// let clock = ManuallyAdvancedTimeSource::at_time(UNIX_EPOCH);
    /// let ts = TimeSource::custom(clock.clone());
    ///
    /// let later = UNIX_EPOCH + Duration::from_secs(100);
    /// clock.update_time(later);
    /// assert_eq!(ts.system_time(), later);
    /// ```
    pub fn update_time(&self, time: impl Into<SystemTime>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = time.into();
    }

    /// Move the clock forward by `elapsed`.
    pub fn advance(&self, elapsed: Duration) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) += elapsed;
    }
}

impl Time for ManuallyAdvancedTimeSource {
    fn now(&self) -> SystemTime {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
