// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::{
    fmt::Debug,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

/// Fake clocks for tests.
///
/// To enable this module, you must enable the `test-util` feature.
#[cfg(feature = "test-util")]
pub mod fakes;

/// A custom wall clock.
pub trait Time: Send + Sync + Debug {
    /// Get the current system time
    fn now(&self) -> SystemTime;
}

/// Where the current time comes from.
#[derive(Clone, Default)]
pub enum TimeSource {
    /// Use the system clock
    #[default]
    System,
    /// Use a custom clock
    Custom(Arc<dyn Time>),
}

impl Debug for TimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "TimeSource::System"),
            Self::Custom(_) => write!(f, "TimeSource::Custom(...)"),
        }
    }
}

impl TimeSource {
    /// Wrap a custom clock.
    pub fn custom(time: impl Time + 'static) -> Self {
        Self::Custom(Arc::new(time))
    }

    /// The current [`SystemTime`].
    pub fn system_time(&self) -> SystemTime {
        match self {
            Self::System => SystemTime::now(),
            Self::Custom(time) => time.now(),
        }
    }

    /// Nanoseconds since the Unix epoch.
    ///
    /// Times before the epoch are negative; times too far from it to fit saturate.
    ///
    /// ```
    /// use std::time::{Duration, UNIX_EPOCH};
    /// use datastreams_timesource::{TimeSource, fakes::StaticTimeSource};
    ///
    /// let ts = TimeSource::custom(StaticTimeSource::at_time(UNIX_EPOCH + Duration::from_secs(3)));
    /// assert_eq!(ts.now_nanos(), 3_000_000_000);
    /// ```
    pub fn now_nanos(&self) -> i64 {
        system_time_to_nanos(self.system_time())
    }
}

/// Convert a [`SystemTime`] to signed nanoseconds since the Unix epoch, saturating on overflow.
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|nanos| -nanos)
            .unwrap_or(i64::MIN),
    }
}
