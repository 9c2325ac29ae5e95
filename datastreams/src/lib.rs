// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod rate_limit;

mod bucket;
pub mod config;
mod counters;
mod export;
pub mod exporter;
mod key;
pub mod payload;
mod point;
mod processor;

/// Test utilities for data streams statistics
///
/// This requires that the `test-util` feature be enabled.
#[cfg(feature = "test-util")]
pub mod test_util;

pub use config::{ProcessorBuilder, ProcessorConfig};
pub use counters::CounterSnapshot;
pub use export::ExportHandle;
pub use exporter::{ExportError, Exporter, RetryPolicy, Transport, TransportError};
pub use key::{AggregationKey, BacklogKey, TimestampType};
pub use payload::{Backlog, StatsBucket, StatsGroup, StatsPayload};
pub use point::{KafkaOffset, OffsetType, StatsPoint};
pub use processor::Processor;

pub use datastreams_sketch as sketch;
pub use datastreams_timesource as timesource;
