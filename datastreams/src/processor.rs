// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The aggregation engine.

use std::{
    collections::BTreeMap,
    io,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use datastreams_sketch::{DDSketch, QuantileSketch};
use datastreams_timesource::TimeSource;

use crate::{
    bucket::{PointValues, TimeBucket},
    config::{ExportEnabled, ProcessorBuilder},
    counters::{CounterSnapshot, ProcessorCounters},
    export::ExportHandle,
    exporter::{Exporter, RetryPolicy, Transport},
    key::{AggregationKeyRef, BacklogKey, TimestampType},
    payload::StatsPayload,
    point::{KafkaOffset, StatsPoint},
    rate_limit::rate_limited,
};

/// Aggregates points and offsets into fixed-width time buckets.
///
/// A `Processor` is a cheap handle: clone it and give a copy to every call-site that records
/// observations. All clones share the same buckets, guarded by a single lock that is only ever
/// held for a map lookup and a sketch update.
///
/// Each point is recorded twice: once in the window where its pathway started (`origin`) and once
/// in the window where it was observed (`current`). Windows are closed and exported by
/// [`Processor::flush`], usually called from the export thread started by
/// [`Processor::start`].
///
/// ```
/// use datastreams::{Processor, StatsPoint};
///
/// let processor = Processor::builder().env("prod").service("checkout").build();
/// processor.add(StatsPoint {
///     edge_tags: vec!["type:kafka".into()],
///     hash: 2,
///     parent_hash: 1,
///     timestamp_nanos: 20_000_000_000,
///     pathway_latency_nanos: 5_000_000_000,
///     edge_latency_nanos: 2_000_000_000,
///     payload_size_bytes: 100,
/// });
///
/// let payload = processor.flush(30_000_000_000);
/// let starts: Vec<u64> = payload.stats.iter().map(|b| b.start).collect();
/// assert_eq!(starts, [10_000_000_000, 20_000_000_000]);
/// ```
pub struct Processor<S: QuantileSketch = DDSketch> {
    shared: Arc<Shared<S>>,
}

impl<S: QuantileSketch> Clone for Processor<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: QuantileSketch> std::fmt::Debug for Processor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("env", &self.shared.identity.env)
            .field("service", &self.shared.identity.service)
            .field("bucket_duration", &self.bucket_duration())
            .finish_non_exhaustive()
    }
}

struct Shared<S: QuantileSketch> {
    state: Mutex<Aggregation<S>>,
    identity: Identity,
    // nanoseconds
    bucket_duration: i64,
    retained_windows: u32,
    sketch_config: S::Config,
    time_source: TimeSource,
    export_enabled: ExportEnabled,
    enabled: AtomicBool,
    counters: ProcessorCounters,
    flush_interval: Duration,
    thread_name: String,
    retry: RetryPolicy,
}

struct Identity {
    env: String,
    service: String,
    tracer_version: String,
    lang: String,
}

struct Aggregation<S> {
    buckets: BTreeMap<i64, TimeBucket<S>>,
    // start of the newest evicted bucket; nothing at or before it is accepted again
    watermark: Option<i64>,
}

impl<S: QuantileSketch> Aggregation<S> {
    fn bucket_mut(&mut self, start: i64, duration: i64) -> Option<&mut TimeBucket<S>> {
        if start < 0 || self.watermark.is_some_and(|w| start <= w) {
            return None;
        }
        Some(
            self.buckets
                .entry(start)
                .or_insert_with(|| TimeBucket::new(start, duration)),
        )
    }
}

/// Start of the window containing `timestamp`, or `None` if that start isn't representable.
fn truncate(timestamp: i64, duration: i64) -> Option<i64> {
    timestamp.checked_sub(timestamp.rem_euclid(duration))
}

impl Processor<DDSketch> {
    /// A builder with default settings.
    pub fn builder() -> ProcessorBuilder {
        ProcessorBuilder::new()
    }
}

impl<S: QuantileSketch> Processor<S> {
    pub(crate) fn from_builder(builder: ProcessorBuilder, sketch_config: S::Config) -> Self {
        let bucket_duration = builder.bucket_duration;
        let enabled = (builder.export_enabled)();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Aggregation {
                    buckets: BTreeMap::new(),
                    watermark: None,
                }),
                identity: Identity {
                    env: builder.env,
                    service: builder.service,
                    tracer_version: builder.tracer_version,
                    lang: builder.lang,
                },
                // checked by the builder
                bucket_duration: bucket_duration.as_nanos() as i64,
                retained_windows: builder.retained_windows,
                sketch_config,
                time_source: builder.time_source,
                export_enabled: builder.export_enabled,
                enabled: AtomicBool::new(enabled),
                counters: ProcessorCounters::default(),
                flush_interval: builder.flush_interval.unwrap_or(bucket_duration),
                thread_name: builder.thread_name,
                retry: builder.retry,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Aggregation<S>> {
        // every critical section leaves the map consistent, so a panic elsewhere doesn't
        // invalidate it
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a point in its origin and current windows.
    ///
    /// Never fails and never blocks on I/O. Negative latencies and sizes are recorded as zero.
    /// A view whose window was already evicted, or starts before the Unix epoch, is dropped and
    /// counted in [`CounterSnapshot::late_drops`].
    pub fn add(&self, point: StatsPoint) {
        let shared = &*self.shared;
        if !shared.enabled.load(Ordering::Relaxed) {
            shared.counters.disabled_drops.incr();
            return;
        }
        let duration = shared.bucket_duration;
        let pathway_start = point
            .timestamp_nanos
            .saturating_sub(point.pathway_latency_nanos.max(0));
        let views = [
            (truncate(pathway_start, duration), TimestampType::Origin),
            (truncate(point.timestamp_nanos, duration), TimestampType::Current),
        ];
        let values = PointValues::new(
            point.pathway_latency_nanos,
            point.edge_latency_nanos,
            point.payload_size_bytes,
        );

        let mut late = 0;
        {
            let mut state = self.lock();
            for (start, timestamp_type) in views {
                let key = AggregationKeyRef {
                    hash: point.hash,
                    parent_hash: point.parent_hash,
                    edge_tags: &point.edge_tags,
                    timestamp_type,
                };
                let bucket = match start {
                    Some(start) => state.bucket_mut(start, duration),
                    None => None,
                };
                match bucket {
                    Some(bucket) => bucket.add_point(&key, &values, &shared.sketch_config),
                    None => late += 1,
                }
            }
        }

        shared.counters.points_ingested.incr();
        if late > 0 {
            shared.counters.late_drops.add(late);
            rate_limited!(
                Duration::from_secs(60),
                tracing::warn!(
                    timestamp = point.timestamp_nanos,
                    "dropping data streams point for an already flushed window"
                )
            );
        }
    }

    /// Record the latest offset of a queue partition in the current window.
    ///
    /// The window is taken from the processor's clock. Within a window, the last offset recorded
    /// for a `(topic, partition, group, type)` wins.
    pub fn add_offset(&self, offset: KafkaOffset) {
        let shared = &*self.shared;
        if !shared.enabled.load(Ordering::Relaxed) {
            shared.counters.disabled_drops.incr();
            return;
        }
        let start = truncate(shared.time_source.now_nanos(), shared.bucket_duration);
        let (key, value) = BacklogKey::from_offset(offset);

        let accepted = start.is_some_and(|start| {
            match self.lock().bucket_mut(start, shared.bucket_duration) {
                Some(bucket) => {
                    bucket.set_backlog(key, value);
                    true
                }
                None => false,
            }
        });

        if accepted {
            shared.counters.offsets_ingested.incr();
        } else {
            shared.counters.late_drops.incr();
        }
    }

    /// Evict every window that closed at or before `now_nanos` and serialize it.
    ///
    /// A window closes once `retained_windows` full windows have elapsed after its end. Evicted
    /// windows are gone for good: calling `flush` again with the same `now_nanos` returns an
    /// empty payload, and later observations for them are dropped.
    pub fn flush(&self, now_nanos: i64) -> StatsPayload {
        let closed = self.evict(now_nanos);
        // sketches are encoded after the lock is released
        let stats = closed
            .into_iter()
            .flat_map(TimeBucket::into_stats_buckets)
            .collect();
        let identity = &self.shared.identity;
        StatsPayload {
            env: identity.env.clone(),
            service: identity.service.clone(),
            stats,
            tracer_version: identity.tracer_version.clone(),
            lang: identity.lang.clone(),
        }
    }

    /// Evict closed windows without serializing them. Returns how many were dropped.
    pub(crate) fn discard(&self, now_nanos: i64) -> usize {
        self.evict(now_nanos).len()
    }

    fn evict(&self, now_nanos: i64) -> Vec<TimeBucket<S>> {
        let shared = &*self.shared;
        let horizon = shared
            .bucket_duration
            .saturating_mul(1 + i64::from(shared.retained_windows));
        let mut closed = Vec::new();
        {
            let mut state = self.lock();
            while let Some(entry) = state.buckets.first_entry() {
                if entry.key().saturating_add(horizon) > now_nanos {
                    break;
                }
                closed.push(entry.remove());
            }
            if let Some(newest) = closed.last() {
                state.watermark = Some(newest.start());
            }
        }
        shared.counters.buckets_flushed.add(closed.len() as u64);
        closed
    }

    /// Start the export thread.
    ///
    /// The thread flushes every flush interval and hands non-empty payloads to `exporter`.
    /// Dropping the returned handle stops it after a final flush of every open window.
    pub fn start<T: Transport>(&self, exporter: Exporter<T>) -> io::Result<ExportHandle> {
        ExportHandle::spawn(self.clone(), exporter)
    }

    /// An [`Exporter`] for `transport` using the configured retry policy.
    pub fn exporter(&self, transport: impl Transport) -> Exporter {
        Exporter::new(transport).retry_policy(self.shared.retry)
    }

    /// Poll the export-enabled predicate and remember the answer.
    pub(crate) fn refresh_export_enabled(&self) -> bool {
        let enabled = (self.shared.export_enabled)();
        let previous = self.shared.enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            tracing::info!(enabled, "data streams export availability changed");
        }
        enabled
    }

    /// Whether points and offsets are currently being aggregated.
    pub fn is_export_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
    }

    /// Current values of the health counters.
    pub fn counters(&self) -> CounterSnapshot {
        self.shared.counters.snapshot()
    }

    /// Width of an aggregation window.
    pub fn bucket_duration(&self) -> Duration {
        Duration::from_nanos(self.shared.bucket_duration as u64)
    }

    pub(crate) fn counters_ref(&self) -> &ProcessorCounters {
        &self.shared.counters
    }

    pub(crate) fn now_nanos(&self) -> i64 {
        self.shared.time_source.now_nanos()
    }

    pub(crate) fn flush_interval(&self) -> Duration {
        self.shared.flush_interval
    }

    pub(crate) fn thread_name(&self) -> &str {
        &self.shared.thread_name
    }
}
