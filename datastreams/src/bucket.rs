// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-width aggregation windows.

use datastreams_sketch::QuantileSketch;
use smallvec::SmallVec;

use crate::{
    key::{AggregationKey, AggregationKeyRef, BacklogKey, TimestampType},
    payload::{Backlog, StatsBucket, StatsGroup},
};

/// Sketches accumulated for one aggregation key.
pub(crate) struct BucketStat<S> {
    pathway_latency: S,
    edge_latency: S,
    payload_size: S,
}

impl<S: QuantileSketch> BucketStat<S> {
    fn new(config: &S::Config) -> Self {
        Self {
            pathway_latency: S::new(config),
            edge_latency: S::new(config),
            payload_size: S::new(config),
        }
    }

    fn add(&mut self, values: &PointValues) {
        self.pathway_latency.add(values.pathway_latency);
        self.edge_latency.add(values.edge_latency);
        self.payload_size.add(values.payload_size);
    }
}

/// Clamped, unit-converted values of one observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PointValues {
    /// seconds
    pub(crate) pathway_latency: f64,
    /// seconds
    pub(crate) edge_latency: f64,
    /// bytes
    pub(crate) payload_size: f64,
}

impl PointValues {
    pub(crate) fn new(
        pathway_latency_nanos: i64,
        edge_latency_nanos: i64,
        payload_size_bytes: i64,
    ) -> Self {
        Self {
            pathway_latency: nanos_to_secs(pathway_latency_nanos),
            edge_latency: nanos_to_secs(edge_latency_nanos),
            payload_size: payload_size_bytes.max(0) as f64,
        }
    }
}

fn nanos_to_secs(nanos: i64) -> f64 {
    nanos.max(0) as f64 / 1e9
}

/// All state aggregated for one window.
pub(crate) struct TimeBucket<S> {
    start: i64,
    duration: i64,
    stats: hashbrown::HashMap<AggregationKey, BucketStat<S>>,
    backlogs: hashbrown::HashMap<BacklogKey, i64>,
}

impl<S: QuantileSketch> TimeBucket<S> {
    pub(crate) fn new(start: i64, duration: i64) -> Self {
        debug_assert!(start % duration == 0, "bucket start {start} not aligned");
        Self {
            start,
            duration,
            stats: Default::default(),
            backlogs: Default::default(),
        }
    }

    pub(crate) fn start(&self) -> i64 {
        self.start
    }

    pub(crate) fn add_point(
        &mut self,
        key: &AggregationKeyRef<'_>,
        values: &PointValues,
        config: &S::Config,
    ) {
        self.stats
            .entry_ref(key)
            .or_insert_with(|| BucketStat::new(config))
            .add(values);
    }

    /// Last write wins.
    pub(crate) fn set_backlog(&mut self, key: BacklogKey, value: i64) {
        self.backlogs.insert(key, value);
    }

    /// Serialize into one [`StatsBucket`] per attribution.
    ///
    /// Origin and current views of the same window are exported as separate buckets. Backlogs
    /// are only ever recorded against the current view.
    pub(crate) fn into_stats_buckets(self) -> SmallVec<[StatsBucket; 2]> {
        let mut stats: Vec<_> = self.stats.into_iter().collect();
        stats.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

        let mut origin = Vec::new();
        let mut current = Vec::new();
        for (key, stat) in stats {
            let group = StatsGroup {
                edge_tags: key.edge_tags,
                hash: key.hash,
                parent_hash: key.parent_hash,
                pathway_latency: stat.pathway_latency.encode(),
                edge_latency: stat.edge_latency.encode(),
                payload_size: stat.payload_size.encode(),
                timestamp_type: key.timestamp_type,
            };
            match key.timestamp_type {
                TimestampType::Origin => origin.push(group),
                TimestampType::Current => current.push(group),
            }
        }

        let mut backlogs: Vec<_> = self
            .backlogs
            .into_iter()
            .map(|(key, value)| Backlog {
                tags: key.tags(),
                value,
            })
            .collect();
        backlogs.sort_unstable_by(|a, b| a.tags.cmp(&b.tags));

        let start = self.start as u64;
        let duration = self.duration as u64;
        let mut out = SmallVec::new();
        if !origin.is_empty() {
            out.push(StatsBucket {
                start,
                duration,
                stats: origin,
                backlogs: Vec::new(),
            });
        }
        if !current.is_empty() || !backlogs.is_empty() {
            out.push(StatsBucket {
                start,
                duration,
                stats: current,
                backlogs,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use datastreams_sketch::{DDSketch, LogarithmicMapping, QuantileSketch};

    use super::{PointValues, TimeBucket};
    use crate::{
        key::{AggregationKeyRef, BacklogKey, TimestampType},
        point::KafkaOffset,
    };

    fn key(tags: &[String], hash: u64, timestamp_type: TimestampType) -> AggregationKeyRef<'_> {
        AggregationKeyRef {
            hash,
            parent_hash: 1,
            edge_tags: tags,
            timestamp_type,
        }
    }

    fn sketch_of(values: &[f64]) -> Vec<u8> {
        let mut sketch = DDSketch::default();
        for v in values {
            QuantileSketch::add(&mut sketch, *v);
        }
        sketch.encode()
    }

    #[test]
    fn negative_values_clamp_to_zero() {
        let values = PointValues::new(-5, -1, -100);
        check!(values.pathway_latency == 0.0);
        check!(values.edge_latency == 0.0);
        check!(values.payload_size == 0.0);
        let values = PointValues::new(1_500_000_000, 2_000_000_000, 7);
        check!(values.pathway_latency == 1.5);
        check!(values.edge_latency == 2.0);
        check!(values.payload_size == 7.0);
    }

    #[test]
    fn splits_views_and_sorts() {
        let mapping = LogarithmicMapping::default();
        let tags = vec!["type:edge-1".to_owned()];
        let mut bucket = TimeBucket::<DDSketch>::new(20, 10);
        let values = PointValues::new(1_000_000_000, 1_000_000_000, 1);
        bucket.add_point(&key(&tags, 3, TimestampType::Current), &values, &mapping);
        bucket.add_point(&key(&tags, 2, TimestampType::Current), &values, &mapping);
        bucket.add_point(&key(&tags, 2, TimestampType::Origin), &values, &mapping);
        bucket.add_point(&key(&tags, 2, TimestampType::Current), &values, &mapping);

        let out = bucket.into_stats_buckets();
        check!(out.len() == 2);
        check!(out[0].stats.len() == 1);
        check!(out[0].stats[0].timestamp_type == TimestampType::Origin);
        check!(out[1].stats.iter().map(|s| s.hash).collect::<Vec<_>>() == [2, 3]);
        check!(out[1].stats[0].pathway_latency == sketch_of(&[1.0, 1.0]));
        check!(out[1].stats[1].pathway_latency == sketch_of(&[1.0]));
    }

    #[test]
    fn backlog_last_write_wins() {
        let mut bucket = TimeBucket::<DDSketch>::new(0, 10);
        for offset in [5, 15, 3] {
            let (key, value) = BacklogKey::from_offset(KafkaOffset::produce("t", 0, offset));
            bucket.set_backlog(key, value);
        }
        let out = bucket.into_stats_buckets();
        check!(out.len() == 1);
        check!(out[0].stats.is_empty());
        check!(out[0].backlogs.len() == 1);
        check!(out[0].backlogs[0].value == 3);
    }
}
