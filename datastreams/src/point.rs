// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Observations handed to the [`Processor`](crate::Processor) by instrumented call-sites.

/// A single observation of a message crossing a pipeline edge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsPoint {
    /// Tags identifying the edge, e.g. `["direction:in", "topic:orders", "type:kafka"]`.
    pub edge_tags: Vec<String>,
    /// Identity of the pathway up to and including this edge.
    pub hash: u64,
    /// Identity of the upstream pathway, 0 for the first hop.
    pub parent_hash: u64,
    /// When the observation was made, in nanoseconds since the Unix epoch.
    pub timestamp_nanos: i64,
    /// Time elapsed since the pathway started.
    pub pathway_latency_nanos: i64,
    /// Time elapsed since the previous hop.
    pub edge_latency_nanos: i64,
    /// Size of the message payload.
    pub payload_size_bytes: i64,
}

/// Which side of a queue an offset was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OffsetType {
    /// Offset committed by a consumer group.
    Commit,
    /// Offset of the last message produced.
    Produce,
}

impl OffsetType {
    pub(crate) fn tag(self) -> &'static str {
        match self {
            OffsetType::Commit => "type:kafka_commit",
            OffsetType::Produce => "type:kafka_produce",
        }
    }
}

/// A queue offset position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaOffset {
    /// The offset.
    pub offset: i64,
    /// Topic the offset belongs to.
    pub topic: String,
    /// Partition the offset belongs to.
    pub partition: i32,
    /// Consumer group, only set for commit offsets.
    pub group: Option<String>,
    /// Commit or produce.
    pub offset_type: OffsetType,
}

impl KafkaOffset {
    /// An offset committed by `group`.
    pub fn commit(
        topic: impl Into<String>,
        partition: i32,
        group: impl Into<String>,
        offset: i64,
    ) -> Self {
        Self {
            offset,
            topic: topic.into(),
            partition,
            group: Some(group.into()),
            offset_type: OffsetType::Commit,
        }
    }

    /// The offset of a message just produced.
    pub fn produce(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            offset,
            topic: topic.into(),
            partition,
            group: None,
            offset_type: OffsetType::Produce,
        }
    }
}
