// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The payload sent to the collector.

use serde::{Deserialize, Serialize};

use crate::key::TimestampType;

/// Every bucket closed by one flush, plus the identity of the emitting service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    /// Deployment environment.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Closed buckets, oldest first.
    pub stats: Vec<StatsBucket>,
    /// Version of the emitting library.
    pub tracer_version: String,
    /// Language tag of the emitting library.
    pub lang: String,
}

impl StatsPayload {
    /// Returns true if no bucket was closed.
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Serialize to the JSON document handed to the transport.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Aggregated statistics of one time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBucket {
    /// Window start, in nanoseconds since the Unix epoch.
    pub start: u64,
    /// Window width in nanoseconds.
    pub duration: u64,
    /// One entry per aggregation key, sorted by key.
    pub stats: Vec<StatsGroup>,
    /// One entry per backlog key, sorted by tags.
    pub backlogs: Vec<Backlog>,
}

/// Serialized sketches of one aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsGroup {
    /// Edge tags.
    pub edge_tags: Vec<String>,
    /// Pathway identity.
    pub hash: u64,
    /// Upstream pathway identity.
    pub parent_hash: u64,
    /// Encoded sketch of pathway latencies, in seconds.
    pub pathway_latency: Vec<u8>,
    /// Encoded sketch of edge latencies, in seconds.
    pub edge_latency: Vec<u8>,
    /// Encoded sketch of payload sizes, in bytes.
    pub payload_size: Vec<u8>,
    /// Window attribution.
    pub timestamp_type: TimestampType,
}

/// Latest offset recorded for a backlog key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlog {
    /// Sorted `key:value` tags.
    pub tags: Vec<String>,
    /// The offset.
    pub value: i64,
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::{Backlog, StatsBucket, StatsGroup, StatsPayload};
    use crate::key::TimestampType;

    #[test]
    fn json_field_names() {
        let payload = StatsPayload {
            env: "prod".into(),
            service: "svc".into(),
            stats: vec![StatsBucket {
                start: 10,
                duration: 10,
                stats: vec![StatsGroup {
                    edge_tags: vec!["type:edge-1".into()],
                    hash: 2,
                    parent_hash: 1,
                    pathway_latency: vec![1],
                    edge_latency: vec![2],
                    payload_size: vec![3],
                    timestamp_type: TimestampType::Origin,
                }],
                backlogs: vec![Backlog {
                    tags: vec!["partition:1".into()],
                    value: 4,
                }],
            }],
            tracer_version: "0.1.0".into(),
            lang: "rust".into(),
        };
        let actual: serde_json::Value =
            serde_json::from_slice(&payload.to_json().unwrap()).unwrap();
        assert_json_eq!(
            actual,
            json!({
                "env": "prod",
                "service": "svc",
                "stats": [{
                    "start": 10,
                    "duration": 10,
                    "stats": [{
                        "edgeTags": ["type:edge-1"],
                        "hash": 2,
                        "parentHash": 1,
                        "pathwayLatency": [1],
                        "edgeLatency": [2],
                        "payloadSize": [3],
                        "timestampType": "origin"
                    }],
                    "backlogs": [{"tags": ["partition:1"], "value": 4}]
                }],
                "tracerVersion": "0.1.0",
                "lang": "rust"
            })
        );
    }
}
