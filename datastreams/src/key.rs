// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Composite keys identifying aggregated values inside a time bucket.

use hashbrown::Equivalent;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::point::{KafkaOffset, OffsetType};

/// Which time window an observation is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampType {
    /// The window in which the pathway started.
    Origin,
    /// The window in which the observation was made.
    Current,
}

/// Identity of the sketches aggregated for one edge within a time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregationKey {
    /// Pathway identity.
    pub hash: u64,
    /// Upstream pathway identity.
    pub parent_hash: u64,
    /// Edge tags, in the order the producer supplied them.
    pub edge_tags: Vec<String>,
    /// Window attribution.
    pub timestamp_type: TimestampType,
}

// Field order and types mirror `AggregationKey` so both hash identically: `&[String]` and
// `Vec<String>` feed the hasher the same way.
#[derive(Debug, Clone, Copy, Hash)]
pub(crate) struct AggregationKeyRef<'a> {
    pub(crate) hash: u64,
    pub(crate) parent_hash: u64,
    pub(crate) edge_tags: &'a [String],
    pub(crate) timestamp_type: TimestampType,
}

impl Equivalent<AggregationKey> for AggregationKeyRef<'_> {
    fn equivalent(&self, key: &AggregationKey) -> bool {
        self.hash == key.hash
            && self.parent_hash == key.parent_hash
            && self.timestamp_type == key.timestamp_type
            && self.edge_tags == key.edge_tags.as_slice()
    }
}

impl From<&AggregationKeyRef<'_>> for AggregationKey {
    fn from(key: &AggregationKeyRef<'_>) -> Self {
        Self {
            hash: key.hash,
            parent_hash: key.parent_hash,
            edge_tags: key.edge_tags.to_vec(),
            timestamp_type: key.timestamp_type,
        }
    }
}

/// Identity of a backlog value within a time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BacklogKey {
    /// Topic.
    pub topic: String,
    /// Partition.
    pub partition: i32,
    /// Consumer group, absent for produce offsets.
    pub group: Option<String>,
    /// Commit or produce.
    pub offset_type: OffsetType,
}

impl BacklogKey {
    /// Split an offset into its key and value.
    pub fn from_offset(offset: KafkaOffset) -> (Self, i64) {
        let KafkaOffset {
            offset,
            topic,
            partition,
            group,
            offset_type,
        } = offset;
        let key = Self {
            topic,
            partition,
            group,
            offset_type,
        };
        (key, offset)
    }

    /// Sorted `key:value` tags describing this backlog.
    ///
    /// ```
    /// use datastreams::{BacklogKey, KafkaOffset};
    ///
    /// let (key, _) = BacklogKey::from_offset(KafkaOffset::produce("orders", 3, 10));
    /// assert_eq!(key.tags(), ["partition:3", "topic:orders", "type:kafka_produce"]);
    /// ```
    pub fn tags(&self) -> Vec<String> {
        let mut tags: SmallVec<[String; 4]> = SmallVec::new();
        if let Some(group) = &self.group {
            tags.push(format!("consumer_group:{group}"));
        }
        tags.push(format!("partition:{}", self.partition));
        tags.push(format!("topic:{}", self.topic));
        tags.push(self.offset_type.tag().to_owned());
        tags.sort_unstable();
        tags.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use assert2::check;

    use super::{AggregationKey, AggregationKeyRef, BacklogKey, TimestampType};
    use crate::point::KafkaOffset;

    #[test]
    fn borrowed_key_hashes_like_owned() {
        let tags = vec!["type:kafka".to_owned(), "topic:a".to_owned()];
        let borrowed = AggregationKeyRef {
            hash: 7,
            parent_hash: 3,
            edge_tags: &tags,
            timestamp_type: TimestampType::Current,
        };
        let owned = AggregationKey::from(&borrowed);
        let state = hashbrown::DefaultHashBuilder::default();
        check!(state.hash_one(borrowed) == state.hash_one(&owned));

        let mut map = hashbrown::HashMap::new();
        map.insert(owned, 1);
        check!(map.get(&borrowed) == Some(&1));
        let other = AggregationKeyRef {
            timestamp_type: TimestampType::Origin,
            ..borrowed
        };
        check!(map.get(&other) == None);
    }

    #[test]
    fn commit_tags_include_group() {
        let (key, value) = BacklogKey::from_offset(KafkaOffset::commit("topic1", 1, "group1", 5));
        check!(value == 5);
        check!(
            key.tags()
                == [
                    "consumer_group:group1",
                    "partition:1",
                    "topic:topic1",
                    "type:kafka_commit"
                ]
        );
    }

    #[test]
    fn absent_group_is_omitted() {
        let (key, _) = BacklogKey::from_offset(KafkaOffset::produce("topic1", 1, 5));
        check!(!key.tags().iter().any(|t| t.starts_with("consumer_group:")));
    }

    #[test]
    fn timestamp_type_serializes_lowercase() {
        check!(serde_json::to_string(&TimestampType::Origin).unwrap() == "\"origin\"");
        check!(serde_json::to_string(&TimestampType::Current).unwrap() == "\"current\"");
    }
}
