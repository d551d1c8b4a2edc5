//! Watermark, committed-offset and lag records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::NO_OFFSET;

/// Resolved partitions per topic, both in ascending order.
pub type TopicPartitions = BTreeMap<String, Vec<i32>>;

/// An offset per partition per topic.
pub type TopicOffsets = BTreeMap<String, BTreeMap<i32, i64>>;

/// Lag per partition of one topic.
pub type OffsetDistance = BTreeMap<i32, i64>;

/// High and low watermarks of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffsets {
    pub topic: String,
    pub partition: i32,
    /// Next offset the broker will assign
    pub highmark: i64,
    /// Earliest offset still retained
    pub lowmark: i64,
}

/// A consumer group's position on one partition next to the partition's watermarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerPartitionOffsets {
    pub topic: String,
    pub partition: i32,
    /// Committed offset, or [`NO_OFFSET`] when the group has none
    pub current: i64,
    pub highmark: i64,
    pub lowmark: i64,
}

impl ConsumerPartitionOffsets {
    pub fn committed(&self) -> Option<i64> {
        (self.current != NO_OFFSET).then_some(self.current)
    }

    /// How far the group is behind the high watermark.
    ///
    /// Without a committed offset the whole retained log is outstanding. The
    /// result is not clamped: a negative value means the broker reported a
    /// committed offset past the high watermark.
    pub fn lag(&self) -> i64 {
        match self.committed() {
            Some(committed) => self.highmark - committed,
            None => self.highmark - self.lowmark,
        }
    }
}

/// A partition whose offset commit was rejected by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitError {
    pub topic: String,
    pub partition: i32,
    pub error: String,
}

impl OffsetCommitError {
    pub fn new(topic: impl Into<String>, partition: i32, error: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            error: error.into(),
        }
    }
}
