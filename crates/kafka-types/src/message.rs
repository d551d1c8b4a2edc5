//! Kafka message types.
//!
//! The record handed to callers of the pull/commit consumer. Keys and values
//! are passed through verbatim; decoding them is the caller's business.

use serde::{Deserialize, Serialize};

/// A message read from one partition of the consumer's topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Kafka partition number
    pub partition: i32,
    /// Offset the message was read from
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message value. A tombstone (null value) is represented as an empty vector.
    pub value: Vec<u8>,
}

impl Message {
    pub fn new(partition: i32, offset: i64, key: Option<Vec<u8>>, value: Vec<u8>) -> Self {
        Self {
            partition,
            offset,
            key,
            value,
        }
    }
}
