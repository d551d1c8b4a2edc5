//! Kafka type library for kafka-group.
//!
//! This crate holds the data types shared between the consumer-group runtime
//! (`kafka-group`) and its command-line front end. Nothing in here talks to a
//! broker.
//!
//! # Modules
//!
//! - [`message`] - The typed message produced by the pull/commit consumer
//! - [`selection`] - Topic and partition selections accepted by the offset tools
//! - [`protocol`] - Offset request/response records and Kafka error codes
//! - [`offsets`] - Watermark, committed-offset and lag result records
//! - [`error`] - Error types for selection parsing

pub mod error;
pub mod message;
pub mod offsets;
pub mod protocol;
pub mod selection;

// Re-export main types for convenient access
pub use error::{KafkaTypesError, Result};
pub use message::Message;
pub use offsets::{
    ConsumerPartitionOffsets, OffsetCommitError, OffsetDistance, PartitionOffsets,
    TopicPartitions, TopicOffsets,
};
pub use protocol::{
    error_code, error_description, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, OffsetRequest, OffsetResponse, EARLIEST_OFFSET_TIME, LATEST_OFFSET_TIME,
    NO_OFFSET,
};
pub use selection::{validate_topic_name, PartitionSelection};
