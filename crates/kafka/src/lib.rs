//! Consumer-group runtime and offset lag monitoring for Kafka.
//!
//! Features:
//!
//! - Offset Monitoring: per-partition lag of a consumer group, plus watermarks
//!   and committed offsets for whole topics
//! - Offset Management: advance, rewind or set a group's committed offsets
//! - Pull Consumer: one topic, one group, explicit connect/commit/close
//! - Run Loop: drive a message processor with cooperative termination and
//!   guaranteed commit-and-close on the way out

/// Broker capabilities the rest of the crate is written against
pub mod broker;
pub mod config;

/// Pull consumer with explicit commits
///
/// Created from a consumer config and a [`broker::Connector`]; the librdkafka
/// connector is the default.
pub mod consumer;
pub mod error;
pub mod librdkafka;
pub mod monitoring;
pub mod offsets;
pub mod process_name;

/// Drives a [`runner::MessageProcessor`] over a [`consumer::SimpleConsumer`]
pub mod runner;
pub mod validate;

#[cfg(test)]
mod testing;

// Re-export main types for easy access
pub use broker::{BrokerClient, Connection, ConsumerHandle, Connector, Fetch, FetchedMessage};
pub use config::{ClusterConfig, ConsumerConfig, RebalanceCallback};
pub use consumer::SimpleConsumer;
pub use error::{Error, Result};
pub use kafka_types::{
    ConsumerPartitionOffsets, Message, OffsetCommitError, OffsetDistance, PartitionOffsets,
    PartitionSelection, TopicOffsets, TopicPartitions,
};
pub use librdkafka::{RdKafkaClient, RdKafkaConnector};
pub use monitoring::{get_consumer_offsets_metadata, offset_distance, topics_offset_distance};
pub use offsets::{
    advance_consumer_offsets, get_current_consumer_offsets, get_topics_watermarks,
    rewind_consumer_offsets, set_consumer_offsets, TopicWatermarks,
};
pub use process_name::{ProcessTitle, SystemProcessTitle};
pub use runner::{ConsumerRunner, MessageProcessor, TerminationHandle};
pub use validate::validate_partitions;
