//! Error types for kafka-types crate.

use thiserror::Error;

/// Errors that can occur while building shared types from user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KafkaTypesError {
    #[error("Empty topic selection")]
    EmptySelection,

    #[error("Invalid topic name: '{0}'")]
    InvalidTopic(String),

    #[error("Invalid partition '{partition}' for topic {topic}")]
    InvalidPartition { topic: String, partition: String },

    #[error(
        "Selection mixes whole topics and explicit partitions; \
         use either a topic list or a topic to partitions mapping"
    )]
    MixedSelection,
}

/// Result type alias for kafka-types operations.
pub type Result<T> = std::result::Result<T, KafkaTypesError>;
