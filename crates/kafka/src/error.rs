use kafka_types::{error_description, KafkaTypesError};
use thiserror::Error;

/// Boxed cause carried by errors that wrap caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Kafka unavailable: {0}")]
    Unavailable(String),

    #[error("Broker error {code} ({}) for {topic}/{partition}", describe(.code))]
    BrokerResponse {
        topic: String,
        partition: i32,
        code: i16,
    },

    #[error("No response from broker for {topic}/{partition}")]
    MissingResponse { topic: String, partition: i32 },

    #[error("Unknown topic(s): {}", .0.join(", "))]
    UnknownTopic(Vec<String>),

    #[error("Unknown partitions {partitions:?} for topic {topic}")]
    UnknownPartitions { topic: String, partitions: Vec<i32> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selection: {0}")]
    Selection(#[from] KafkaTypesError),

    #[error("Consumer is not connected")]
    NotConnected,

    #[error("Consumer is closed")]
    Closed,

    #[error("Failed to process message at partition {partition} offset {offset}")]
    ProcessMessage {
        partition: i32,
        offset: i64,
        #[source]
        source: BoxError,
    },

    #[error("Consumer hook '{hook}' failed")]
    Hook {
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether the broker signalled transient unavailability, e.g. while
    /// reloading topic metadata.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

fn describe(code: &i16) -> &'static str {
    error_description(*code)
}

pub type Result<T> = std::result::Result<T, Error>;
