//! Capabilities the runtime needs from a broker client.
//!
//! The offset tools and the consumer only ever talk to Kafka through these
//! traits, so they run the same against librdkafka and against an in-memory
//! broker in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kafka_types::{
    Message, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest, OffsetFetchResponse,
    OffsetRequest, OffsetResponse,
};

use crate::config::ConsumerConfig;
use crate::error::Result;

/// Metadata and offset RPCs against a cluster.
///
/// Response lists carry a per-partition Kafka error code; only transport
/// failures are returned as `Err`. Metadata accessors read whatever the last
/// successful [`BrokerClient::load_metadata_for_topics`] stored.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Refresh topic metadata.
    ///
    /// Returns [`crate::Error::Unavailable`] when the broker is reloading
    /// metadata or cannot be reached.
    async fn load_metadata_for_topics(&self, topics: &[String]) -> Result<()>;

    /// Known partitions per topic.
    fn topic_partitions(&self) -> BTreeMap<String, Vec<i32>>;

    fn has_metadata_for_topic(&self, topic: &str) -> bool {
        self.topic_partitions().contains_key(topic)
    }

    /// Known partition ids of `topic`; empty when the topic is unknown.
    fn get_partition_ids_for_topic(&self, topic: &str) -> Vec<i32> {
        self.topic_partitions()
            .remove(topic)
            .unwrap_or_default()
    }

    async fn send_offset_request(&self, payloads: Vec<OffsetRequest>)
        -> Result<Vec<OffsetResponse>>;

    async fn send_offset_fetch_request(
        &self,
        group: &str,
        payloads: Vec<OffsetFetchRequest>,
    ) -> Result<Vec<OffsetFetchResponse>>;

    async fn send_offset_commit_request(
        &self,
        group: &str,
        payloads: Vec<OffsetCommitRequest>,
    ) -> Result<Vec<OffsetCommitResponse>>;

    /// Release the connection.
    async fn close(&self) -> Result<()>;
}

/// A message as the broker consumer hands it out, before it becomes a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl From<FetchedMessage> for Message {
    fn from(fetched: FetchedMessage) -> Self {
        Message {
            partition: fetched.partition,
            offset: fetched.offset,
            key: fetched.key,
            value: fetched.payload.unwrap_or_default(),
        }
    }
}

/// Outcome of one fetch from a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<M> {
    Message(M),
    /// Nothing arrived before the fetch timeout; later fetches may succeed.
    Timeout,
    /// The message sequence is exhausted; no later fetch will succeed.
    End,
}

impl<M> Fetch<M> {
    pub fn map<N>(self, f: impl FnOnce(M) -> N) -> Fetch<N> {
        match self {
            Fetch::Message(message) => Fetch::Message(f(message)),
            Fetch::Timeout => Fetch::Timeout,
            Fetch::End => Fetch::End,
        }
    }

    pub fn into_message(self) -> Option<M> {
        match self {
            Fetch::Message(message) => Some(message),
            Fetch::Timeout | Fetch::End => None,
        }
    }
}

/// A broker consumer scoped to one topic and one consumer group.
#[async_trait]
pub trait ConsumerHandle: Send {
    /// Fetch the next message.
    ///
    /// Broker-backed handles report [`Fetch::Timeout`] when the fetch timeout
    /// elapses; only finite sources ever report [`Fetch::End`].
    async fn get_message(&mut self) -> Result<Fetch<FetchedMessage>>;

    /// Commit the tracked offsets of `partitions`, or of every owned partition.
    async fn commit(&mut self, partitions: Option<&[i32]>) -> Result<()>;

    /// Next offset to read, per partition seen so far.
    fn offsets(&self) -> &BTreeMap<i32, i64>;

    fn auto_commit(&self) -> bool;
}

/// A live client plus the consumer handle built on it.
pub struct Connection {
    pub client: Box<dyn BrokerClient>,
    pub handle: Box<dyn ConsumerHandle>,
}

/// Builds connections for a consumer.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the cluster in `config` and open a consumer on `topic` for
    /// `config.group_id`, limited to `partitions` when given.
    async fn connect(
        &self,
        config: &ConsumerConfig,
        topic: &str,
        partitions: Option<&[i32]>,
    ) -> Result<Connection>;
}
