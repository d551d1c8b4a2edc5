use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::Stream;
use kafka_types::{validate_topic_name, Message, OffsetCommitRequest};
use tracing::{debug, info, warn};

use crate::broker::{Connection, Connector, Fetch};
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};
use crate::librdkafka::RdKafkaConnector;
use crate::process_name::{compose_process_name, ProcessTitle};

enum State {
    Disconnected,
    Connected(Connection),
    Closed,
}

/// Pull consumer for one topic in one consumer group.
///
/// Starts disconnected; [`SimpleConsumer::connect`] opens the broker client and
/// consumer handle, [`SimpleConsumer::close`] commits (when auto-commit is on)
/// and releases them. A closed consumer cannot be reconnected.
pub struct SimpleConsumer {
    topic: String,
    config: ConsumerConfig,
    partitions: Option<Vec<i32>>,
    connector: Arc<dyn Connector>,
    state: State,
}

impl fmt::Debug for SimpleConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Disconnected => "disconnected",
            State::Connected(_) => "connected",
            State::Closed => "closed",
        };
        f.debug_struct("SimpleConsumer")
            .field("topic", &self.topic)
            .field("group", &self.config.group_id)
            .field("partitions", &self.partitions)
            .field("state", &state)
            .finish()
    }
}

impl SimpleConsumer {
    /// Create a consumer that connects through `connector`.
    ///
    /// `partitions` restricts the consumer to those partition ids; `None`
    /// consumes every partition of the topic.
    pub fn new(
        topic: impl Into<String>,
        config: ConsumerConfig,
        partitions: Option<Vec<i32>>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let topic = topic.into();
        validate_topic_name(&topic)
            .map_err(|e| Error::InvalidArgument(format!("topic must be a single topic name: {e}")))?;

        if let Some(partitions) = &partitions {
            if let Some(bad) = partitions.iter().find(|p| **p < 0) {
                return Err(Error::InvalidArgument(format!(
                    "partition ids must be non-negative, got {bad}"
                )));
            }
            let mut unique = partitions.clone();
            unique.sort_unstable();
            unique.dedup();
            if unique.len() != partitions.len() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate partition ids in {partitions:?}"
                )));
            }
        }

        Ok(Self {
            topic,
            config,
            partitions,
            connector,
            state: State::Disconnected,
        })
    }

    /// Create a consumer backed by librdkafka.
    pub fn with_rdkafka(
        topic: impl Into<String>,
        config: ConsumerConfig,
        partitions: Option<Vec<i32>>,
    ) -> Result<Self> {
        Self::new(topic, config, partitions, Arc::new(RdKafkaConnector))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitions(&self) -> Option<&[i32]> {
        self.partitions.as_deref()
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    /// Next offset to read per partition, once connected.
    pub fn offsets(&self) -> Option<&BTreeMap<i32, i64>> {
        match &self.state {
            State::Connected(conn) => Some(conn.handle.offsets()),
            _ => None,
        }
    }

    /// Open the broker client and consumer handle. Connecting twice is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            State::Connected(_) => return Ok(()),
            State::Closed => return Err(Error::Closed),
            State::Disconnected => {}
        }

        let connection = self
            .connector
            .connect(&self.config, &self.topic, self.partitions.as_deref())
            .await?;
        info!(
            "Connected consumer for topic {} in group {} (partitions: {:?})",
            self.topic, self.config.group_id, self.partitions
        );
        self.state = State::Connected(connection);
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        match &mut self.state {
            State::Connected(conn) => Ok(conn),
            State::Disconnected => Err(Error::NotConnected),
            State::Closed => Err(Error::Closed),
        }
    }

    /// Fetch one message, telling a fetch timeout apart from the end of the
    /// message sequence.
    pub async fn fetch(&mut self) -> Result<Fetch<Message>> {
        let conn = self.connection()?;
        Ok(conn.handle.get_message().await?.map(Message::from))
    }

    /// Fetch one message, or `None` if none was available before the fetch
    /// timeout.
    pub async fn get_message(&mut self) -> Result<Option<Message>> {
        Ok(self.fetch().await?.into_message())
    }

    /// Stream of messages.
    ///
    /// Fetch timeouts are polled through. The stream ends when the message
    /// sequence ends, or after yielding an error. Dropping and recreating the
    /// stream resumes from the broker cursor, not from the beginning.
    pub fn messages(&mut self) -> impl Stream<Item = Result<Message>> + Send + '_ {
        futures::stream::try_unfold(self, |consumer| async move {
            loop {
                match consumer.fetch().await? {
                    Fetch::Message(message) => return Ok::<_, Error>(Some((message, consumer))),
                    Fetch::Timeout => continue,
                    Fetch::End => return Ok(None),
                }
            }
        })
    }

    /// Commit `partitions`, or every partition owned by this consumer.
    ///
    /// An empty list commits nothing. Failures are returned, not retried.
    pub async fn commit(&mut self, partitions: Option<&[i32]>) -> Result<()> {
        if partitions.is_some_and(|p| p.is_empty()) {
            return Ok(());
        }
        let conn = self.connection()?;
        conn.handle.commit(partitions).await
    }

    /// Commit exactly `message`'s offset for the group.
    ///
    /// Bypasses the consumer handle's own offset tracking. Returns `false`
    /// instead of an error when the broker rejects the commit, so callers can
    /// retry on their own schedule.
    pub async fn commit_message(&mut self, message: &Message) -> bool {
        let topic = self.topic.clone();
        let group = self.config.group_id.clone();
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Cannot commit offset {} of {topic}/{}: {e}", message.offset, message.partition);
                return false;
            }
        };

        let request = OffsetCommitRequest::new(&topic, message.partition, message.offset);
        match conn.client.send_offset_commit_request(&group, vec![request]).await {
            Ok(responses) if responses.iter().all(|r| r.error == kafka_types::error_code::NONE) => true,
            Ok(responses) => {
                warn!("Broker rejected offset commit for group {group}: {responses:?}");
                false
            }
            Err(e) => {
                warn!("Offset commit for group {group} failed: {e}");
                false
            }
        }
    }

    /// Commit (when auto-commit is on), then release the connection.
    ///
    /// The connection is released even if the commit fails; the commit error
    /// is returned afterwards. Closing a consumer that never connected only
    /// marks it closed. Closing twice is an error.
    pub async fn close(&mut self) -> Result<()> {
        self.shutdown(false).await
    }

    /// Commit every owned partition regardless of auto-commit, then release
    /// the connection.
    pub(crate) async fn commit_and_close(&mut self) -> Result<()> {
        self.shutdown(true).await
    }

    async fn shutdown(&mut self, force_commit: bool) -> Result<()> {
        let Connection { client, mut handle } =
            match std::mem::replace(&mut self.state, State::Closed) {
                State::Connected(conn) => conn,
                State::Disconnected => return Ok(()),
                State::Closed => return Err(Error::Closed),
            };

        let committed = if force_commit || handle.auto_commit() {
            handle.commit(None).await
        } else {
            Ok(())
        };
        if let Err(e) = &committed {
            warn!("Commit on close failed for topic {}: {e}", self.topic);
        }

        drop(handle);
        let released = client.close().await;
        debug!("Released connection for topic {}", self.topic);

        committed.and(released)
    }

    /// Set the process title to `"{current}-{topic}-{partitions}"`.
    pub fn set_process_name(&self, title: &dyn ProcessTitle) -> Result<()> {
        let name = compose_process_name(&title.current(), &self.topic, self.partitions());
        debug!("Setting process name to {name}");
        title.set(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::testing::{fetched, ConnectCall, FakeConnector};
    use futures::TryStreamExt;

    fn config() -> ConsumerConfig {
        ConsumerConfig::new(
            ClusterConfig::new(
                "cluster_type",
                "mycluster",
                vec!["test_broker:9292".to_string()],
                "test_cluster",
            ),
            "test_group",
            "test_client_id",
        )
    }

    fn consumer(connector: &FakeConnector, config: ConsumerConfig) -> SimpleConsumer {
        SimpleConsumer::new("test_topic", config, None, Arc::new(connector.clone())).unwrap()
    }

    #[test]
    fn test_topic_error() {
        let connector = Arc::new(FakeConnector::new(Vec::new()));
        let err = SimpleConsumer::new("['test_topic']", config(), None, connector).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_partitions_error() {
        let connector = Arc::new(FakeConnector::new(Vec::new()));
        let err = SimpleConsumer::new("test_topic", config(), Some(vec![1, 1]), connector.clone())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = SimpleConsumer::new("test_topic", config(), Some(vec![-1]), connector).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_connect() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        assert!(!consumer.is_connected());

        consumer.connect().await.unwrap();

        assert!(consumer.is_connected());
        assert_eq!(
            connector.calls(),
            vec![ConnectCall {
                brokers: vec!["test_broker:9292".to_string()],
                client_id: "test_client_id".to_string(),
                group: "test_group".to_string(),
                topic: "test_topic".to_string(),
                partitions: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_connect_with_partitions() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = SimpleConsumer::new(
            "test_topic",
            config(),
            Some(vec![0, 2]),
            Arc::new(connector.clone()),
        )
        .unwrap();

        consumer.connect().await.unwrap();

        assert_eq!(connector.calls()[0].partitions, Some(vec![0, 2]));
    }

    #[tokio::test]
    async fn test_get_message() {
        let connector = FakeConnector::new(vec![fetched(1, 12345, "test_key", "test_content")]);
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let message = consumer.get_message().await.unwrap();

        assert_eq!(
            message,
            Some(Message::new(
                1,
                12345,
                Some(b"test_key".to_vec()),
                b"test_content".to_vec()
            ))
        );
        assert_eq!(consumer.offsets().unwrap()[&1], 12346);
        assert_eq!(consumer.get_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_message_requires_connection() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());

        let err = consumer.get_message().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_null_value_becomes_empty() {
        let mut tombstone = fetched(0, 7, "k", "");
        tombstone.payload = None;
        let connector = FakeConnector::new(vec![tombstone]);
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let message = consumer.get_message().await.unwrap().unwrap();
        assert!(message.value.is_empty());
    }

    #[tokio::test]
    async fn test_messages_stream() {
        let connector = FakeConnector::new(vec![
            fetched(1, 12345, "key1", "value1"),
            fetched(0, 4, "key2", "value2"),
            fetched(1, 12346, "key1", "value3"),
        ]);
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let first: Vec<Message> = {
            let stream = consumer.messages();
            futures::pin_mut!(stream);
            let mut taken = Vec::new();
            for _ in 0..2 {
                taken.push(stream.try_next().await.unwrap().unwrap());
            }
            taken
        };
        assert_eq!(
            first.iter().map(|m| (m.partition, m.offset)).collect::<Vec<_>>(),
            vec![(1, 12345), (0, 4)]
        );

        // A new stream resumes where the previous one stopped.
        let stream = consumer.messages();
        futures::pin_mut!(stream);
        let next = stream.try_next().await.unwrap().unwrap();
        assert_eq!((next.partition, next.offset), (1, 12346));

        // The fake runs dry after three messages, which ends the stream.
        assert!(stream.try_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_distinguishes_timeout_from_end() {
        let connector = FakeConnector {
            idle_fetches: 1,
            ..FakeConnector::new(vec![fetched(0, 1, "k", "v")])
        };
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        assert_eq!(consumer.fetch().await.unwrap(), Fetch::Timeout);
        assert!(matches!(consumer.fetch().await.unwrap(), Fetch::Message(m) if m.offset == 1));
        assert_eq!(consumer.fetch().await.unwrap(), Fetch::End);
        assert_eq!(consumer.get_message().await.unwrap(), None);
    }

    #[test]
    fn test_debug_shows_topic_and_state() {
        let consumer = consumer(&FakeConnector::new(Vec::new()), config());
        let debug = format!("{consumer:?}");
        assert!(debug.contains("test_topic"));
        assert!(debug.contains("disconnected"));
    }

    #[tokio::test]
    async fn test_close() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        tokio_test::assert_ok!(consumer.close().await);

        assert_eq!(connector.commits(), vec![None]);
        assert_eq!(connector.broker.closes(), 1);
        assert_eq!(connector.journal.events(), vec!["commit", "close"]);
        let err = tokio_test::assert_err!(consumer.close().await);
        assert!(matches!(err, Error::Closed));
    }

    #[tokio::test]
    async fn test_close_no_commit() {
        let connector = FakeConnector::new(Vec::new());
        let config = ConsumerConfig {
            auto_commit: false,
            ..config()
        };
        let mut consumer = consumer(&connector, config);
        consumer.connect().await.unwrap();

        consumer.close().await.unwrap();

        assert!(connector.commits().is_empty());
        assert_eq!(connector.broker.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_connection_when_commit_fails() {
        let connector = FakeConnector {
            fail_commit: true,
            ..FakeConnector::new(Vec::new())
        };
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let err = consumer.close().await.unwrap_err();

        assert!(matches!(err, Error::Consumer(_)));
        assert_eq!(connector.broker.closes(), 1);
        assert!(!consumer.is_connected());
    }

    #[tokio::test]
    async fn test_closed_consumer_cannot_reconnect() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        consumer.close().await.unwrap();

        assert!(matches!(consumer.connect().await.unwrap_err(), Error::Closed));
        assert_eq!(connector.broker.closes(), 0);
    }

    #[tokio::test]
    async fn test_commit_all_partitions() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        consumer.commit(None).await.unwrap();

        assert_eq!(connector.commits(), vec![None]);
    }

    #[tokio::test]
    async fn test_commit_few_partitions() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        consumer.commit(Some(&[1, 2])).await.unwrap();
        consumer.commit(Some(&[])).await.unwrap();

        assert_eq!(connector.commits(), vec![Some(vec![1, 2])]);
    }

    #[tokio::test]
    async fn test_commit_message() {
        let connector = FakeConnector::new(Vec::new());
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let committed = consumer
            .commit_message(&Message::new(0, 100, Some(b"mykey".to_vec()), b"myvalue".to_vec()))
            .await;

        assert!(committed);
        assert_eq!(
            connector.broker.commit_requests(),
            vec![(
                "test_group".to_string(),
                vec![OffsetCommitRequest::new("test_topic", 0, 100)]
            )]
        );
    }

    #[tokio::test]
    async fn test_commit_message_error() {
        let connector = FakeConnector::new(Vec::new());
        connector.broker.set_commit_unavailable();
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let committed = consumer
            .commit_message(&Message::new(0, 100, Some(b"mykey".to_vec()), b"myvalue".to_vec()))
            .await;

        assert!(!committed);
    }

    #[tokio::test]
    async fn test_commit_message_rejected_by_broker() {
        let connector = FakeConnector::new(Vec::new());
        connector.broker.set_commit_error();
        let mut consumer = consumer(&connector, config());
        consumer.connect().await.unwrap();

        let committed = consumer
            .commit_message(&Message::new(0, 100, None, Vec::new()))
            .await;

        assert!(!committed);
    }
}
