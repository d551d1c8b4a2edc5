use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{classify, RdKafkaClient};
use crate::broker::{Connection, ConsumerHandle, Connector, Fetch, FetchedMessage};
use crate::config::{ConsumerConfig, RebalanceCallback};
use crate::error::{Error, Result};

/// Forwards librdkafka rebalance events to the configured callbacks.
#[derive(Default, Clone)]
pub struct RebalanceContext {
    pre: Option<RebalanceCallback>,
    post: Option<RebalanceCallback>,
}

impl RebalanceContext {
    pub fn new(config: &ConsumerConfig) -> Self {
        Self {
            pre: config.pre_rebalance_callback.clone(),
            post: config.post_rebalance_callback.clone(),
        }
    }
}

fn rebalance_partitions(rebalance: &Rebalance<'_>) -> Vec<i32> {
    match rebalance {
        Rebalance::Assign(tpl) | Rebalance::Revoke(tpl) => {
            tpl.elements().iter().map(|elem| elem.partition()).collect()
        }
        Rebalance::Error(_) => Vec::new(),
    }
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        debug!("Pre rebalance: {rebalance:?}");
        if let Some(callback) = &self.pre {
            callback(&rebalance_partitions(rebalance));
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        debug!("Post rebalance: {rebalance:?}");
        if let Some(callback) = &self.post {
            callback(&rebalance_partitions(rebalance));
        }
    }
}

/// Consumer on one topic, either subscribed through the group or assigned a
/// fixed set of partitions.
///
/// Offsets are tracked locally and only committed on request; librdkafka's
/// own auto-commit is always off.
pub struct RdKafkaConsumerHandle {
    consumer: StreamConsumer<RebalanceContext>,
    topic: String,
    offsets: BTreeMap<i32, i64>,
    auto_commit: bool,
    fetch_timeout: Duration,
}

impl RdKafkaConsumerHandle {
    pub fn new(config: &ConsumerConfig, topic: &str, partitions: Option<&[i32]>) -> Result<Self> {
        let consumer: StreamConsumer<RebalanceContext> = ClientConfig::new()
            .set("bootstrap.servers", config.cluster.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.partition.eof", "false")
            .create_with_context(RebalanceContext::new(config))
            .map_err(|e| Error::Consumer(format!("Failed to create consumer: {e}")))?;

        match partitions {
            Some(partitions) => {
                let mut tpl = TopicPartitionList::new();
                for partition in partitions {
                    tpl.add_partition_offset(topic, *partition, Offset::Stored)?;
                }
                consumer
                    .assign(&tpl)
                    .map_err(|e| Error::Consumer(format!("Failed to assign partitions: {e}")))?;
            }
            None => consumer
                .subscribe(&[topic])
                .map_err(|e| Error::Consumer(format!("Failed to subscribe to topic: {e}")))?,
        }

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            offsets: BTreeMap::new(),
            auto_commit: config.auto_commit,
            fetch_timeout: config.fetch_timeout,
        })
    }
}

#[async_trait]
impl ConsumerHandle for RdKafkaConsumerHandle {
    async fn get_message(&mut self) -> Result<Fetch<FetchedMessage>> {
        let fetched = match tokio::time::timeout(self.fetch_timeout, self.consumer.recv()).await {
            Err(_) => return Ok(Fetch::Timeout),
            Ok(Err(e)) => return Err(classify(e)),
            Ok(Ok(msg)) => FetchedMessage {
                partition: msg.partition(),
                offset: msg.offset(),
                key: msg.key().map(<[u8]>::to_vec),
                payload: msg.payload().map(<[u8]>::to_vec),
            },
        };
        self.offsets.insert(fetched.partition, fetched.offset + 1);
        Ok(Fetch::Message(fetched))
    }

    async fn commit(&mut self, partitions: Option<&[i32]>) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for (partition, offset) in &self.offsets {
            if partitions.is_some_and(|wanted| !wanted.contains(partition)) {
                continue;
            }
            tpl.add_partition_offset(&self.topic, *partition, Offset::Offset(*offset))?;
        }
        if tpl.count() == 0 {
            return Ok(());
        }

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| Error::Consumer(format!("Failed to commit offsets: {e}")))?;
        debug!("Committed {} partitions of {}", tpl.count(), self.topic);
        Ok(())
    }

    fn offsets(&self) -> &BTreeMap<i32, i64> {
        &self.offsets
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }
}

/// Connects consumers through librdkafka.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdKafkaConnector;

#[async_trait]
impl Connector for RdKafkaConnector {
    async fn connect(
        &self,
        config: &ConsumerConfig,
        topic: &str,
        partitions: Option<&[i32]>,
    ) -> Result<Connection> {
        let client = RdKafkaClient::new(config)?;
        let handle = RdKafkaConsumerHandle::new(config, topic, partitions)?;
        info!(
            "Opened librdkafka consumer on {topic} for group {} via {}",
            config.group_id,
            config.cluster.bootstrap_servers()
        );
        Ok(Connection {
            client: Box::new(client),
            handle: Box::new(handle),
        })
    }
}
