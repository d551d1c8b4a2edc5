use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use kafka_types::{
    error_code, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, OffsetRequest, OffsetResponse, EARLIEST_OFFSET_TIME, LATEST_OFFSET_TIME,
    NO_OFFSET,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use super::{broker_error_code, classify};
use crate::broker::BrokerClient;
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};

/// Metadata and offset RPCs over librdkafka.
///
/// librdkafka has no standalone offset API; watermarks and metadata go
/// through one group-less consumer, and group offsets through one consumer
/// per group id, created on first use. None of them ever subscribes.
pub struct RdKafkaClient {
    base: ClientConfig,
    timeout: Duration,
    metadata_consumer: Arc<BaseConsumer>,
    group_consumers: Mutex<HashMap<String, Arc<BaseConsumer>>>,
    topics: RwLock<BTreeMap<String, Vec<i32>>>,
}

impl RdKafkaClient {
    pub fn new(config: &ConsumerConfig) -> Result<Self> {
        let mut base = ClientConfig::new();
        base.set("bootstrap.servers", config.cluster.bootstrap_servers())
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "false")
            .set(
                "socket.timeout.ms",
                config.request_timeout.as_millis().to_string(),
            );

        let metadata_consumer: BaseConsumer = base
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create metadata client: {e}")))?;

        Ok(Self {
            base,
            timeout: config.request_timeout,
            metadata_consumer: Arc::new(metadata_consumer),
            group_consumers: Mutex::new(HashMap::new()),
            topics: RwLock::new(BTreeMap::new()),
        })
    }

    fn group_consumer(&self, group: &str) -> Result<Arc<BaseConsumer>> {
        let mut consumers = self
            .group_consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(consumer) = consumers.get(group) {
            return Ok(Arc::clone(consumer));
        }

        let consumer: BaseConsumer = self
            .base
            .clone()
            .set("group.id", group)
            .create()
            .map_err(|e| Error::Consumer(format!("Failed to create client for group {group}: {e}")))?;
        let consumer = Arc::new(consumer);
        consumers.insert(group.to_string(), Arc::clone(&consumer));
        Ok(consumer)
    }

    fn offset_for_time(
        consumer: &BaseConsumer,
        req: &OffsetRequest,
        timeout: Duration,
    ) -> rdkafka::error::KafkaResult<i64> {
        match req.time {
            LATEST_OFFSET_TIME => consumer
                .fetch_watermarks(&req.topic, req.partition, timeout)
                .map(|(_, high)| high),
            EARLIEST_OFFSET_TIME => consumer
                .fetch_watermarks(&req.topic, req.partition, timeout)
                .map(|(low, _)| low),
            time => {
                let mut tpl = TopicPartitionList::new();
                tpl.add_partition_offset(&req.topic, req.partition, Offset::Offset(time))?;
                let found = consumer.offsets_for_times(tpl, timeout)?;
                Ok(found
                    .elements()
                    .first()
                    .and_then(|elem| match elem.offset() {
                        Offset::Offset(offset) => Some(offset),
                        _ => None,
                    })
                    .unwrap_or(NO_OFFSET))
            }
        }
    }
}

#[async_trait]
impl BrokerClient for RdKafkaClient {
    async fn load_metadata_for_topics(&self, topics: &[String]) -> Result<()> {
        let consumer = Arc::clone(&self.metadata_consumer);
        let timeout = self.timeout;
        let metadata = tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout))
            .await?
            .map_err(classify)?;

        let mut loaded = BTreeMap::new();
        for topic in metadata.topics() {
            match topic.error().map(RDKafkaErrorCode::from) {
                None => {}
                Some(RDKafkaErrorCode::LeaderNotAvailable)
                    if topics.iter().any(|t| t == topic.name()) =>
                {
                    return Err(Error::Unavailable(format!(
                        "metadata for topic {} is being reloaded",
                        topic.name()
                    )));
                }
                Some(_) => continue,
            }
            let mut partitions: Vec<i32> = topic.partitions().iter().map(|p| p.id()).collect();
            partitions.sort_unstable();
            loaded.insert(topic.name().to_string(), partitions);
        }
        debug!("Loaded metadata for {} topics", loaded.len());

        *self.topics.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        Ok(())
    }

    fn topic_partitions(&self) -> BTreeMap<String, Vec<i32>> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn send_offset_request(
        &self,
        payloads: Vec<OffsetRequest>,
    ) -> Result<Vec<OffsetResponse>> {
        let consumer = Arc::clone(&self.metadata_consumer);
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || {
            payloads
                .into_iter()
                .map(|req| {
                    let (error, offsets) = match Self::offset_for_time(&consumer, &req, timeout) {
                        Ok(offset) => (error_code::NONE, vec![offset]),
                        Err(e) => match broker_error_code(&e) {
                            Some(code) => (code, Vec::new()),
                            None => return Err(classify(e)),
                        },
                    };
                    Ok(OffsetResponse {
                        topic: req.topic,
                        partition: req.partition,
                        error,
                        offsets,
                    })
                })
                .collect()
        })
        .await?
    }

    async fn send_offset_fetch_request(
        &self,
        group: &str,
        payloads: Vec<OffsetFetchRequest>,
    ) -> Result<Vec<OffsetFetchResponse>> {
        let consumer = self.group_consumer(group)?;
        let timeout = self.timeout;
        let mut tpl = TopicPartitionList::new();
        for req in &payloads {
            tpl.add_partition(&req.topic, req.partition);
        }

        let committed = tokio::task::spawn_blocking(move || consumer.committed_offsets(tpl, timeout))
            .await?;
        let committed = match committed {
            Ok(committed) => committed,
            Err(e) => {
                let code = broker_error_code(&e).ok_or_else(|| classify(e))?;
                return Ok(payloads
                    .into_iter()
                    .map(|req| OffsetFetchResponse {
                        topic: req.topic,
                        partition: req.partition,
                        offset: NO_OFFSET,
                        metadata: None,
                        error: code,
                    })
                    .collect());
            }
        };

        Ok(committed
            .elements()
            .iter()
            .map(|elem| {
                let offset = match elem.offset() {
                    Offset::Offset(offset) => offset,
                    _ => NO_OFFSET,
                };
                let error = match elem.error() {
                    Ok(()) => error_code::NONE,
                    Err(e) => broker_error_code(&e).unwrap_or(error_code::UNKNOWN_SERVER_ERROR),
                };
                OffsetFetchResponse {
                    topic: elem.topic().to_string(),
                    partition: elem.partition(),
                    offset,
                    metadata: Some(elem.metadata().to_string()).filter(|m| !m.is_empty()),
                    error,
                }
            })
            .collect())
    }

    async fn send_offset_commit_request(
        &self,
        group: &str,
        payloads: Vec<OffsetCommitRequest>,
    ) -> Result<Vec<OffsetCommitResponse>> {
        let consumer = self.group_consumer(group)?;
        let mut tpl = TopicPartitionList::new();
        for req in &payloads {
            tpl.add_partition_offset(&req.topic, req.partition, Offset::Offset(req.offset))?;
        }

        let committed = tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await?;
        let error = match committed {
            Ok(()) => error_code::NONE,
            Err(e) => broker_error_code(&e).ok_or_else(|| classify(e))?,
        };

        Ok(payloads
            .into_iter()
            .map(|req| OffsetCommitResponse {
                topic: req.topic,
                partition: req.partition,
                error,
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.group_consumers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Closed broker client");
        Ok(())
    }
}
