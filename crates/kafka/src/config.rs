//! Cluster and consumer configuration.
//!
//! Both are plain value objects: the consumer clones what it needs and never
//! writes back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with the partition ids involved in a rebalance.
pub type RebalanceCallback = Arc<dyn Fn(&[i32]) + Send + Sync>;

/// Where a Kafka cluster lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Cluster type, e.g. "standard" or "scribe"
    pub cluster_type: String,
    /// Cluster name
    pub name: String,
    /// Bootstrap brokers as `host:port`
    pub broker_list: Vec<String>,
    /// Zookeeper connect string (informational; the broker client never uses it)
    pub zookeeper: String,
}

impl ClusterConfig {
    pub fn new(
        cluster_type: impl Into<String>,
        name: impl Into<String>,
        broker_list: Vec<String>,
        zookeeper: impl Into<String>,
    ) -> Self {
        Self {
            cluster_type: cluster_type.into(),
            name: name.into(),
            broker_list,
            zookeeper: zookeeper.into(),
        }
    }

    /// Broker list in the comma-separated form librdkafka expects.
    pub fn bootstrap_servers(&self) -> String {
        self.broker_list.join(",")
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_type: "standard".to_string(),
            name: "local".to_string(),
            broker_list: vec!["localhost:9092".to_string()],
            zookeeper: "localhost:2181".to_string(),
        }
    }
}

/// Configuration for a consumer in a consumer group
#[derive(Clone)]
pub struct ConsumerConfig {
    pub cluster: ClusterConfig,
    /// Consumer group ID
    pub group_id: String,
    /// Client ID reported to the brokers
    pub client_id: String,
    /// Commit all owned partitions when the consumer is closed
    pub auto_commit: bool,
    /// Quiet period a group partitioner waits for before acting on membership changes.
    ///
    /// Carried for group partitioners; the simple consumer has a fixed
    /// assignment and does not consult it.
    pub partitioner_cooldown: Duration,
    /// How long a single fetch waits for a message before reporting "no message"
    pub fetch_timeout: Duration,
    /// Timeout for metadata and offset requests
    pub request_timeout: Duration,
    /// Where to start when the group has no committed offset ("earliest" or "latest")
    pub auto_offset_reset: String,
    /// Called with the partitions about to be revoked or assigned
    pub pre_rebalance_callback: Option<RebalanceCallback>,
    /// Called with the partitions that were revoked or assigned
    pub post_rebalance_callback: Option<RebalanceCallback>,
}

impl ConsumerConfig {
    pub fn new(
        cluster: ClusterConfig,
        group_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            group_id: group_id.into(),
            client_id: client_id.into(),
            ..Default::default()
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            group_id: "kafka-group-consumer".to_string(),
            client_id: "kafka-group".to_string(),
            auto_commit: true,
            partitioner_cooldown: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            auto_offset_reset: "earliest".to_string(),
            pre_rebalance_callback: None,
            post_rebalance_callback: None,
        }
    }
}

impl fmt::Debug for ConsumerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerConfig")
            .field("cluster", &self.cluster)
            .field("group_id", &self.group_id)
            .field("client_id", &self.client_id)
            .field("auto_commit", &self.auto_commit)
            .field("partitioner_cooldown", &self.partitioner_cooldown)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("auto_offset_reset", &self.auto_offset_reset)
            .field(
                "pre_rebalance_callback",
                &self.pre_rebalance_callback.is_some(),
            )
            .field(
                "post_rebalance_callback",
                &self.post_rebalance_callback.is_some(),
            )
            .finish()
    }
}
