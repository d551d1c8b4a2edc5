//! kafka-group CLI library
//!
//! Command-line options and output helpers for the `kafka-group` binary.
//!
//! # CLI Usage
//!
//! ```bash
//! # Lag of a group on every partition of two topics
//! kafka-group lag --group billing --topic orders --topic refunds
//!
//! # Lag on selected partitions only
//! kafka-group lag --group billing --topic orders:0,1
//!
//! # Move a group to the end of a topic
//! kafka-group advance --group billing --topic orders
//!
//! # Print messages as JSON until Ctrl-C
//! kafka-group tail --group debug --topic orders --partition 0
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use kafka_group::{ClusterConfig, ConsumerConfig};
use kafka_types::{PartitionSelection, TopicOffsets};

pub mod config;
pub mod output;
pub mod tail;

#[derive(Parser, Clone, Debug)]
pub struct ClusterOpts {
    /// Kafka brokers (comma-separated host:port list)
    #[arg(
        long,
        default_value = "localhost:9092",
        env = "KAFKA_BROKERS",
        value_delimiter = ','
    )]
    pub brokers: Vec<String>,

    /// Client ID reported to the brokers
    #[arg(long, default_value = "kafka-group", env = "KAFKA_CLIENT_ID")]
    pub client_id: String,

    /// Timeout for metadata and offset requests (e.g. "500ms", "30s", "1m")
    #[arg(long, default_value = "30s", value_parser = config::parse_duration)]
    pub request_timeout: Duration,
}

impl ClusterOpts {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            broker_list: self.brokers.clone(),
            ..Default::default()
        }
    }

    /// Consumer config for `group` with the defaults for everything the CLI
    /// does not expose.
    pub fn consumer_config(&self, group: &str) -> ConsumerConfig {
        ConsumerConfig {
            request_timeout: self.request_timeout,
            ..ConsumerConfig::new(self.cluster_config(), group, &self.client_id)
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct GroupOpts {
    /// Consumer group ID
    #[arg(long, env = "KAFKA_GROUP_ID")]
    pub group: String,
}

#[derive(Parser, Clone, Debug)]
pub struct SelectionOpts {
    /// Topic to include, as NAME for all partitions or NAME:0,1,2 for some
    /// (can specify multiple; all of one form)
    #[arg(long = "topic", value_name = "TOPIC", required = true)]
    pub topics: Vec<String>,
}

impl SelectionOpts {
    pub fn selection(&self) -> anyhow::Result<PartitionSelection> {
        PartitionSelection::parse(&self.topics).context("Invalid --topic selection")
    }
}

/// Only for commands that can skip unknown topics and partitions.
#[derive(Parser, Clone, Debug)]
pub struct LenientOpts {
    /// Skip unknown topics and partitions instead of failing
    #[arg(long)]
    pub lenient: bool,
}

impl LenientOpts {
    pub fn raise_on_error(&self) -> bool {
        !self.lenient
    }
}

/// Parse `TOPIC:PARTITION=OFFSET` assignments into per-topic offsets.
pub fn parse_offset_assignments<S: AsRef<str>>(args: &[S]) -> anyhow::Result<TopicOffsets> {
    let mut offsets: TopicOffsets = BTreeMap::new();
    for arg in args {
        let arg = arg.as_ref();
        let (target, offset) = arg
            .split_once('=')
            .with_context(|| format!("Expected TOPIC:PARTITION=OFFSET, got {arg}"))?;
        let (topic, partition) = target
            .rsplit_once(':')
            .with_context(|| format!("Expected TOPIC:PARTITION=OFFSET, got {arg}"))?;
        let partition: i32 = partition
            .trim()
            .parse()
            .with_context(|| format!("Invalid partition in {arg}"))?;
        let offset: i64 = offset
            .trim()
            .parse()
            .with_context(|| format!("Invalid offset in {arg}"))?;
        if partition < 0 || offset < 0 {
            anyhow::bail!("Partition and offset must be non-negative in {arg}");
        }
        offsets
            .entry(topic.trim().to_string())
            .or_default()
            .insert(partition, offset);
    }
    Ok(offsets)
}
