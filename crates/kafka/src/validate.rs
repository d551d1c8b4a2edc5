//! Resolve a caller's partition selection against live broker metadata.

use std::collections::BTreeSet;

use kafka_types::{PartitionSelection, TopicPartitions};
use tracing::debug;

use crate::broker::BrokerClient;
use crate::error::{Error, Result};

/// Load metadata for `topics`, retrying exactly once if the broker reports
/// it unavailable.
///
/// Brokers close idle connections, in which case the second call succeeds.
/// If it fails again the broker is down and the error is returned.
pub async fn load_metadata(client: &dyn BrokerClient, topics: &[String]) -> Result<()> {
    match client.load_metadata_for_topics(topics).await {
        Err(e) if e.is_unavailable() => {
            debug!("First call to kafka for loading metadata failed ({e}), trying again");
            client.load_metadata_for_topics(topics).await
        }
        other => other,
    }
}

/// Refresh metadata and resolve `selection` to concrete partitions.
///
/// With `raise_on_error` an unknown topic fails with [`Error::UnknownTopic`]
/// and an unknown partition of a known topic with [`Error::UnknownPartitions`],
/// even if the rest of the selection is valid. Without it, unknown topics and
/// partitions are dropped, as is any topic left with no partitions.
pub async fn validate_partitions(
    client: &dyn BrokerClient,
    selection: &PartitionSelection,
    raise_on_error: bool,
) -> Result<TopicPartitions> {
    load_metadata(client, &selection.topic_names()).await?;
    check_selection(client, selection, raise_on_error)
}

/// Resolve `selection` against the metadata already loaded in `client`.
pub fn check_selection(
    client: &dyn BrokerClient,
    selection: &PartitionSelection,
    raise_on_error: bool,
) -> Result<TopicPartitions> {
    let topics = selection.topic_names();
    let unknown: Vec<String> = topics
        .iter()
        .filter(|topic| !client.has_metadata_for_topic(topic))
        .cloned()
        .collect();
    if raise_on_error && !unknown.is_empty() {
        return Err(Error::UnknownTopic(unknown));
    }

    let mut resolved = TopicPartitions::new();
    for topic in topics.into_iter().filter(|t| !unknown.contains(t)) {
        let live: BTreeSet<i32> = client
            .get_partition_ids_for_topic(&topic)
            .into_iter()
            .collect();

        let partitions: Vec<i32> = match selection {
            PartitionSelection::Topics(_) => live.into_iter().collect(),
            PartitionSelection::Partitions(requested) => {
                let requested: BTreeSet<i32> = requested
                    .get(&topic)
                    .map(|p| p.iter().copied().collect())
                    .unwrap_or_default();
                let missing: Vec<i32> = requested.difference(&live).copied().collect();
                if raise_on_error && !missing.is_empty() {
                    return Err(Error::UnknownPartitions {
                        topic,
                        partitions: missing,
                    });
                }
                requested.intersection(&live).copied().collect()
            }
        };

        if !partitions.is_empty() {
            resolved.insert(topic, partitions);
        }
    }

    Ok(resolved)
}
