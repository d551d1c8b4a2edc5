//! Consumer group lag.
//!
//! Lag is reconciled from three independent offsets per partition: the high
//! watermark, the low watermark and the group's committed offset. A group with
//! no committed offset on a partition, including a group that does not exist,
//! is treated as having consumed nothing, so its lag is the whole retained log.

use std::collections::BTreeMap;

use kafka_types::{ConsumerPartitionOffsets, OffsetDistance, PartitionSelection, NO_OFFSET};

use crate::broker::BrokerClient;
use crate::error::Result;
use crate::offsets::{fetch_committed_offsets, fetch_watermarks};
use crate::validate::validate_partitions;

/// Committed offset and watermarks for every partition in `selection`, per topic.
pub async fn get_consumer_offsets_metadata(
    client: &dyn BrokerClient,
    group: &str,
    selection: &PartitionSelection,
    raise_on_error: bool,
) -> Result<BTreeMap<String, Vec<ConsumerPartitionOffsets>>> {
    let partitions = validate_partitions(client, selection, raise_on_error).await?;
    let watermarks = fetch_watermarks(client, &partitions, raise_on_error).await?;
    let committed = fetch_committed_offsets(client, group, &partitions).await?;

    let mut result = BTreeMap::new();
    for (topic, partitions) in watermarks {
        let group_offsets = committed.get(&topic);
        let offsets = partitions
            .into_values()
            .map(|w| ConsumerPartitionOffsets {
                current: group_offsets
                    .and_then(|offsets| offsets.get(&w.partition).copied().flatten())
                    .unwrap_or(NO_OFFSET),
                topic: w.topic,
                partition: w.partition,
                highmark: w.highmark,
                lowmark: w.lowmark,
            })
            .collect();
        result.insert(topic, offsets);
    }
    Ok(result)
}

/// Lag of `group` on `topic`, for `partitions` or for every partition of the topic.
pub async fn offset_distance(
    client: &dyn BrokerClient,
    group: &str,
    topic: &str,
    partitions: Option<&[i32]>,
) -> Result<OffsetDistance> {
    let selection = PartitionSelection::single(topic, partitions);
    let mut distances = topics_offset_distance(client, group, &selection).await?;
    Ok(distances.remove(topic).unwrap_or_default())
}

/// Lag of `group` per partition per topic for every partition in `selection`.
pub async fn topics_offset_distance(
    client: &dyn BrokerClient,
    group: &str,
    selection: &PartitionSelection,
) -> Result<BTreeMap<String, OffsetDistance>> {
    let metadata = get_consumer_offsets_metadata(client, group, selection, true).await?;
    Ok(metadata
        .into_iter()
        .map(|(topic, offsets)| {
            let distance = offsets.iter().map(|o| (o.partition, o.lag())).collect();
            (topic, distance)
        })
        .collect())
}
