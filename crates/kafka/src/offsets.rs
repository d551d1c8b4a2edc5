//! Watermarks, committed offsets and consumer offset administration.

use std::collections::{BTreeMap, HashMap};

use kafka_types::{
    error_code, error_description, OffsetCommitError, OffsetCommitRequest, OffsetFetchRequest,
    OffsetRequest, PartitionOffsets, PartitionSelection, TopicOffsets, TopicPartitions,
    NO_OFFSET,
};
use tracing::{debug, warn};

use crate::broker::BrokerClient;
use crate::error::{Error, Result};
use crate::validate::validate_partitions;

/// Watermarks per partition per topic.
pub type TopicWatermarks = BTreeMap<String, BTreeMap<i32, PartitionOffsets>>;

/// Committed offset per partition per topic; `None` when the group has none.
pub(crate) type CommittedOffsets = BTreeMap<String, BTreeMap<i32, Option<i64>>>;

/// High and low watermarks for every partition in `selection`.
pub async fn get_topics_watermarks(
    client: &dyn BrokerClient,
    selection: &PartitionSelection,
    raise_on_error: bool,
) -> Result<TopicWatermarks> {
    let partitions = validate_partitions(client, selection, raise_on_error).await?;
    fetch_watermarks(client, &partitions, raise_on_error).await
}

/// The group's committed offset for every partition in `selection`.
///
/// Partitions without a committed offset report [`NO_OFFSET`].
pub async fn get_current_consumer_offsets(
    client: &dyn BrokerClient,
    group: &str,
    selection: &PartitionSelection,
    raise_on_error: bool,
) -> Result<TopicOffsets> {
    let partitions = validate_partitions(client, selection, raise_on_error).await?;
    let committed = fetch_committed_offsets(client, group, &partitions).await?;
    Ok(committed
        .into_iter()
        .map(|(topic, offsets)| {
            let offsets = offsets
                .into_iter()
                .map(|(partition, offset)| (partition, offset.unwrap_or(NO_OFFSET)))
                .collect();
            (topic, offsets)
        })
        .collect())
}

/// Move the group to the high watermark of every selected partition.
///
/// Returns the partitions whose commit the broker rejected.
pub async fn advance_consumer_offsets(
    client: &dyn BrokerClient,
    group: &str,
    selection: &PartitionSelection,
) -> Result<Vec<OffsetCommitError>> {
    let partitions = validate_partitions(client, selection, true).await?;
    let watermarks = fetch_watermarks(client, &partitions, true).await?;
    let offsets = pick_watermark(&watermarks, |w| w.highmark);
    commit_offsets(client, group, &offsets).await
}

/// Move the group to the low watermark of every selected partition.
///
/// Returns the partitions whose commit the broker rejected.
pub async fn rewind_consumer_offsets(
    client: &dyn BrokerClient,
    group: &str,
    selection: &PartitionSelection,
) -> Result<Vec<OffsetCommitError>> {
    let partitions = validate_partitions(client, selection, true).await?;
    let watermarks = fetch_watermarks(client, &partitions, true).await?;
    let offsets = pick_watermark(&watermarks, |w| w.lowmark);
    commit_offsets(client, group, &offsets).await
}

/// Commit explicit offsets for the group.
///
/// Unknown topics and partitions fail the call with `raise_on_error`, and are
/// skipped without it. Returns the partitions whose commit the broker rejected.
pub async fn set_consumer_offsets(
    client: &dyn BrokerClient,
    group: &str,
    new_offsets: &TopicOffsets,
    raise_on_error: bool,
) -> Result<Vec<OffsetCommitError>> {
    let valid = verify_commit_offsets(client, new_offsets, raise_on_error).await?;
    commit_offsets(client, group, &valid).await
}

/// Keep the entries of `new_offsets` that name live topics and partitions.
pub async fn verify_commit_offsets(
    client: &dyn BrokerClient,
    new_offsets: &TopicOffsets,
    raise_on_error: bool,
) -> Result<TopicOffsets> {
    let selection = PartitionSelection::Partitions(
        new_offsets
            .iter()
            .map(|(topic, offsets)| (topic.clone(), offsets.keys().copied().collect()))
            .collect(),
    );
    let valid = validate_partitions(client, &selection, raise_on_error).await?;

    Ok(valid
        .into_iter()
        .filter_map(|(topic, partitions)| {
            let offsets = new_offsets.get(&topic)?;
            let kept = partitions
                .iter()
                .filter_map(|p| offsets.get(p).map(|offset| (*p, *offset)))
                .collect();
            Some((topic, kept))
        })
        .collect())
}

/// Commit `offsets` for `group` in one request.
pub(crate) async fn commit_offsets(
    client: &dyn BrokerClient,
    group: &str,
    offsets: &TopicOffsets,
) -> Result<Vec<OffsetCommitError>> {
    let payloads: Vec<OffsetCommitRequest> = offsets
        .iter()
        .flat_map(|(topic, partitions)| {
            partitions
                .iter()
                .map(move |(partition, offset)| OffsetCommitRequest::new(topic, *partition, *offset))
        })
        .collect();
    if payloads.is_empty() {
        return Ok(Vec::new());
    }

    debug!("Committing {} offsets for group {group}", payloads.len());
    let responses = client.send_offset_commit_request(group, payloads).await?;

    let mut errors: Vec<OffsetCommitError> = responses
        .into_iter()
        .filter(|resp| resp.error != error_code::NONE)
        .map(|resp| {
            warn!(
                "Offset commit for group {group} on {}/{} failed: {}",
                resp.topic,
                resp.partition,
                error_description(resp.error)
            );
            OffsetCommitError::new(resp.topic, resp.partition, error_description(resp.error))
        })
        .collect();
    errors.sort_by(|a, b| (&a.topic, a.partition).cmp(&(&b.topic, b.partition)));
    Ok(errors)
}

/// High and low watermarks for already validated partitions.
pub(crate) async fn fetch_watermarks(
    client: &dyn BrokerClient,
    partitions: &TopicPartitions,
    raise_on_error: bool,
) -> Result<TopicWatermarks> {
    let highs = request_offsets(
        client,
        partitions,
        |topic, partition| OffsetRequest::latest(topic, partition),
        raise_on_error,
    )
    .await?;
    let lows = request_offsets(
        client,
        partitions,
        |topic, partition| OffsetRequest::earliest(topic, partition),
        raise_on_error,
    )
    .await?;

    let mut watermarks = TopicWatermarks::new();
    for (key, highmark) in highs {
        let Some(&lowmark) = lows.get(&key) else {
            continue;
        };
        let (topic, partition) = key;
        watermarks.entry(topic.clone()).or_default().insert(
            partition,
            PartitionOffsets {
                topic,
                partition,
                highmark,
                lowmark,
            },
        );
    }
    Ok(watermarks)
}

/// Issue one offset request per partition, built by `request`.
///
/// Partitions the broker answers with an error code fail the call with
/// `raise_on_error` and are left out otherwise.
async fn request_offsets(
    client: &dyn BrokerClient,
    partitions: &TopicPartitions,
    request: fn(&str, i32) -> OffsetRequest,
    raise_on_error: bool,
) -> Result<BTreeMap<(String, i32), i64>> {
    let payloads: Vec<OffsetRequest> = for_each_partition(partitions)
        .map(|(topic, partition)| request(topic, partition))
        .collect();
    if payloads.is_empty() {
        return Ok(BTreeMap::new());
    }

    let responses: HashMap<(String, i32), _> = client
        .send_offset_request(payloads)
        .await?
        .into_iter()
        .map(|resp| ((resp.topic.clone(), resp.partition), resp))
        .collect();

    let mut offsets = BTreeMap::new();
    for (topic, partition) in for_each_partition(partitions) {
        let key = (topic.to_string(), partition);
        let outcome = match responses.get(&key) {
            None => Err(Error::MissingResponse {
                topic: topic.to_string(),
                partition,
            }),
            Some(resp) if resp.error != error_code::NONE => Err(Error::BrokerResponse {
                topic: topic.to_string(),
                partition,
                code: resp.error,
            }),
            Some(resp) => resp.offsets.first().copied().ok_or(Error::MissingResponse {
                topic: topic.to_string(),
                partition,
            }),
        };
        match outcome {
            Ok(offset) => {
                offsets.insert(key, offset);
            }
            Err(e) if raise_on_error => return Err(e),
            Err(e) => debug!("Skipping {topic}/{partition}: {e}"),
        }
    }
    Ok(offsets)
}

/// The group's committed offset for already validated partitions.
///
/// An error code in a fetch response (unknown group, partition never committed)
/// degrades to `None` instead of failing the call.
pub(crate) async fn fetch_committed_offsets(
    client: &dyn BrokerClient,
    group: &str,
    partitions: &TopicPartitions,
) -> Result<CommittedOffsets> {
    let payloads: Vec<OffsetFetchRequest> = for_each_partition(partitions)
        .map(|(topic, partition)| OffsetFetchRequest::new(topic, partition))
        .collect();

    let responses: HashMap<(String, i32), Option<i64>> = if payloads.is_empty() {
        HashMap::new()
    } else {
        client
            .send_offset_fetch_request(group, payloads)
            .await?
            .into_iter()
            .map(|resp| ((resp.topic.clone(), resp.partition), resp.committed()))
            .collect()
    };

    let mut committed = CommittedOffsets::new();
    for (topic, partition) in for_each_partition(partitions) {
        let offset = responses
            .get(&(topic.to_string(), partition))
            .copied()
            .flatten();
        committed
            .entry(topic.to_string())
            .or_default()
            .insert(partition, offset);
    }
    Ok(committed)
}

fn for_each_partition(partitions: &TopicPartitions) -> impl Iterator<Item = (&str, i32)> + '_ {
    partitions
        .iter()
        .flat_map(|(topic, ids)| ids.iter().map(move |id| (topic.as_str(), *id)))
}

fn pick_watermark(
    watermarks: &TopicWatermarks,
    pick: impl Fn(&PartitionOffsets) -> i64,
) -> TopicOffsets {
    watermarks
        .iter()
        .map(|(topic, partitions)| {
            let offsets = partitions.iter().map(|(p, w)| (*p, pick(w))).collect();
            (topic.clone(), offsets)
        })
        .collect()
}
