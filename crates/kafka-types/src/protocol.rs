//! Offset request and response records.
//!
//! These mirror the payloads of the Kafka ListOffsets, OffsetFetch and
//! OffsetCommit APIs closely enough that any broker client can implement them,
//! while staying independent of a particular client library.

/// `time` value of an [`OffsetRequest`] asking for the high watermark.
pub const LATEST_OFFSET_TIME: i64 = -1;

/// `time` value of an [`OffsetRequest`] asking for the low watermark.
pub const EARLIEST_OFFSET_TIME: i64 = -2;

/// Offset reported by the broker when a group has no committed offset.
pub const NO_OFFSET: i64 = -1;

/// Kafka protocol error codes used by the offset APIs.
pub mod error_code {
    pub const NONE: i16 = 0;
    pub const UNKNOWN_SERVER_ERROR: i16 = -1;
    pub const OFFSET_OUT_OF_RANGE: i16 = 1;
    pub const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
    pub const LEADER_NOT_AVAILABLE: i16 = 5;
    pub const NOT_LEADER_FOR_PARTITION: i16 = 6;
    pub const REQUEST_TIMED_OUT: i16 = 7;
    pub const BROKER_NOT_AVAILABLE: i16 = 8;
    pub const OFFSET_METADATA_TOO_LARGE: i16 = 12;
    pub const COORDINATOR_LOAD_IN_PROGRESS: i16 = 14;
    pub const COORDINATOR_NOT_AVAILABLE: i16 = 15;
    pub const NOT_COORDINATOR: i16 = 16;
    pub const ILLEGAL_GENERATION: i16 = 22;
    pub const UNKNOWN_MEMBER_ID: i16 = 25;
    pub const REBALANCE_IN_PROGRESS: i16 = 27;
    pub const GROUP_AUTHORIZATION_FAILED: i16 = 30;
}

/// Human readable name of a Kafka protocol error code.
pub fn error_description(code: i16) -> &'static str {
    match code {
        error_code::NONE => "NoError",
        error_code::OFFSET_OUT_OF_RANGE => "OffsetOutOfRangeError",
        error_code::UNKNOWN_TOPIC_OR_PARTITION => "UnknownTopicOrPartitionError",
        error_code::LEADER_NOT_AVAILABLE => "LeaderNotAvailableError",
        error_code::NOT_LEADER_FOR_PARTITION => "NotLeaderForPartitionError",
        error_code::REQUEST_TIMED_OUT => "RequestTimedOutError",
        error_code::BROKER_NOT_AVAILABLE => "BrokerNotAvailableError",
        error_code::OFFSET_METADATA_TOO_LARGE => "OffsetMetadataTooLargeError",
        error_code::COORDINATOR_LOAD_IN_PROGRESS => "CoordinatorLoadInProgressError",
        error_code::COORDINATOR_NOT_AVAILABLE => "CoordinatorNotAvailableError",
        error_code::NOT_COORDINATOR => "NotCoordinatorError",
        error_code::ILLEGAL_GENERATION => "IllegalGenerationError",
        error_code::UNKNOWN_MEMBER_ID => "UnknownMemberIdError",
        error_code::REBALANCE_IN_PROGRESS => "RebalanceInProgressError",
        error_code::GROUP_AUTHORIZATION_FAILED => "GroupAuthorizationFailedError",
        _ => "UnknownError",
    }
}

/// Request for the offset of one partition at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRequest {
    pub topic: String,
    pub partition: i32,
    /// [`LATEST_OFFSET_TIME`], [`EARLIEST_OFFSET_TIME`] or a timestamp in milliseconds
    pub time: i64,
    pub max_offsets: i32,
}

impl OffsetRequest {
    /// Ask for the high watermark (next offset to be written).
    pub fn latest(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
            time: LATEST_OFFSET_TIME,
            max_offsets: 1,
        }
    }

    /// Ask for the low watermark (earliest retained offset).
    pub fn earliest(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
            time: EARLIEST_OFFSET_TIME,
            max_offsets: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetResponse {
    pub topic: String,
    pub partition: i32,
    pub error: i16,
    pub offsets: Vec<i64>,
}

/// Request for a consumer group's committed offset on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchRequest {
    pub topic: String,
    pub partition: i32,
}

impl OffsetFetchRequest {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchResponse {
    pub topic: String,
    pub partition: i32,
    /// Committed offset, or [`NO_OFFSET`]
    pub offset: i64,
    pub metadata: Option<String>,
    pub error: i16,
}

impl OffsetFetchResponse {
    /// The committed offset, if the broker reported a usable one.
    ///
    /// Any non-zero error code (an unknown group, a partition the group never
    /// committed on) and the [`NO_OFFSET`] sentinel both read as "none".
    pub fn committed(&self) -> Option<i64> {
        if self.error != error_code::NONE || self.offset < 0 {
            None
        } else {
            Some(self.offset)
        }
    }
}

/// Request to store `offset` as a consumer group's position on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCommitRequest {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

impl OffsetCommitRequest {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCommitResponse {
    pub topic: String,
    pub partition: i32,
    pub error: i16,
}
