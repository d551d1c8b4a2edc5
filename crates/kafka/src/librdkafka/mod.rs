//! [`BrokerClient`](crate::broker::BrokerClient) and
//! [`ConsumerHandle`](crate::broker::ConsumerHandle) backed by librdkafka.

mod client;
mod consumer;

pub use client::RdKafkaClient;
pub use consumer::{RdKafkaConnector, RdKafkaConsumerHandle, RebalanceContext};

use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use crate::error::Error;

fn is_unavailable_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NetworkException
    )
}

/// Map a librdkafka failure onto the crate error, separating transient
/// unavailability from everything else.
pub(crate) fn classify(err: KafkaError) -> Error {
    match err.rdkafka_error_code() {
        Some(code) if is_unavailable_code(code) => Error::Unavailable(err.to_string()),
        _ => Error::Kafka(err),
    }
}

/// Kafka protocol error code carried by `err`, if it is one and it is not a
/// transient unavailability.
///
/// librdkafka reuses the protocol codes as its positive error codes; its own
/// local errors are negative.
pub(crate) fn broker_error_code(err: &KafkaError) -> Option<i16> {
    let code = err.rdkafka_error_code()?;
    if is_unavailable_code(code) {
        return None;
    }
    i16::try_from(code as i32).ok().filter(|c| *c > 0)
}
