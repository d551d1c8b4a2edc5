//! JSON rendering of command results.

use std::io::Write;

use base64::{engine::general_purpose, Engine as _};
use kafka_types::Message;
use serde::Serialize;

/// A consumed message with its key and value base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: String,
}

impl MessageRecord {
    pub fn new(topic: &str, message: &Message) -> Self {
        Self {
            topic: topic.to_string(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.as_deref().map(|k| general_purpose::STANDARD.encode(k)),
            value: general_purpose::STANDARD.encode(&message.value),
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
