//! Message processor behind `kafka-group tail`.

use std::io::Write;

use async_trait::async_trait;
use kafka_group::{MessageProcessor, TerminationHandle};
use kafka_types::Message;
use tracing::info;

use crate::output::MessageRecord;

/// Writes each message as one JSON line and stops the runner after
/// `max_messages`, if set.
pub struct JsonLinePrinter<W> {
    topic: String,
    out: W,
    max_messages: Option<u64>,
    printed: u64,
    terminator: TerminationHandle,
}

impl<W: Write + Send> JsonLinePrinter<W> {
    pub fn new(
        topic: impl Into<String>,
        out: W,
        max_messages: Option<u64>,
        terminator: TerminationHandle,
    ) -> Self {
        Self {
            topic: topic.into(),
            out,
            max_messages,
            printed: 0,
            terminator,
        }
    }

    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> MessageProcessor for JsonLinePrinter<W> {
    async fn initialize(&mut self) -> anyhow::Result<()> {
        if self.max_messages == Some(0) {
            self.terminator.terminate();
        }
        Ok(())
    }

    async fn process(&mut self, message: Message) -> anyhow::Result<()> {
        let record = MessageRecord::new(&self.topic, &message);
        serde_json::to_writer(&mut self.out, &record)?;
        writeln!(self.out)?;
        self.printed += 1;

        if self.max_messages.is_some_and(|max| self.printed >= max) {
            self.terminator.terminate();
        }
        Ok(())
    }

    async fn dispose(&mut self) -> anyhow::Result<()> {
        self.out.flush()?;
        info!("Printed {} messages from {}", self.printed, self.topic);
        Ok(())
    }
}
