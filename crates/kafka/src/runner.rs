//! Run loop on top of [`SimpleConsumer`]: pull, process, tear down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kafka_types::Message;
use tracing::{debug, info, warn};

use crate::broker::Fetch;
use crate::consumer::SimpleConsumer;
use crate::error::{Error, Result};

/// Caller-supplied hooks driven by [`ConsumerRunner`].
#[async_trait]
pub trait MessageProcessor: Send {
    /// Called once before the consumer connects.
    async fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle one message. An error stops the runner.
    async fn process(&mut self, message: Message) -> anyhow::Result<()>;

    /// Called once when the loop exits, before the final commit.
    async fn dispose(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Cooperative stop flag shared between a runner and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct TerminationHandle(Arc<AtomicBool>);

impl TerminationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminate(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_terminated(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a [`MessageProcessor`] over the messages of a [`SimpleConsumer`].
///
/// The loop stops when the flag is set or the message sequence ends. The flag
/// is checked before every fetch, so a message being processed is always
/// finished before the runner stops. Whatever ends the loop, the
/// runner then calls `dispose`, commits every owned partition and closes the
/// consumer, in that order.
pub struct ConsumerRunner<P> {
    consumer: SimpleConsumer,
    processor: P,
    terminator: TerminationHandle,
    processed: u64,
}

impl<P: MessageProcessor> ConsumerRunner<P> {
    pub fn new(consumer: SimpleConsumer, processor: P) -> Self {
        Self {
            consumer,
            processor,
            terminator: TerminationHandle::new(),
            processed: 0,
        }
    }

    /// Use an existing flag, e.g. one already handed to a signal handler.
    pub fn with_terminator(mut self, terminator: TerminationHandle) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn terminator(&self) -> TerminationHandle {
        self.terminator.clone()
    }

    pub fn terminate(&self) {
        self.terminator.terminate();
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn consumer(&self) -> &SimpleConsumer {
        &self.consumer
    }

    /// Messages handed to `process` successfully so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Run until terminated, until the messages run out or until `process`
    /// fails.
    ///
    /// A failing `process` is reported as [`Error::ProcessMessage`] after
    /// teardown. Teardown failures are returned only when the loop itself
    /// succeeded; otherwise they are logged and the loop error wins.
    pub async fn run(&mut self) -> Result<()> {
        self.processor
            .initialize()
            .await
            .map_err(|e| Error::Hook {
                hook: "initialize",
                source: e.into(),
            })?;

        info!("Starting consumer for topic {}", self.consumer.topic());
        let outcome = self.consume().await;
        let teardown = self.teardown().await;
        info!(
            "Stopped consumer for topic {} after {} messages",
            self.consumer.topic(),
            self.processed
        );

        match (outcome, teardown) {
            (Err(e), Err(teardown_err)) => {
                warn!("Teardown after failure also failed: {teardown_err}");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn consume(&mut self) -> Result<()> {
        self.consumer.connect().await?;

        loop {
            if self.terminator.is_terminated() {
                debug!("Termination requested");
                return Ok(());
            }
            let message = match self.consumer.fetch().await? {
                Fetch::Message(message) => message,
                Fetch::Timeout => continue,
                Fetch::End => {
                    debug!("Message sequence ended");
                    return Ok(());
                }
            };
            let (partition, offset) = (message.partition, message.offset);
            self.processor
                .process(message)
                .await
                .map_err(|e| Error::ProcessMessage {
                    partition,
                    offset,
                    source: e.into(),
                })?;
            self.processed += 1;
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        let disposed = self.processor.dispose().await.map_err(|e| Error::Hook {
            hook: "dispose",
            source: e.into(),
        });
        if let Err(e) = &disposed {
            warn!("Dispose failed: {e}");
        }

        let closed = if self.consumer.is_connected() {
            self.consumer.commit_and_close().await
        } else {
            Ok(())
        };
        disposed.and(closed)
    }
}
