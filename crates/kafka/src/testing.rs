//! In-memory broker, consumer handle and connector for unit tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kafka_types::{
    error_code, OffsetCommitRequest, OffsetCommitResponse, OffsetFetchRequest,
    OffsetFetchResponse, OffsetRequest, OffsetResponse, TopicOffsets, LATEST_OFFSET_TIME,
    NO_OFFSET,
};

use crate::broker::{BrokerClient, Connection, ConsumerHandle, Connector, Fetch, FetchedMessage};
use crate::config::ConsumerConfig;
use crate::error::{Error, Result};

/// Ordered record of side effects shared by the fakes and the code under test.
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

fn table(entries: &[(&str, &[(i32, i64)])]) -> TopicOffsets {
    entries
        .iter()
        .map(|(topic, offsets)| (topic.to_string(), offsets.iter().copied().collect()))
        .collect()
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeMap<String, Vec<i32>>,
    high: TopicOffsets,
    low: TopicOffsets,
    group_offsets: Mutex<TopicOffsets>,
    metadata_failures: AtomicUsize,
    metadata_loads: AtomicUsize,
    commit_error: AtomicBool,
    commit_unavailable: AtomicBool,
    offset_requests_unavailable: AtomicBool,
    failing_offset_requests: Mutex<BTreeSet<(String, i32)>>,
    commit_requests: Mutex<Vec<(String, Vec<OffsetCommitRequest>)>>,
    closes: AtomicUsize,
}

/// A cluster with fixed topics and watermarks and one table of committed offsets.
///
/// Clones share state. The group passed to the offset APIs is ignored; every
/// group sees the same committed offsets.
#[derive(Clone, Default)]
pub(crate) struct FakeBroker {
    state: Arc<BrokerState>,
    journal: Journal,
}

impl FakeBroker {
    /// topic1 has partitions 0..=2 and topic2 has 0..=1, with the watermarks
    /// and committed offsets below.
    pub fn fixture() -> Self {
        let state = BrokerState {
            topics: BTreeMap::from([
                ("topic1".to_string(), vec![0, 1, 2]),
                ("topic2".to_string(), vec![0, 1]),
            ]),
            high: Self::high_offsets(),
            low: Self::low_offsets(),
            group_offsets: Mutex::new(Self::committed_offsets()),
            ..Default::default()
        };
        Self {
            state: Arc::new(state),
            journal: Journal::default(),
        }
    }

    pub fn high_offsets() -> TopicOffsets {
        table(&[
            ("topic1", &[(0, 30), (1, 30), (2, 30)]),
            ("topic2", &[(0, 50), (1, 50)]),
        ])
    }

    pub fn low_offsets() -> TopicOffsets {
        table(&[
            ("topic1", &[(0, 10), (1, 5), (2, 3)]),
            ("topic2", &[(0, 5), (1, 5)]),
        ])
    }

    pub fn committed_offsets() -> TopicOffsets {
        table(&[("topic1", &[(0, 30), (1, 20), (2, 10)]), ("topic2", &[(0, 15)])])
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Fail the next `count` metadata loads as unavailable.
    pub fn fail_metadata_loads(&self, count: usize) {
        self.state.metadata_failures.store(count, Ordering::SeqCst);
    }

    pub fn metadata_loads(&self) -> usize {
        self.state.metadata_loads.load(Ordering::SeqCst)
    }

    /// Answer commits with RequestTimedOut and leave offsets untouched.
    pub fn set_commit_error(&self) {
        self.state.commit_error.store(true, Ordering::SeqCst);
    }

    /// Fail commit requests at the transport level.
    pub fn set_commit_unavailable(&self) {
        self.state.commit_unavailable.store(true, Ordering::SeqCst);
    }

    pub fn set_offset_requests_unavailable(&self) {
        self.state
            .offset_requests_unavailable
            .store(true, Ordering::SeqCst);
    }

    /// Answer offset requests for one partition with UnknownTopicOrPartition.
    pub fn fail_offset_requests_for(&self, topic: &str, partition: i32) {
        self.state
            .failing_offset_requests
            .lock()
            .unwrap()
            .insert((topic.to_string(), partition));
    }

    /// Behave as if no group ever committed.
    pub fn forget_group_offsets(&self) {
        self.state.group_offsets.lock().unwrap().clear();
    }

    pub fn stored_offsets(&self) -> TopicOffsets {
        self.state.group_offsets.lock().unwrap().clone()
    }

    pub fn commit_requests(&self) -> Vec<(String, Vec<OffsetCommitRequest>)> {
        self.state.commit_requests.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn load_metadata_for_topics(&self, _topics: &[String]) -> Result<()> {
        self.state.metadata_loads.fetch_add(1, Ordering::SeqCst);
        let failures = &self.state.metadata_failures;
        if failures.load(Ordering::SeqCst) > 0 {
            let _ = failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n != usize::MAX).then(|| n - 1)
            });
            return Err(Error::Unavailable("Boom!".to_string()));
        }
        Ok(())
    }

    fn topic_partitions(&self) -> BTreeMap<String, Vec<i32>> {
        self.state.topics.clone()
    }

    async fn send_offset_request(
        &self,
        payloads: Vec<OffsetRequest>,
    ) -> Result<Vec<OffsetResponse>> {
        if self.state.offset_requests_unavailable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("Boom!".to_string()));
        }
        let failing = self.state.failing_offset_requests.lock().unwrap().clone();
        Ok(payloads
            .into_iter()
            .map(|req| {
                let marks = if req.time == LATEST_OFFSET_TIME {
                    &self.state.high
                } else {
                    &self.state.low
                };
                let offset = marks
                    .get(&req.topic)
                    .and_then(|m| m.get(&req.partition))
                    .copied()
                    .unwrap_or(NO_OFFSET);
                let known = self
                    .state
                    .topics
                    .get(&req.topic)
                    .is_some_and(|p| p.contains(&req.partition));
                let error = if known && !failing.contains(&(req.topic.clone(), req.partition)) {
                    error_code::NONE
                } else {
                    error_code::UNKNOWN_TOPIC_OR_PARTITION
                };
                OffsetResponse {
                    topic: req.topic,
                    partition: req.partition,
                    error,
                    offsets: vec![offset],
                }
            })
            .collect())
    }

    async fn send_offset_fetch_request(
        &self,
        _group: &str,
        payloads: Vec<OffsetFetchRequest>,
    ) -> Result<Vec<OffsetFetchResponse>> {
        let offsets = self.state.group_offsets.lock().unwrap();
        Ok(payloads
            .into_iter()
            .map(|req| {
                let committed = offsets
                    .get(&req.topic)
                    .and_then(|o| o.get(&req.partition))
                    .copied();
                OffsetFetchResponse {
                    topic: req.topic,
                    partition: req.partition,
                    offset: committed.unwrap_or(NO_OFFSET),
                    metadata: None,
                    error: if committed.is_some() {
                        error_code::NONE
                    } else {
                        error_code::UNKNOWN_TOPIC_OR_PARTITION
                    },
                }
            })
            .collect())
    }

    async fn send_offset_commit_request(
        &self,
        group: &str,
        payloads: Vec<OffsetCommitRequest>,
    ) -> Result<Vec<OffsetCommitResponse>> {
        self.state
            .commit_requests
            .lock()
            .unwrap()
            .push((group.to_string(), payloads.clone()));
        if self.state.commit_unavailable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("Boom!".to_string()));
        }

        let commit_error = self.state.commit_error.load(Ordering::SeqCst);
        let mut offsets = self.state.group_offsets.lock().unwrap();
        Ok(payloads
            .into_iter()
            .map(|req| {
                let error = if commit_error {
                    error_code::REQUEST_TIMED_OUT
                } else {
                    offsets
                        .entry(req.topic.clone())
                        .or_default()
                        .insert(req.partition, req.offset);
                    error_code::NONE
                };
                OffsetCommitResponse {
                    topic: req.topic,
                    partition: req.partition,
                    error,
                }
            })
            .collect())
    }

    async fn close(&self) -> Result<()> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.journal.record("close");
        Ok(())
    }
}

/// Consumer handle that first times out `idle_fetches` times, then replays a
/// fixed list of messages, then reports the end of the sequence.
pub(crate) struct FakeHandle {
    idle_fetches: usize,
    messages: VecDeque<FetchedMessage>,
    offsets: BTreeMap<i32, i64>,
    auto_commit: bool,
    fail_commit: bool,
    journal: Journal,
    commits: Arc<Mutex<Vec<Option<Vec<i32>>>>>,
}

#[async_trait]
impl ConsumerHandle for FakeHandle {
    async fn get_message(&mut self) -> Result<Fetch<FetchedMessage>> {
        if self.idle_fetches > 0 {
            self.idle_fetches -= 1;
            return Ok(Fetch::Timeout);
        }
        match self.messages.pop_front() {
            Some(message) => {
                self.offsets.insert(message.partition, message.offset + 1);
                Ok(Fetch::Message(message))
            }
            None => Ok(Fetch::End),
        }
    }

    async fn commit(&mut self, partitions: Option<&[i32]>) -> Result<()> {
        self.commits
            .lock()
            .unwrap()
            .push(partitions.map(<[i32]>::to_vec));
        self.journal.record("commit");
        if self.fail_commit {
            return Err(Error::Consumer("commit failed".to_string()));
        }
        Ok(())
    }

    fn offsets(&self) -> &BTreeMap<i32, i64> {
        &self.offsets
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }
}

/// Arguments a [`FakeConnector`] was asked to connect with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectCall {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub group: String,
    pub topic: String,
    pub partitions: Option<Vec<i32>>,
}

/// Connects to a shared [`FakeBroker`] with a [`FakeHandle`] scripted by `messages`.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    pub broker: FakeBroker,
    pub journal: Journal,
    pub messages: Vec<FetchedMessage>,
    pub idle_fetches: usize,
    pub fail_commit: bool,
    pub calls: Arc<Mutex<Vec<ConnectCall>>>,
    pub commits: Arc<Mutex<Vec<Option<Vec<i32>>>>>,
}

impl FakeConnector {
    pub fn new(messages: Vec<FetchedMessage>) -> Self {
        let journal = Journal::default();
        Self {
            broker: FakeBroker::fixture().with_journal(journal.clone()),
            journal,
            messages,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ConnectCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn commits(&self) -> Vec<Option<Vec<i32>>> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        config: &ConsumerConfig,
        topic: &str,
        partitions: Option<&[i32]>,
    ) -> Result<Connection> {
        self.calls.lock().unwrap().push(ConnectCall {
            brokers: config.cluster.broker_list.clone(),
            client_id: config.client_id.clone(),
            group: config.group_id.clone(),
            topic: topic.to_string(),
            partitions: partitions.map(<[i32]>::to_vec),
        });
        let handle = FakeHandle {
            idle_fetches: self.idle_fetches,
            messages: self.messages.iter().cloned().collect(),
            offsets: BTreeMap::new(),
            auto_commit: config.auto_commit,
            fail_commit: self.fail_commit,
            journal: self.journal.clone(),
            commits: Arc::clone(&self.commits),
        };
        Ok(Connection {
            client: Box::new(self.broker.clone()),
            handle: Box::new(handle),
        })
    }
}

/// Route `tracing` output of the code under test through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn fetched(partition: i32, offset: i64, key: &str, value: &str) -> FetchedMessage {
    FetchedMessage {
        partition,
        offset,
        key: Some(key.as_bytes().to_vec()),
        payload: Some(value.as_bytes().to_vec()),
    }
}
