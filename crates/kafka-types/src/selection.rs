//! Topic and partition selections.
//!
//! A selection is either a list of topics, meaning every partition of each
//! topic, or an explicit mapping from topic to partition ids. Which partitions
//! "every partition" resolves to is only known once broker metadata is loaded,
//! so resolution happens in the consumer crate's validator.

use std::collections::BTreeMap;

use crate::error::{KafkaTypesError, Result};

/// Longest topic name Kafka accepts.
const MAX_TOPIC_NAME_LEN: usize = 249;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionSelection {
    /// All partitions of each listed topic
    Topics(Vec<String>),
    /// Exactly the listed partitions of each topic
    Partitions(BTreeMap<String, Vec<i32>>),
}

impl PartitionSelection {
    /// Selection of one topic, either whole or restricted to `partitions`.
    pub fn single(topic: impl Into<String>, partitions: Option<&[i32]>) -> Self {
        let topic = topic.into();
        match partitions {
            Some(partitions) => {
                Self::Partitions(BTreeMap::from([(topic, partitions.to_vec())]))
            }
            None => Self::Topics(vec![topic]),
        }
    }

    /// Topic names referenced by the selection, in selection order.
    pub fn topic_names(&self) -> Vec<String> {
        match self {
            Self::Topics(topics) => topics.clone(),
            Self::Partitions(partitions) => partitions.keys().cloned().collect(),
        }
    }

    /// Parse command-line topic arguments.
    ///
    /// Each argument is either `topic` or `topic:0,1,2`. All arguments must use
    /// the same form. Repeating a topic in the mapping form merges its partitions.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.is_empty() {
            return Err(KafkaTypesError::EmptySelection);
        }

        let mut topics = Vec::new();
        let mut partitions: BTreeMap<String, Vec<i32>> = BTreeMap::new();

        for arg in args {
            let arg = arg.as_ref().trim();
            match arg.split_once(':') {
                None => {
                    validate_topic_name(arg)?;
                    if !topics.iter().any(|t| t == arg) {
                        topics.push(arg.to_string());
                    }
                }
                Some((topic, ids)) => {
                    validate_topic_name(topic)?;
                    let entry = partitions.entry(topic.to_string()).or_default();
                    for id in ids.split(',').map(str::trim) {
                        let partition = id.parse::<i32>().ok().filter(|p| *p >= 0).ok_or_else(
                            || KafkaTypesError::InvalidPartition {
                                topic: topic.to_string(),
                                partition: id.to_string(),
                            },
                        )?;
                        if !entry.contains(&partition) {
                            entry.push(partition);
                        }
                    }
                }
            }
        }

        match (topics.is_empty(), partitions.is_empty()) {
            (false, true) => Ok(Self::Topics(topics)),
            (true, false) => Ok(Self::Partitions(partitions)),
            _ => Err(KafkaTypesError::MixedSelection),
        }
    }
}

impl From<Vec<String>> for PartitionSelection {
    fn from(topics: Vec<String>) -> Self {
        Self::Topics(topics)
    }
}

impl From<BTreeMap<String, Vec<i32>>> for PartitionSelection {
    fn from(partitions: BTreeMap<String, Vec<i32>>) -> Self {
        Self::Partitions(partitions)
    }
}

/// Check a topic name against Kafka's legal character set and length.
pub fn validate_topic_name(topic: &str) -> Result<()> {
    let legal = !topic.is_empty()
        && topic.len() <= MAX_TOPIC_NAME_LEN
        && topic != "."
        && topic != ".."
        && topic
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if legal {
        Ok(())
    } else {
        Err(KafkaTypesError::InvalidTopic(topic.to_string()))
    }
}
