//! Kafka checkpoint type.
//!
//! Tracks the last consumed offset per topic partition, persisted through
//! the `checkpoint` crate between runs.

use std::collections::BTreeMap;

use anyhow::Context;
use checkpoint::Checkpoint;
use kafka_types::TopicPartition;
use serde::{Deserialize, Serialize};

/// Durable form of a run's progress: `topic -> partition -> last consumed offset`.
///
/// A topic present with an empty map has been seen but has no progress yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OffsetState {
    topics: BTreeMap<String, BTreeMap<i32, i64>>,
}

impl OffsetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `topic` has an entry. Returns true if it was newly added.
    pub fn ensure_topic(&mut self, topic: &str) -> bool {
        if self.topics.contains_key(topic) {
            return false;
        }
        self.topics.insert(topic.to_string(), BTreeMap::new());
        true
    }

    pub fn contains_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Last consumed offset for a partition, if any.
    pub fn get(&self, tp: &TopicPartition) -> Option<i64> {
        self.topics
            .get(&tp.topic)
            .and_then(|partitions| partitions.get(&tp.partition))
            .copied()
    }

    pub fn set(&mut self, tp: &TopicPartition, offset: i64) {
        self.topics
            .entry(tp.topic.clone())
            .or_default()
            .insert(tp.partition, offset);
    }

    /// Per-partition offsets of one topic.
    pub fn topic(&self, topic: &str) -> Option<&BTreeMap<i32, i64>> {
        self.topics.get(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    /// All `(partition, offset)` entries in topic then partition order.
    pub fn iter(&self) -> impl Iterator<Item = (TopicPartition, i64)> + '_ {
        self.topics.iter().flat_map(|(topic, partitions)| {
            partitions
                .iter()
                .map(move |(p, o)| (TopicPartition::new(topic.clone(), *p), *o))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Checkpoint for OffsetState {
    const SOURCE_TYPE: &'static str = "kafka";

    fn to_cli_string(&self) -> String {
        self.iter()
            .map(|(tp, offset)| format!("{}:{}:{offset}", tp.topic, tp.partition))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        let mut state = OffsetState::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            // Topic names cannot contain ':', but split from the right anyway
            let mut parts = entry.rsplitn(3, ':');
            let (Some(offset), Some(partition), Some(topic)) =
                (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!(
                    "Invalid Kafka checkpoint entry '{entry}': expected 'topic:partition:offset'"
                );
            };
            let partition: i32 = partition
                .parse()
                .with_context(|| format!("Invalid partition in '{entry}'"))?;
            let offset: i64 = offset
                .parse()
                .with_context(|| format!("Invalid offset in '{entry}'"))?;
            state.set(&TopicPartition::new(topic, partition), offset);
        }
        Ok(state)
    }
}
