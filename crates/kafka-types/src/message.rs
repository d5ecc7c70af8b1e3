//! Kafka message types.
//!
//! Broker-level representations of what a poll returns. These types are
//! shared between the kafka-source consumption engine and its test broker,
//! so they live here rather than next to the rdkafka client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// One partition of one topic.
///
/// Immutable once discovered for a run. Ordered by topic name, then
/// partition number, which is the order the tracker reports them in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A record exactly as the broker returned it, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Kafka topic name
    pub topic: String,
    /// Kafka partition number
    pub partition: i32,
    /// Kafka offset within the partition
    pub offset: i64,
    /// Message key (if any)
    pub key: Option<Vec<u8>>,
    /// Message payload (if any)
    pub value: Option<Vec<u8>>,
    /// Message timestamp in milliseconds since epoch (if available)
    pub timestamp: Option<i64>,
}

impl RawRecord {
    /// Create a record with a value and no key or timestamp.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: Some(value),
            timestamp: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the timestamp. Negative values mean "not available" on the wire
    /// and are stored as `None`.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = (timestamp >= 0).then_some(timestamp);
        self
    }

    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// Length of the payload in bytes, 0 when there is no payload.
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, Vec::len)
    }
}

/// One entry of a poll result: either a record or a broker-reported error.
pub type PolledRecord = std::result::Result<RawRecord, RecordError>;
