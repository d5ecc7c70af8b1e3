//! The broker seam the consumption engine is written against.
//!
//! [`crate::client::KafkaBroker`] implements it over rdkafka;
//! [`crate::testing::MemoryBroker`] implements it in memory for tests.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kafka_types::{PolledRecord, TopicPartition};

use crate::error::Result;

/// Topic name to partition ids.
pub type TopicMetadata = BTreeMap<String, Vec<i32>>;

/// Operations the consumption engine needs from a Kafka-compatible broker.
///
/// Every method takes `&self` so a broker can be shared with blocking tasks.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Fetch partition metadata for one topic, or every topic when `topic` is `None`.
    async fn fetch_metadata(&self, topic: Option<&str>) -> Result<TopicMetadata>;

    /// Low and high watermarks of a partition.
    async fn watermarks(&self, tp: &TopicPartition) -> Result<(i64, i64)>;

    /// Earliest offset per partition whose timestamp is at or after `timestamp_ms`.
    ///
    /// `None` means no such record exists in that partition yet.
    async fn offsets_for_timestamp(
        &self,
        topic: &str,
        partitions: &[i32],
        timestamp_ms: i64,
    ) -> Result<BTreeMap<i32, Option<i64>>>;

    /// Replace the current assignment; each partition starts reading at the given offset.
    async fn assign(&self, positions: &[(TopicPartition, i64)]) -> Result<()>;

    /// Poll up to `max_records` records, waiting at most `timeout`.
    ///
    /// An empty result means nothing arrived in time.
    async fn consume(&self, max_records: usize, timeout: Duration) -> Result<Vec<PolledRecord>>;

    /// Release the connection. Calling it more than once is harmless.
    ///
    /// Synchronous so it can run from `Drop`.
    fn close(&self);
}
