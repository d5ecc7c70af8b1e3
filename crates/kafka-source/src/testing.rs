//! In-memory [`Broker`] for tests.
//!
//! Clones share state, so a test can keep a handle to inspect the broker
//! after handing it to a stream.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kafka_types::{PolledRecord, RawRecord, RecordError, TopicPartition};

use crate::broker::{Broker, TopicMetadata};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum Entry {
    Record(RawRecord),
    Error(RecordError),
}

#[derive(Debug, Default)]
struct PartitionLog {
    low: i64,
    entries: Vec<Entry>,
}

impl PartitionLog {
    fn high(&self) -> i64 {
        self.low + self.entries.len() as i64
    }
}

#[derive(Debug, Default)]
struct Inner {
    topics: BTreeMap<String, Vec<PartitionLog>>,
    positions: BTreeMap<TopicPartition, i64>,
    fail_metadata: bool,
    fail_consume: bool,
    stalled_polls: usize,
    poll_limit: Option<usize>,
    polls: usize,
    close_count: usize,
}

/// A broker holding topic logs in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_topic(&self, name: &str, partitions: i32) {
        self.create_topic_with_low(name, partitions, 0);
    }

    /// Create a topic whose partitions start at offset `low`, as after retention.
    pub fn create_topic_with_low(&self, name: &str, partitions: i32, low: i64) {
        let logs = (0..partitions)
            .map(|_| PartitionLog {
                low,
                entries: Vec::new(),
            })
            .collect();
        self.lock().topics.insert(name.to_string(), logs);
    }

    /// Append a record; its offset is assigned by the log. Missing topics
    /// and partitions are created. Returns the assigned offset.
    pub fn produce(&self, mut record: RawRecord) -> i64 {
        let mut inner = self.lock();
        let log = partition_log(&mut inner, &record.topic, record.partition);
        record.offset = log.high();
        let offset = record.offset;
        log.entries.push(Entry::Record(record));
        offset
    }

    pub fn produce_value(&self, topic: &str, partition: i32, value: &[u8]) -> i64 {
        self.produce(RawRecord::new(topic, partition, 0, value.to_vec()))
    }

    /// Append `count` JSON records `{"seq": <offset>}`.
    pub fn produce_json(&self, topic: &str, partition: i32, count: usize) {
        for _ in 0..count {
            let offset = self.high_watermark(topic, partition);
            self.produce_value(topic, partition, format!(r#"{{"seq": {offset}}}"#).as_bytes());
        }
    }

    /// Append one JSON record per timestamp.
    pub fn produce_json_with_timestamps(&self, topic: &str, partition: i32, timestamps: &[i64]) {
        for ts in timestamps {
            self.produce(
                RawRecord::new(topic, partition, 0, format!(r#"{{"ts": {ts}}}"#).into_bytes())
                    .with_timestamp(*ts),
            );
        }
    }

    /// Append a broker error occupying the next offset. Returns that offset.
    pub fn produce_error(&self, topic: &str, partition: i32, error: RecordError) -> i64 {
        let mut inner = self.lock();
        let log = partition_log(&mut inner, topic, partition);
        let offset = log.high();
        log.entries.push(Entry::Error(error));
        offset
    }

    pub fn high_watermark(&self, topic: &str, partition: i32) -> i64 {
        self.lock()
            .topics
            .get(topic)
            .and_then(|logs| logs.get(partition as usize))
            .map_or(0, PartitionLog::high)
    }

    /// Make metadata, watermark, and timestamp queries fail.
    pub fn fail_metadata(&self, fail: bool) {
        self.lock().fail_metadata = fail;
    }

    /// Make polls fail.
    pub fn fail_consume(&self, fail: bool) {
        self.lock().fail_consume = fail;
    }

    /// The next `polls` polls return nothing.
    pub fn stall_polls(&self, polls: usize) {
        self.lock().stalled_polls = polls;
    }

    /// Cap the number of entries a single poll returns.
    pub fn set_poll_limit(&self, limit: Option<usize>) {
        self.lock().poll_limit = limit;
    }

    /// Current assignment with each partition's next read position.
    pub fn assignment(&self) -> Vec<(TopicPartition, i64)> {
        self.lock()
            .positions
            .iter()
            .map(|(tp, o)| (tp.clone(), *o))
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }

    pub fn is_closed(&self) -> bool {
        self.lock().close_count > 0
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    fn check_open(inner: &Inner) -> Result<()> {
        if inner.close_count > 0 {
            return Err(Error::Kafka("Consumer is closed".to_string()));
        }
        Ok(())
    }

    fn check_metadata(inner: &Inner) -> Result<()> {
        Self::check_open(inner)?;
        if inner.fail_metadata {
            return Err(Error::Kafka("Failed to fetch metadata: all brokers down".to_string()));
        }
        Ok(())
    }
}

fn partition_log<'a>(inner: &'a mut Inner, topic: &str, partition: i32) -> &'a mut PartitionLog {
    let logs = inner.topics.entry(topic.to_string()).or_default();
    let index = partition.max(0) as usize;
    if logs.len() <= index {
        logs.resize_with(index + 1, PartitionLog::default);
    }
    &mut logs[index]
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn fetch_metadata(&self, topic: Option<&str>) -> Result<TopicMetadata> {
        let inner = self.lock();
        Self::check_metadata(&inner)?;
        Ok(inner
            .topics
            .iter()
            .filter(|(name, _)| topic.map_or(true, |t| t == name.as_str()))
            .map(|(name, logs)| (name.clone(), (0..logs.len() as i32).collect()))
            .collect())
    }

    async fn watermarks(&self, tp: &TopicPartition) -> Result<(i64, i64)> {
        let inner = self.lock();
        Self::check_metadata(&inner)?;
        inner
            .topics
            .get(&tp.topic)
            .and_then(|logs| logs.get(tp.partition as usize))
            .map(|log| (log.low, log.high()))
            .ok_or_else(|| Error::Kafka(format!("Unknown partition {tp}")))
    }

    async fn offsets_for_timestamp(
        &self,
        topic: &str,
        partitions: &[i32],
        timestamp_ms: i64,
    ) -> Result<BTreeMap<i32, Option<i64>>> {
        let inner = self.lock();
        Self::check_metadata(&inner)?;
        let logs = inner
            .topics
            .get(topic)
            .ok_or_else(|| Error::Kafka(format!("Unknown topic {topic}")))?;

        Ok(partitions
            .iter()
            .map(|&partition| {
                let found = logs.get(partition as usize).and_then(|log| {
                    log.entries.iter().find_map(|entry| match entry {
                        Entry::Record(r) if r.timestamp.is_some_and(|ts| ts >= timestamp_ms) => {
                            Some(r.offset)
                        }
                        _ => None,
                    })
                });
                (partition, found)
            })
            .collect())
    }

    async fn assign(&self, positions: &[(TopicPartition, i64)]) -> Result<()> {
        let mut inner = self.lock();
        Self::check_open(&inner)?;
        inner.positions = positions.iter().cloned().collect();
        Ok(())
    }

    async fn consume(&self, max_records: usize, _timeout: Duration) -> Result<Vec<PolledRecord>> {
        let mut inner = self.lock();
        Self::check_open(&inner)?;
        inner.polls += 1;
        if inner.fail_consume {
            return Err(Error::Kafka("Broker transport failure".to_string()));
        }
        if inner.stalled_polls > 0 {
            inner.stalled_polls -= 1;
            return Ok(Vec::new());
        }

        let limit = inner.poll_limit.map_or(max_records, |l| l.min(max_records));
        let Inner {
            topics, positions, ..
        } = &mut *inner;

        let mut polled = Vec::new();
        let mut queue: VecDeque<_> = positions.iter_mut().collect();
        // Round-robin over assigned partitions, one entry at a time
        while polled.len() < limit {
            let Some((tp, position)) = queue.pop_front() else {
                break;
            };
            let Some(log) = topics
                .get(&tp.topic)
                .and_then(|logs| logs.get(tp.partition as usize))
            else {
                continue;
            };
            let index = *position - log.low;
            if index < 0 || index >= log.entries.len() as i64 {
                continue;
            }
            polled.push(match &log.entries[index as usize] {
                Entry::Record(record) => Ok(record.clone()),
                Entry::Error(error) => Err(error.clone()),
            });
            *position += 1;
            queue.push_back((tp, position));
        }
        Ok(polled)
    }

    fn close(&self) {
        self.lock().close_count += 1;
    }
}
