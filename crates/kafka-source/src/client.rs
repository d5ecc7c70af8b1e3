//! rdkafka-backed [`Broker`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use kafka_types::{PolledRecord, RawRecord, RecordError, TopicPartition};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as RdkafkaConsumer, StreamConsumer as RdkafkaStreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage as RdkafkaBorrowedMessage, Message as RdkafkaMessage};
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use crate::broker::{Broker, TopicMetadata};
use crate::error::{Error, Result};

/// Configuration for the Kafka consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Kafka brokers (comma-separated list)
    pub brokers: String,
    /// Consumer group ID
    ///
    /// Offsets are never committed to the group; progress is persisted by
    /// the checkpoint store instead. The group id is still required by the
    /// client and shows up in broker-side monitoring.
    pub group_id: String,
    /// Session timeout in milliseconds
    pub session_timeout_ms: String,
    /// Timeout for metadata, watermark, and timestamp lookups
    pub metadata_timeout: Duration,
    /// Extra librdkafka properties (security settings, client id, ...)
    ///
    /// Applied last, so they can override the defaults above.
    pub properties: HashMap<String, String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "kafka-extract".to_string(),
            session_timeout_ms: "6000".to_string(),
            metadata_timeout: Duration::from_secs(10),
            properties: HashMap::new(),
        }
    }
}

/// A [`Broker`] over an rdkafka `StreamConsumer` with manual partition assignment.
pub struct KafkaBroker {
    consumer: RwLock<Option<Arc<RdkafkaStreamConsumer>>>,
    metadata_timeout: Duration,
}

impl KafkaBroker {
    /// Create a new consumer. No partitions are assigned until [`Broker::assign`].
    pub fn new(config: &ConsumerConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", &config.session_timeout_ms)
            .set("enable.partition.eof", "false")
            .set("allow.auto.create.topics", "false");
        for (key, value) in &config.properties {
            client_config.set(key, value);
        }

        let consumer: RdkafkaStreamConsumer = client_config
            .create()
            .map_err(|e| Error::InvalidConfig(format!("Failed to create consumer: {e}")))?;

        info!(
            "Kafka consumer created: brokers={}, group_id={}",
            config.brokers, config.group_id
        );
        Ok(Self {
            consumer: RwLock::new(Some(Arc::new(consumer))),
            metadata_timeout: config.metadata_timeout,
        })
    }

    fn consumer(&self) -> Result<Arc<RdkafkaStreamConsumer>> {
        self.consumer
            .read()
            .map_err(|_| Error::Kafka("Consumer lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| Error::Kafka("Consumer is closed".to_string()))
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn fetch_metadata(&self, topic: Option<&str>) -> Result<TopicMetadata> {
        let consumer = self.consumer()?;
        let topic = topic.map(str::to_string);
        let timeout = self.metadata_timeout;

        // fetch_metadata calls rd_kafka_metadata, which blocks
        tokio::task::spawn_blocking(move || {
            let metadata = consumer
                .fetch_metadata(topic.as_deref(), timeout)
                .map_err(|e| Error::Kafka(format!("Failed to fetch metadata: {e}")))?;

            let mut topics = TopicMetadata::new();
            for t in metadata.topics() {
                if let Some(err) = t.error() {
                    // Requested topics that do not exist come back with an error
                    debug!("Skipping topic {} with metadata error {err:?}", t.name());
                    continue;
                }
                let partitions = t.partitions().iter().map(|p| p.id()).collect();
                topics.insert(t.name().to_string(), partitions);
            }
            Ok(topics)
        })
        .await
        .map_err(|e| Error::Kafka(format!("Metadata task failed: {e}")))?
    }

    async fn watermarks(&self, tp: &TopicPartition) -> Result<(i64, i64)> {
        let consumer = self.consumer()?;
        let tp = tp.clone();
        let timeout = self.metadata_timeout;

        tokio::task::spawn_blocking(move || {
            consumer
                .fetch_watermarks(&tp.topic, tp.partition, timeout)
                .map_err(|e| Error::Kafka(format!("Failed to fetch watermarks for {tp}: {e}")))
        })
        .await
        .map_err(|e| Error::Kafka(format!("Watermark task failed: {e}")))?
    }

    async fn offsets_for_timestamp(
        &self,
        topic: &str,
        partitions: &[i32],
        timestamp_ms: i64,
    ) -> Result<BTreeMap<i32, Option<i64>>> {
        let consumer = self.consumer()?;
        let mut tpl = TopicPartitionList::new();
        for partition in partitions {
            tpl.add_partition_offset(topic, *partition, Offset::Offset(timestamp_ms))
                .map_err(|e| Error::Kafka(format!("Failed to build timestamp lookup: {e}")))?;
        }
        let topic = topic.to_string();
        let timeout = self.metadata_timeout;

        tokio::task::spawn_blocking(move || {
            let found = consumer
                .offsets_for_times(tpl, timeout)
                .map_err(|e| Error::Kafka(format!("Failed to look up offsets by time: {e}")))?;
            Ok(found
                .elements_for_topic(&topic)
                .iter()
                .map(|elem| {
                    let offset = match elem.offset() {
                        Offset::Offset(o) if o >= 0 => Some(o),
                        _ => None,
                    };
                    (elem.partition(), offset)
                })
                .collect())
        })
        .await
        .map_err(|e| Error::Kafka(format!("Timestamp lookup task failed: {e}")))?
    }

    async fn assign(&self, positions: &[(TopicPartition, i64)]) -> Result<()> {
        let consumer = self.consumer()?;
        let mut tpl = TopicPartitionList::new();
        for (tp, offset) in positions {
            tpl.add_partition_offset(&tp.topic, tp.partition, Offset::Offset(*offset))
                .map_err(|e| Error::Kafka(format!("Failed to add partition offset: {e}")))?;
        }
        consumer
            .assign(&tpl)
            .map_err(|e| Error::Kafka(format!("Failed to assign partitions: {e}")))?;
        debug!("Assigned {} partitions", positions.len());
        Ok(())
    }

    async fn consume(&self, max_records: usize, timeout: Duration) -> Result<Vec<PolledRecord>> {
        let consumer = self.consumer()?;
        let mut records = Vec::new();
        let deadline = tokio::time::timeout(timeout, std::future::pending::<()>());
        tokio::pin!(deadline);

        while records.len() < max_records {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    break;
                }

                message = consumer.recv() => {
                    match message {
                        Ok(msg) => records.push(Ok(to_raw_record(&msg))),
                        Err(e) => records.push(Err(classify(&consumer, &e))),
                    }
                }
            }
        }
        debug!(msg_count = records.len(), "Read messages from Kafka");
        Ok(records)
    }

    fn close(&self) {
        let consumer = match self.consumer.write() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                warn!("Consumer lock poisoned, leaving consumer to be dropped");
                return;
            }
        };
        if let Some(consumer) = consumer {
            if let Err(e) = consumer.unassign() {
                warn!("Failed to unassign partitions on close: {e}");
            }
            info!("Kafka consumer closed");
        }
    }
}

fn to_raw_record(msg: &RdkafkaBorrowedMessage) -> RawRecord {
    RawRecord {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        key: msg.key().map(|k| k.to_vec()),
        value: msg.payload().map(|p| p.to_vec()),
        timestamp: msg.timestamp().to_millis().filter(|ts| *ts >= 0),
    }
}

/// Map a consumption error onto retriable / non-fatal / fatal.
fn classify(consumer: &RdkafkaStreamConsumer, error: &KafkaError) -> RecordError {
    if let Some((code, reason)) = consumer.client().fatal_error() {
        return RecordError::fatal(format!("{code:?}"), reason);
    }

    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => RecordError::fatal("Fatal", error.to_string()),
        Some(
            code @ (RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::LeaderNotAvailable),
        ) => RecordError::retriable(format!("{code:?}"), error.to_string()),
        Some(code) => RecordError::non_fatal(format!("{code:?}"), error.to_string()),
        None => RecordError::non_fatal("Unknown", error.to_string()),
    }
}
