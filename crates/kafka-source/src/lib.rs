//! Incremental Kafka extraction for kafka-extract.
//!
//! This crate provides:
//! - Topic resolution from explicit names or a full-match regex
//! - A watermark tracker bounding each run to what existed when it started
//! - Avro (Confluent wire format) and schema-less JSON decoding that turns
//!   undecodable messages into diagnostic records instead of failing
//! - A consumption loop yielding one batch per poll, with offsets persisted
//!   through the `checkpoint` crate between runs
//!
//! # Dependency Direction
//!
//! This crate depends on `kafka-types` for the shared record types
//! (`RawRecord`, `DecodedRecord`, `RecordError`, ...) so sinks can consume
//! batches without depending on rdkafka.

/// The broker operations the engine needs, as a trait
pub mod broker;
pub mod checkpoint;

/// rdkafka-backed broker with manual partition assignment
///
/// Created from a [`ConsumerConfig`]; blocking librdkafka calls run on the
/// blocking thread pool.
pub mod client;
pub mod decoder;
pub mod error;
pub mod resolver;
pub mod sync;
pub mod testing;
pub mod tracker;

// Re-export from kafka-types for convenience
pub use kafka_types::{
    Batch, DecodedRecord, ErrorSeverity, RawRecord, RecordError, RecordMetadata, TopicPartition,
};

pub use broker::Broker;
pub use checkpoint::OffsetState;
pub use client::{ConsumerConfig, KafkaBroker};
pub use decoder::{HttpSchemaRegistry, MemorySchemaRegistry, MessageDecoder, SchemaRegistry};
pub use error::{Error, ErrorKind, Result};
pub use resolver::TopicSelector;
pub use sync::{run_extraction, BatchSink, BatchStream, Config, ExtractOptions, RunStats};
pub use tracker::{PartitionWatermark, TrackerState, WatermarkTracker};
