//! Shared Kafka types for kafka-extract.
//!
//! This crate holds the value types that flow between the consumption
//! engine (`kafka-source`) and whatever consumes its output (sinks, the CLI).
//!
//! # Architecture
//!
//! ```text
//! Broker poll:  RawRecord | RecordError   (message)
//! Decoder:      RawRecord → DecodedRecord (record)
//! Sink:         DecodedRecord → JSON object with a reserved `_kafka` sub-object
//! ```
//!
//! # Modules
//!
//! - [`message`] - Raw broker records and topic/partition identifiers
//! - [`record`] - Decoded output records and their Kafka metadata
//! - [`error`] - Per-record broker errors and decode errors

pub mod error;
pub mod message;
pub mod record;

// Re-export main types for convenient access
pub use error::{DecodeError, ErrorSeverity, RecordError, Result};
pub use message::{PolledRecord, RawRecord, TopicPartition};
pub use record::{
    Batch, DecodedRecord, RecordMetadata, DIAGNOSTIC_KEY, METADATA_KEY, RAW_KEY_PLACEHOLDER_PREFIX,
};
