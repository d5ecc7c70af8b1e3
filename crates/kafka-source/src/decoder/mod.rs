//! Turns raw broker records into [`DecodedRecord`]s.
//!
//! Decoding never fails: a value that cannot be decoded becomes a
//! diagnostic record that still carries the Kafka metadata, including the
//! best-effort decoded key.

mod avro;
mod confluent;
mod json;
mod registry;

use std::sync::Arc;

use kafka_types::{
    DecodeError, DecodedRecord, RawRecord, RecordMetadata, RAW_KEY_PLACEHOLDER_PREFIX,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use avro::{avro_to_json, AvroDecoder};
pub use confluent::HttpSchemaRegistry;
pub use json::JsonDecoder;
pub use registry::{MemorySchemaRegistry, SchemaRegistry};

/// One attempt in the key decoding chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Avro with the registry (Avro decoder only)
    Schema,
    /// Schema-less JSON
    Json,
    /// UTF-8 text
    Text,
}

const AVRO_KEY_CHAIN: &[KeyStrategy] = &[KeyStrategy::Schema, KeyStrategy::Json, KeyStrategy::Text];
const JSON_KEY_CHAIN: &[KeyStrategy] = &[KeyStrategy::Json, KeyStrategy::Text];

/// The decoding strategy of a resource, chosen once from configuration.
#[derive(Debug, Clone)]
pub enum MessageDecoder {
    Avro(AvroDecoder),
    Json(JsonDecoder),
}

impl MessageDecoder {
    pub fn json() -> Self {
        MessageDecoder::Json(JsonDecoder)
    }

    pub fn avro(registry: Arc<dyn SchemaRegistry>) -> Self {
        MessageDecoder::Avro(AvroDecoder::new(registry))
    }

    /// Decode a record. Value failures produce a diagnostic record.
    pub async fn decode(&self, record: &RawRecord) -> DecodedRecord {
        let metadata = RecordMetadata {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            timestamp: record.timestamp.filter(|ts| *ts >= 0),
            key: self.decode_key(record).await,
        };

        match self.decode_value(record).await {
            Ok(fields) => DecodedRecord::decoded(fields, metadata),
            Err(e) => {
                warn!(
                    "Failed to decode value of {}[{}]@{}: {e}",
                    record.topic, record.partition, record.offset
                );
                DecodedRecord::diagnostic(e.to_string(), record.value_len(), metadata)
            }
        }
    }

    /// Key decoding strategies in the order they are attempted.
    pub fn key_chain(&self) -> &'static [KeyStrategy] {
        match self {
            MessageDecoder::Avro(_) => AVRO_KEY_CHAIN,
            MessageDecoder::Json(_) => JSON_KEY_CHAIN,
        }
    }

    /// Decode the record key with the first strategy that succeeds.
    ///
    /// Returns `None` for records without a key, and a
    /// `<binary_key_length_N>` placeholder when every strategy fails.
    pub async fn decode_key(&self, record: &RawRecord) -> Option<Value> {
        let key = record.key.as_deref()?;
        for strategy in self.key_chain() {
            match self.try_key(*strategy, &record.topic, key).await {
                Ok(value) => return Some(value),
                Err(e) => debug!(
                    "Key of {}[{}]@{} is not {strategy:?}: {e}",
                    record.topic, record.partition, record.offset
                ),
            }
        }
        Some(Value::String(format!(
            "{RAW_KEY_PLACEHOLDER_PREFIX}{}>",
            key.len()
        )))
    }

    async fn try_key(
        &self,
        strategy: KeyStrategy,
        topic: &str,
        key: &[u8],
    ) -> Result<Value, DecodeError> {
        match (strategy, self) {
            (KeyStrategy::Schema, MessageDecoder::Avro(avro)) => avro.decode_key(topic, key).await,
            (KeyStrategy::Schema, MessageDecoder::Json(_)) => {
                Err(DecodeError::SchemaNotFound(format!("{topic}-key")))
            }
            (KeyStrategy::Json, _) => json::decode_key(key),
            (KeyStrategy::Text, _) => Ok(Value::String(std::str::from_utf8(key)?.to_string())),
        }
    }

    async fn decode_value(&self, record: &RawRecord) -> Result<Map<String, Value>, DecodeError> {
        match self {
            MessageDecoder::Avro(avro) => avro.decode_value(record).await,
            MessageDecoder::Json(json) => json.decode_value(record),
        }
    }
}
