//! Decoded output records.
//!
//! A [`DecodedRecord`] is a JSON object: the decoded business fields at the
//! top level, merged with a reserved [`METADATA_KEY`] sub-object carrying
//! where the record came from. When the payload cannot be decoded the
//! business fields are replaced by a [`DIAGNOSTIC_KEY`] sub-object, but the
//! metadata is always present so the record can still be routed.
//!
//! ```json
//! {
//!     "id": 7,
//!     "status": "shipped",
//!     "_kafka": {
//!         "topic": "orders_v1",
//!         "partition": 0,
//!         "offset": 14,
//!         "timestamp": 1700000000000,
//!         "key": "order-7"
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Reserved top-level key holding [`RecordMetadata`].
pub const METADATA_KEY: &str = "_kafka";

/// Reserved top-level key holding decode diagnostics.
pub const DIAGNOSTIC_KEY: &str = "_decode_error";

/// Prefix of the placeholder used for keys no strategy could decode.
pub const RAW_KEY_PLACEHOLDER_PREFIX: &str = "<binary_key_length_";

/// Records produced by one poll cycle, in production order.
pub type Batch = Vec<DecodedRecord>;

/// Kafka metadata attached to every decoded record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Milliseconds since epoch, `null` when the broker had none
    pub timestamp: Option<i64>,
    /// Decoded key, `null` when the record had no key
    pub key: Option<Value>,
}

/// A decoded record: business fields plus the reserved metadata object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedRecord {
    body: Map<String, Value>,
    #[serde(skip)]
    metadata: RecordMetadata,
    #[serde(skip)]
    diagnostic: bool,
}

impl DecodedRecord {
    /// Build a record from successfully decoded business fields.
    ///
    /// A business field named [`METADATA_KEY`] is overwritten by the
    /// metadata object.
    pub fn decoded(mut fields: Map<String, Value>, metadata: RecordMetadata) -> Self {
        if fields.contains_key(METADATA_KEY) {
            debug!(
                "Business field '{METADATA_KEY}' in {}[{}]@{} is shadowed by Kafka metadata",
                metadata.topic, metadata.partition, metadata.offset
            );
        }
        fields.insert(METADATA_KEY.to_string(), metadata_value(&metadata));
        Self {
            body: fields,
            metadata,
            diagnostic: false,
        }
    }

    /// Build a diagnostic record standing in for a payload that failed to decode.
    pub fn diagnostic(
        error: impl Into<String>,
        raw_value_length: usize,
        metadata: RecordMetadata,
    ) -> Self {
        let mut diagnostic = Map::new();
        diagnostic.insert("error".to_string(), Value::String(error.into()));
        diagnostic.insert(
            "raw_value_length".to_string(),
            Value::from(raw_value_length as u64),
        );

        let mut body = Map::new();
        body.insert(DIAGNOSTIC_KEY.to_string(), Value::Object(diagnostic));
        body.insert(METADATA_KEY.to_string(), metadata_value(&metadata));
        Self {
            body,
            metadata,
            diagnostic: true,
        }
    }

    pub fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    pub fn topic(&self) -> &str {
        &self.metadata.topic
    }

    /// True when the payload failed to decode.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic
    }

    /// Look up a top-level field (business fields, `_kafka`, `_decode_error`).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Decode error description for diagnostic records.
    pub fn error(&self) -> Option<&str> {
        self.body
            .get(DIAGNOSTIC_KEY)
            .and_then(|d| d.get("error"))
            .and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}

fn metadata_value(metadata: &RecordMetadata) -> Value {
    let mut map = Map::new();
    map.insert("topic".to_string(), Value::String(metadata.topic.clone()));
    map.insert("partition".to_string(), Value::from(metadata.partition));
    map.insert("offset".to_string(), Value::from(metadata.offset));
    map.insert(
        "timestamp".to_string(),
        metadata.timestamp.map_or(Value::Null, Value::from),
    );
    map.insert(
        "key".to_string(),
        metadata.key.clone().unwrap_or(Value::Null),
    );
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> RecordMetadata {
        RecordMetadata {
            topic: "orders_v1".to_string(),
            partition: 0,
            offset: 14,
            timestamp: Some(1_700_000_000_000),
            key: Some(json!("order-7")),
        }
    }

    #[test]
    fn test_decoded_record_serialization() {
        let fields = json!({"id": 7, "status": "shipped"});
        let record = DecodedRecord::decoded(fields.as_object().unwrap().clone(), metadata());

        assert!(!record.is_diagnostic());
        assert_eq!(record.topic(), "orders_v1");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "id": 7,
                "status": "shipped",
                "_kafka": {
                    "topic": "orders_v1",
                    "partition": 0,
                    "offset": 14,
                    "timestamp": 1_700_000_000_000_i64,
                    "key": "order-7"
                }
            })
        );
    }

    #[test]
    fn test_diagnostic_record_keeps_metadata() {
        let record = DecodedRecord::diagnostic("expected value at line 1", 12, metadata());

        assert!(record.is_diagnostic());
        assert_eq!(record.error(), Some("expected value at line 1"));
        assert_eq!(
            record.get(DIAGNOSTIC_KEY).unwrap()["raw_value_length"],
            json!(12)
        );
        assert_eq!(record.get(METADATA_KEY).unwrap()["offset"], json!(14));
        assert_eq!(record.as_map().len(), 2);
    }

    #[test]
    fn test_null_timestamp_and_key() {
        let mut meta = metadata();
        meta.timestamp = None;
        meta.key = None;
        let record = DecodedRecord::decoded(Map::new(), meta);

        let kafka = record.get(METADATA_KEY).unwrap();
        assert_eq!(kafka["timestamp"], Value::Null);
        assert_eq!(kafka["key"], Value::Null);
    }

    // A business field with the reserved name loses to the metadata object.
    // This is the current contract; changing it must be a deliberate decision.
    #[test]
    fn test_metadata_key_collision_overwrites_business_field() {
        let fields = json!({"_kafka": "business value", "amount": 10});
        let record = DecodedRecord::decoded(fields.as_object().unwrap().clone(), metadata());

        let value = record.into_value();
        assert_eq!(value["amount"], json!(10));
        assert_eq!(value["_kafka"]["topic"], json!("orders_v1"));
        assert!(!value["_kafka"].is_string());
    }
}
