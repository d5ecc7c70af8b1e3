//! Avro decoding with schemas from a [`SchemaRegistry`].
//!
//! Payloads in the Confluent wire format (magic byte `0`, 4-byte big-endian
//! schema id, Avro datum) are decoded with the schema of that id; an id the
//! registry cannot resolve is an error. Anything else is decoded as a bare
//! datum with the latest schema of the subject `<topic>-value` (or
//! `<topic>-key` for keys).

use std::sync::Arc;

use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use base64::Engine;
use kafka_types::{DecodeError, RawRecord};
use serde_json::{Map, Number, Value};

use super::json::into_object;
use super::registry::SchemaRegistry;

const MAGIC_BYTE: u8 = 0;
const FRAME_HEADER_LEN: usize = 5;

/// Decodes Avro keys and values.
#[derive(Clone)]
pub struct AvroDecoder {
    registry: Arc<dyn SchemaRegistry>,
}

impl std::fmt::Debug for AvroDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvroDecoder").finish_non_exhaustive()
    }
}

impl AvroDecoder {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub async fn decode_value(
        &self,
        record: &RawRecord,
    ) -> Result<Map<String, Value>, DecodeError> {
        let bytes = record.value.as_deref().ok_or(DecodeError::MissingValue)?;
        into_object(self.decode(&record.topic, "value", bytes).await?)
    }

    pub async fn decode_key(&self, topic: &str, bytes: &[u8]) -> Result<Value, DecodeError> {
        self.decode(topic, "key", bytes).await
    }

    async fn decode(&self, topic: &str, part: &str, bytes: &[u8]) -> Result<Value, DecodeError> {
        if let Some((id, body)) = split_frame(bytes) {
            let schema = self
                .registry
                .by_id(id)
                .await?
                .ok_or_else(|| DecodeError::SchemaNotFound(format!("schema id {id}")))?;
            return read_datum(&schema, body);
        }

        let subject = format!("{topic}-{part}");
        let schema = self
            .registry
            .latest(&subject)
            .await?
            .ok_or(DecodeError::SchemaNotFound(subject))?;
        read_datum(&schema, bytes)
    }
}

/// Split a Confluent-framed payload into schema id and datum.
fn split_frame(bytes: &[u8]) -> Option<(u32, &[u8])> {
    if bytes.len() < FRAME_HEADER_LEN || bytes[0] != MAGIC_BYTE {
        return None;
    }
    let id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Some((id, &bytes[FRAME_HEADER_LEN..]))
}

fn read_datum(schema: &Schema, mut body: &[u8]) -> Result<Value, DecodeError> {
    let value = apache_avro::from_avro_datum(schema, &mut body, None)
        .map_err(|e| DecodeError::Avro(e.to_string()))?;
    Ok(avro_to_json(value))
}

/// Convert a decoded Avro value to JSON.
///
/// Bytes and fixed values become base64 strings, enums their symbol,
/// logical date/time types their underlying number.
pub fn avro_to_json(value: AvroValue) -> Value {
    match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(b) => Value::Bool(b),
        AvroValue::Int(i) | AvroValue::Date(i) | AvroValue::TimeMillis(i) => Value::from(i),
        AvroValue::Long(i)
        | AvroValue::TimeMicros(i)
        | AvroValue::TimestampMillis(i)
        | AvroValue::TimestampMicros(i) => Value::from(i),
        AvroValue::Float(f) => float(f as f64),
        AvroValue::Double(f) => float(f),
        AvroValue::Bytes(b) | AvroValue::Fixed(_, b) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        AvroValue::String(s) | AvroValue::Enum(_, s) => Value::String(s),
        AvroValue::Uuid(u) => Value::String(u.to_string()),
        AvroValue::Union(_, inner) => avro_to_json(*inner),
        AvroValue::Array(items) => Value::Array(items.into_iter().map(avro_to_json).collect()),
        AvroValue::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, avro_to_json(v)))
                .collect(),
        ),
        AvroValue::Record(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, avro_to_json(v)))
                .collect(),
        ),
        other => Value::String(format!("{other:?}")),
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}
