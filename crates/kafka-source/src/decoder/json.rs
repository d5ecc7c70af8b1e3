//! Schema-less JSON decoding.

use kafka_types::{DecodeError, RawRecord};
use serde_json::{Map, Value};

/// Decodes values as JSON objects. No schema is involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    /// Decode the record value into business fields.
    ///
    /// A record without a value decodes to no fields.
    pub fn decode_value(&self, record: &RawRecord) -> Result<Map<String, Value>, DecodeError> {
        match record.value.as_deref() {
            None => Ok(Map::new()),
            Some(bytes) => into_object(serde_json::from_slice(bytes)?),
        }
    }
}

/// Decode key bytes as JSON.
pub fn decode_key(bytes: &[u8]) -> Result<Value, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn into_object(value: Value) -> Result<Map<String, Value>, DecodeError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DecodeError::NotAnObject(type_name(&other).to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_object() {
        let record = RawRecord::new("t", 0, 0, br#"{"id": 7, "tags": ["a"]}"#.to_vec());
        let fields = JsonDecoder.decode_value(&record).unwrap();
        assert_eq!(fields.get("id"), Some(&json!(7)));
        assert_eq!(fields.get("tags"), Some(&json!(["a"])));
    }

    #[test]
    fn test_decode_missing_value_is_empty() {
        let mut record = RawRecord::new("t", 0, 0, vec![]);
        record.value = None;
        assert!(JsonDecoder.decode_value(&record).unwrap().is_empty());
    }

    #[test]
    fn test_decode_non_object_fails() {
        let record = RawRecord::new("t", 0, 0, b"[1, 2]".to_vec());
        let err = JsonDecoder.decode_value(&record).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject(ref t) if t == "array"));
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        let record = RawRecord::new("t", 0, 0, b"{not json".to_vec());
        assert!(matches!(
            JsonDecoder.decode_value(&record),
            Err(DecodeError::Json(_))
        ));
    }
}
