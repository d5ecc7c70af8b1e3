//! Schema lookup for the Avro decoder.

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::Schema;
use async_trait::async_trait;
use kafka_types::DecodeError;

/// Resolves Avro schemas by registry id or by subject name.
///
/// `Ok(None)` means the registry answered and has no such schema; `Err`
/// means it could not be asked.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Schema registered under `id`, as referenced by Confluent-framed payloads.
    async fn by_id(&self, id: u32) -> Result<Option<Arc<Schema>>, DecodeError>;

    /// Latest schema registered under `subject` (e.g. `orders-value`).
    async fn latest(&self, subject: &str) -> Result<Option<Arc<Schema>>, DecodeError>;
}

/// A registry held in memory, filled from local schema definitions.
///
/// Framed payloads only resolve against schemas registered with the id the
/// producer's registry assigned them; subjects alone never imply an id.
#[derive(Debug, Default)]
pub struct MemorySchemaRegistry {
    ids: HashMap<u32, Arc<Schema>>,
    subjects: HashMap<String, Arc<Schema>>,
}

impl MemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a definition as the latest schema of `subject`.
    pub fn register(&mut self, subject: &str, definition: &str) -> Result<(), DecodeError> {
        let schema = parse(subject, definition)?;
        self.register_schema(subject, None, schema)
    }

    /// Like [`register`](Self::register), also resolving framed payloads
    /// that carry `id`.
    pub fn register_with_id(
        &mut self,
        subject: &str,
        id: u32,
        definition: &str,
    ) -> Result<(), DecodeError> {
        let schema = parse(subject, definition)?;
        self.register_schema(subject, Some(id), schema)
    }

    pub fn register_schema(
        &mut self,
        subject: &str,
        id: Option<u32>,
        schema: Schema,
    ) -> Result<(), DecodeError> {
        let schema = Arc::new(schema);
        if let Some(id) = id {
            if self.ids.contains_key(&id) {
                return Err(DecodeError::InvalidSchema(format!(
                    "{subject}: schema id {id} is registered twice"
                )));
            }
            self.ids.insert(id, schema.clone());
        }
        self.subjects.insert(subject.to_string(), schema);
        Ok(())
    }

    /// Number of subjects.
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

fn parse(subject: &str, definition: &str) -> Result<Schema, DecodeError> {
    Schema::parse_str(definition).map_err(|e| DecodeError::InvalidSchema(format!("{subject}: {e}")))
}

#[async_trait]
impl SchemaRegistry for MemorySchemaRegistry {
    async fn by_id(&self, id: u32) -> Result<Option<Arc<Schema>>, DecodeError> {
        Ok(self.ids.get(&id).cloned())
    }

    async fn latest(&self, subject: &str) -> Result<Option<Arc<Schema>>, DecodeError> {
        Ok(self.subjects.get(subject).cloned())
    }
}
