//! Confluent Schema Registry client.
//!
//! Schemas are fetched over HTTP on first use and cached for the lifetime of
//! the registry, so a run asks for each id or subject at most once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use apache_avro::Schema;
use async_trait::async_trait;
use kafka_types::DecodeError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::registry::SchemaRegistry;

const ACCEPT: &str = "application/vnd.schemaregistry.v1+json, application/json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of `/schemas/ids/{id}` and `/subjects/{subject}/versions/latest`.
#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: String,
    /// Absent for Avro
    #[serde(rename = "schemaType")]
    schema_type: Option<String>,
    /// Only present in subject responses
    id: Option<u32>,
}

/// A [`SchemaRegistry`] backed by a Confluent-compatible HTTP registry.
pub struct HttpSchemaRegistry {
    client: Client,
    base_url: String,
    ids: RwLock<HashMap<u32, Arc<Schema>>>,
    subjects: RwLock<HashMap<String, Arc<Schema>>>,
}

impl std::fmt::Debug for HttpSchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSchemaRegistry")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSchemaRegistry {
    pub fn new(base_url: &str) -> Result<Self, DecodeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DecodeError::Registry(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            ids: RwLock::default(),
            subjects: RwLock::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, path: &str) -> Result<Option<SchemaResponse>, DecodeError> {
        let url = format!("{}{path}", self.base_url);
        debug!("Fetching schema from {url}");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| DecodeError::Registry(format!("Failed to fetch '{url}': {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DecodeError::Registry(format!(
                "'{url}' returned status {status}"
            )));
        }

        response
            .json::<SchemaResponse>()
            .await
            .map(Some)
            .map_err(|e| DecodeError::Registry(format!("Invalid response from '{url}': {e}")))
    }
}

fn parse(label: &str, response: &SchemaResponse) -> Result<Arc<Schema>, DecodeError> {
    if let Some(schema_type) = &response.schema_type {
        if !schema_type.eq_ignore_ascii_case("AVRO") {
            return Err(DecodeError::InvalidSchema(format!(
                "{label}: {schema_type} schemas are not supported"
            )));
        }
    }
    Schema::parse_str(&response.schema)
        .map(Arc::new)
        .map_err(|e| DecodeError::InvalidSchema(format!("{label}: {e}")))
}

fn cached<K, Q>(cache: &RwLock<HashMap<K, Arc<Schema>>>, key: &Q) -> Option<Arc<Schema>>
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    cache
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(key)
        .cloned()
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn by_id(&self, id: u32) -> Result<Option<Arc<Schema>>, DecodeError> {
        if let Some(schema) = cached(&self.ids, &id) {
            return Ok(Some(schema));
        }
        let Some(response) = self.fetch(&format!("/schemas/ids/{id}")).await? else {
            return Ok(None);
        };
        let schema = parse(&format!("schema id {id}"), &response)?;
        self.ids
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, schema.clone());
        Ok(Some(schema))
    }

    async fn latest(&self, subject: &str) -> Result<Option<Arc<Schema>>, DecodeError> {
        if let Some(schema) = cached(&self.subjects, subject) {
            return Ok(Some(schema));
        }
        let Some(response) = self
            .fetch(&format!("/subjects/{subject}/versions/latest"))
            .await?
        else {
            return Ok(None);
        };
        let schema = parse(subject, &response)?;
        if let Some(id) = response.id {
            self.ids
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, schema.clone());
        }
        self.subjects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.to_string(), schema.clone());
        Ok(Some(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORDER_SCHEMA: &str =
        r#"{"type": "record", "name": "Order", "fields": [{"name": "id", "type": "long"}]}"#;

    #[tokio::test]
    async fn test_by_id_fetches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schemas/ids/100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"schema": ORDER_SCHEMA})))
            .expect(1)
            .mount(&server)
            .await;

        let registry = HttpSchemaRegistry::new(&format!("{}/", server.uri())).unwrap();
        assert_eq!(registry.base_url(), server.uri());
        for _ in 0..3 {
            let schema = registry.by_id(100).await.unwrap().unwrap();
            assert!(matches!(*schema, Schema::Record(_)));
        }
    }

    #[tokio::test]
    async fn test_latest_also_caches_its_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subjects/orders-value/versions/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "subject": "orders-value",
                "version": 3,
                "id": 42,
                "schema": ORDER_SCHEMA
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = HttpSchemaRegistry::new(&server.uri()).unwrap();
        assert!(registry.latest("orders-value").await.unwrap().is_some());
        assert!(registry.latest("orders-value").await.unwrap().is_some());
        // Served from the cache filled by the subject lookup
        assert!(registry.by_id(42).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_schema_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error_code": 40403,
                "message": "Schema not found"
            })))
            .mount(&server)
            .await;

        let registry = HttpSchemaRegistry::new(&server.uri()).unwrap();
        assert!(registry.by_id(7).await.unwrap().is_none());
        assert!(registry.latest("payments-value").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_and_unsupported_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schemas/ids/1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schemas/ids/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schema": "syntax = \"proto3\";",
                "schemaType": "PROTOBUF"
            })))
            .mount(&server)
            .await;

        let registry = HttpSchemaRegistry::new(&server.uri()).unwrap();
        assert!(matches!(
            registry.by_id(1).await,
            Err(DecodeError::Registry(ref s)) if s.contains("500")
        ));
        assert!(matches!(
            registry.by_id(2).await,
            Err(DecodeError::InvalidSchema(ref s)) if s.contains("PROTOBUF")
        ));
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_error() {
        // Nothing listens on the discard port
        let registry = HttpSchemaRegistry::new("http://127.0.0.1:9").unwrap();
        assert!(matches!(
            registry.latest("orders-value").await,
            Err(DecodeError::Registry(_))
        ));
    }
}
