//! Resource configuration loaded from YAML.
//!
//! ```yaml
//! # Optional; overridden by --schema-registry-url / SCHEMA_REGISTRY_URL
//! schema_registry_url: http://localhost:8081
//! resources:
//!   - name: orders
//!     kafka:
//!       consumer_group_id: extract-orders
//!       topics_regex: "orders_.*"
//!       properties:
//!         security.protocol: SASL_SSL
//!     processing:
//!       serializer: avro
//!       target_table: orders
//!       batch_size: 500
//!       batch_timeout: 5s
//!       start_from: 2024-01-01T00:00:00Z
//!     # Local schemas take precedence over the registry URL
//!     schemas:
//!       - subject: orders_v1-value
//!         id: 17
//!         path: schemas/order.avsc
//! ```
//!
//! A local schema's `id` is the id the producers' registry assigned it.
//! Confluent-framed payloads only decode with a local schema that declares
//! their id.

pub mod duration;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use kafka_source::sync::{DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT};
use kafka_source::{
    ConsumerConfig, ExtractOptions, HttpSchemaRegistry, MemorySchemaRegistry, MessageDecoder,
    TopicSelector,
};
use serde::Deserialize;
use tracing::{info, warn};

pub use duration::parse_duration;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    pub resources: Vec<ResourceConfig>,
    /// Confluent Schema Registry used by Avro resources without local schemas
    #[serde(default)]
    pub schema_registry_url: Option<String>,
    /// Directory relative schema paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ExtractConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: ExtractConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for resource in &self.resources {
            if !names.insert(resource.name.as_str()) {
                anyhow::bail!("Duplicate resource name '{}'", resource.name);
            }
            resource
                .validate()
                .with_context(|| format!("Invalid resource '{}'", resource.name))?;
        }
        Ok(())
    }

    pub fn resource(&self, name: &str) -> anyhow::Result<&ResourceConfig> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                let known: Vec<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
                anyhow::anyhow!("Unknown resource '{name}', configured resources: {known:?}")
            })
    }
}

/// One independently extracted and checkpointed set of topics.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Resource name; keys the persisted offsets
    pub name: String,
    pub kafka: KafkaSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
    /// Avro schemas registered before decoding (ignored for JSON)
    #[serde(default)]
    pub schemas: Vec<SchemaFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaSettings {
    pub consumer_group_id: String,
    pub topics: Option<Vec<String>>,
    pub topics_regex: Option<String>,
    /// Extra librdkafka properties
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    #[default]
    Json,
    Avro,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingSettings {
    #[serde(default)]
    pub serializer: Serializer,
    /// Destination table for every topic; defaults to the topic name
    pub target_table: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout: String,
    /// Start from this time instead of the persisted offsets
    pub start_from: Option<DateTime<Utc>>,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            serializer: Serializer::default(),
            target_table: None,
            batch_size: default_batch_size(),
            batch_timeout: default_batch_timeout(),
            start_from: None,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_batch_timeout() -> String {
    format!("{}s", DEFAULT_BATCH_TIMEOUT.as_secs())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    pub subject: String,
    /// Registry id of this schema, for Confluent-framed payloads
    pub id: Option<u32>,
    pub path: PathBuf,
}

impl ResourceConfig {
    fn validate(&self) -> anyhow::Result<()> {
        self.selector()?;
        self.options()?;
        if self.processing.serializer == Serializer::Json && !self.schemas.is_empty() {
            warn!(
                "Resource {} uses JSON; its {} schema(s) are ignored",
                self.name,
                self.schemas.len()
            );
        }
        Ok(())
    }

    pub fn selector(&self) -> anyhow::Result<TopicSelector> {
        Ok(TopicSelector::from_options(
            self.kafka.topics.clone(),
            self.kafka.topics_regex.clone(),
        )?)
    }

    pub fn options(&self) -> anyhow::Result<ExtractOptions> {
        if self.processing.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        let batch_timeout = parse_duration(&self.processing.batch_timeout).with_context(|| {
            format!("Invalid batch_timeout '{}'", self.processing.batch_timeout)
        })?;
        if batch_timeout.is_zero() {
            anyhow::bail!("batch_timeout must be positive");
        }
        Ok(ExtractOptions {
            batch_size: self.processing.batch_size,
            batch_timeout,
            start_from: self.processing.start_from,
        })
    }

    /// Build the decoder.
    ///
    /// Avro resources use their local schemas (relative to `base_dir`) when
    /// they list any, otherwise the schema registry at `registry_url`.
    pub fn decoder(
        &self,
        base_dir: &Path,
        registry_url: Option<&str>,
    ) -> anyhow::Result<MessageDecoder> {
        if self.processing.serializer == Serializer::Json {
            return Ok(MessageDecoder::json());
        }

        if self.schemas.is_empty() {
            let url = registry_url.ok_or_else(|| {
                anyhow::anyhow!(
                    "Resource '{}' uses Avro but lists no schemas and no schema registry URL is set",
                    self.name
                )
            })?;
            let registry = HttpSchemaRegistry::new(url)?;
            info!("Resource {} resolves Avro schemas from {url}", self.name);
            return Ok(MessageDecoder::avro(Arc::new(registry)));
        }

        if registry_url.is_some() {
            warn!(
                "Resource {} lists local schemas; the schema registry URL is not used",
                self.name
            );
        }
        let mut registry = MemorySchemaRegistry::new();
        for schema in &self.schemas {
            let path = base_dir.join(&schema.path);
            let definition = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            let registered = match schema.id {
                Some(id) => registry.register_with_id(&schema.subject, id, &definition),
                None => registry.register(&schema.subject, &definition),
            };
            registered.with_context(|| format!("Invalid schema {}", path.display()))?;
        }
        if self.schemas.iter().all(|s| s.id.is_none()) {
            warn!(
                "Resource {} declares no schema ids; Confluent-framed records will be diagnostics",
                self.name
            );
        }
        Ok(MessageDecoder::avro(Arc::new(registry)))
    }

    pub fn consumer_config(&self, bootstrap_servers: &str) -> ConsumerConfig {
        ConsumerConfig {
            brokers: bootstrap_servers.to_string(),
            group_id: self.kafka.consumer_group_id.clone(),
            properties: self.kafka.properties.clone(),
            ..Default::default()
        }
    }

    /// Everything the consumption engine needs for this resource.
    pub fn extract_config(
        &self,
        base_dir: &Path,
        registry_url: Option<&str>,
    ) -> anyhow::Result<kafka_source::Config> {
        Ok(kafka_source::Config {
            resource: self.name.clone(),
            selector: self.selector()?,
            decoder: self.decoder(base_dir, registry_url)?,
            options: self.options()?,
        })
    }
}
