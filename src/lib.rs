//! kafka-extract library
//!
//! Incrementally extracts Kafka topics into JSONL files. Each run reads only
//! what existed on the broker when it started, then persists the offsets it
//! reached so the next run picks up where this one stopped.
//!
//! # Crates
//!
//! - `kafka_source` - topic resolution, watermark tracking, decoding and the
//!   consumption loop
//! - `kafka_types` - record types shared between the source and sinks
//! - `checkpoint` - offset persistence keyed by resource
//!
//! # CLI Usage
//!
//! ```bash
//! # Extract everything new since the last run of resource "orders"
//! kafka-extract run --config extract.yml --resource orders \
//!   --bootstrap-servers localhost:9092 --output-dir out
//!
//! # Which topics would a pattern pick up?
//! kafka-extract topics --pattern 'orders_.*'
//!
//! # Where will the next run of "orders" start?
//! kafka-extract offsets --resource orders
//! ```

use std::path::PathBuf;

use clap::Parser;

pub mod config;
pub mod extract;
pub mod sink;

pub use config::{ExtractConfig, ResourceConfig};
pub use sink::JsonlSink;

#[derive(Parser, Clone, Debug)]
pub struct BrokerOpts {
    /// Kafka bootstrap servers (comma-separated host:port list)
    #[arg(long, default_value = "localhost:9092", env = "BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: String,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    /// Resource configuration file (YAML)
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Name of the resource to extract
    #[arg(long)]
    pub resource: String,

    /// Directory the JSONL files are appended to
    #[arg(long, default_value = "output")]
    pub output_dir: PathBuf,

    /// Directory holding persisted offsets
    #[arg(long, default_value = ".kafka-extract-offsets")]
    pub checkpoint_dir: String,

    /// Confluent Schema Registry for Avro resources without local schemas
    /// (overrides the config file)
    #[arg(long, env = "SCHEMA_REGISTRY_URL")]
    pub schema_registry_url: Option<String>,

    #[command(flatten)]
    pub broker: BrokerOpts,
}

#[derive(Parser, Clone, Debug)]
pub struct TopicsArgs {
    /// Regular expression matched against the whole topic name
    #[arg(long)]
    pub pattern: String,

    /// Consumer group used for the metadata request
    #[arg(long, default_value = "kafka-extract-topics")]
    pub group_id: String,

    #[command(flatten)]
    pub broker: BrokerOpts,
}

#[derive(Parser, Clone, Debug)]
pub struct OffsetsArgs {
    /// Name of the resource
    #[arg(long)]
    pub resource: String,

    /// Directory holding persisted offsets
    #[arg(long, default_value = ".kafka-extract-offsets")]
    pub checkpoint_dir: String,
}
