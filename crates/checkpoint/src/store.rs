//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint identifier for storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointID {
    /// Source type (e.g., "kafka")
    pub source_type: String,
    /// Logical resource the checkpoint belongs to (e.g., a configured pipeline name)
    pub resource: String,
}

impl CheckpointID {
    pub fn new(source_type: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            resource: resource.into(),
        }
    }

    /// Storage-safe name, distinct for every distinct id.
    ///
    /// Characters outside `[A-Za-z0-9-]` are percent-encoded per UTF-8 byte,
    /// so `_` only ever appears as the separator.
    pub fn file_stem(&self) -> String {
        format!(
            "checkpoint_{}_{}",
            encode_component(&self.source_type),
            encode_component(&self.resource)
        )
    }
}

fn encode_component(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

impl fmt::Display for CheckpointID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_type, self.resource)
    }
}

/// Checkpoint data stored in backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Serialized checkpoint (e.g., the per-partition offsets for Kafka)
    pub checkpoint_data: String,
    /// Source type for validation
    pub source_type: String,
    /// Resource for validation
    pub resource: String,
    /// Timestamp when checkpoint was written
    pub created_at: DateTime<Utc>,
}

/// Trait for checkpoint storage operations.
///
/// Implementations must support independent reads and writes per
/// [`CheckpointID`].
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint in the storage backend, replacing any previous one
    /// with the same id.
    async fn store_checkpoint(&self, id: &CheckpointID, checkpoint_data: String) -> Result<()>;

    /// Read a checkpoint from the storage backend.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>>;
}
