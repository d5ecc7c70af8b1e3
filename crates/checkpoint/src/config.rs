//! Checkpoint storage configuration.

use std::sync::Arc;

use crate::{CheckpointStore, FilesystemStore, MemoryStore, NullStore};

/// Where checkpoints are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointStorage {
    /// Checkpoints are discarded; every run starts from the broker's earliest offsets.
    Disabled,
    /// Checkpoints live in memory for the lifetime of the process.
    Memory,
    /// Checkpoint files are written to a directory.
    ///
    /// Files are named `checkpoint_{source_type}_{resource}.json`.
    Filesystem { dir: String },
}

impl Default for CheckpointStorage {
    fn default() -> Self {
        CheckpointStorage::Filesystem {
            dir: ".kafka-extract-offsets".to_string(),
        }
    }
}

impl CheckpointStorage {
    /// Create the backend for this configuration.
    pub fn build(&self) -> Arc<dyn CheckpointStore> {
        match self {
            CheckpointStorage::Disabled => Arc::new(NullStore),
            CheckpointStorage::Memory => Arc::new(MemoryStore::new()),
            CheckpointStorage::Filesystem { dir } => Arc::new(FilesystemStore::new(dir)),
        }
    }

    /// Check if checkpoints survive the current process.
    pub fn is_durable(&self) -> bool {
        matches!(self, CheckpointStorage::Filesystem { .. })
    }
}
