//! In-memory checkpoint storage.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::store::{CheckpointID, CheckpointStore, StoredCheckpoint};

/// Keeps checkpoints in a process-local map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    pub(crate) entries: Mutex<HashMap<CheckpointID, StoredCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn store_checkpoint(&self, id: &CheckpointID, checkpoint_data: String) -> Result<()> {
        let stored = StoredCheckpoint {
            checkpoint_data,
            source_type: id.source_type.clone(),
            resource: id.resource.clone(),
            created_at: Utc::now(),
        };
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Checkpoint store lock poisoned"))?
            .insert(id.clone(), stored);
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<StoredCheckpoint>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("Checkpoint store lock poisoned"))?;
        Ok(entries.get(id).cloned())
    }
}
