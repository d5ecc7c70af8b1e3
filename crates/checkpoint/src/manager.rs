//! Typed checkpoint loading and saving.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::{store::CheckpointStore, Checkpoint, CheckpointID, CheckpointStorage, StoredCheckpoint};

/// Loads and saves typed checkpoints per resource.
///
/// The `CheckpointManager` is the persisted-state collaborator of a sync run:
/// it is read once before the run starts and written by the caller after the
/// run's output has been committed downstream.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{CheckpointManager, CheckpointStorage};
///
/// let manager = CheckpointManager::from_storage(&CheckpointStorage::Filesystem {
///     dir: "/tmp/offsets".into(),
/// });
///
/// let offsets: Option<OffsetState> = manager.load("orders").await?;
/// manager.save("orders", &updated).await?;
/// ```
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointManager {
    /// Create a new manager over the given store.
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Create a manager with a freshly built backend for `storage`.
    pub fn from_storage(storage: &CheckpointStorage) -> Self {
        Self::new(storage.build())
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Load the checkpoint of type `C` for `resource`.
    ///
    /// Returns `Ok(None)` when nothing has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The backend cannot be read
    /// - The stored source type doesn't match `C::SOURCE_TYPE`
    /// - The stored checkpoint belongs to another resource
    /// - The checkpoint data can't be deserialized into `C`
    pub async fn load<C: Checkpoint>(&self, resource: &str) -> anyhow::Result<Option<C>> {
        let id = CheckpointID::new(C::SOURCE_TYPE, resource);
        let Some(stored) = self.store.read_checkpoint(&id).await? else {
            tracing::debug!("No checkpoint stored for {id}");
            return Ok(None);
        };

        if stored.source_type != C::SOURCE_TYPE {
            anyhow::bail!(
                "Checkpoint type mismatch: expected '{}', found '{}'",
                C::SOURCE_TYPE,
                stored.source_type
            );
        }

        if stored.resource != resource {
            anyhow::bail!(
                "Checkpoint resource mismatch: expected '{resource}', found '{}'",
                stored.resource
            );
        }

        let checkpoint: C = serde_json::from_str(&stored.checkpoint_data)
            .with_context(|| format!("Failed to parse checkpoint {id}"))?;
        tracing::info!(
            "Loaded checkpoint {id} written at {}: {}",
            stored.created_at,
            checkpoint.to_cli_string()
        );
        Ok(Some(checkpoint))
    }

    /// Persist `checkpoint` for `resource`, replacing the previous one.
    pub async fn save<C: Checkpoint>(&self, resource: &str, checkpoint: &C) -> anyhow::Result<()> {
        let id = CheckpointID::new(C::SOURCE_TYPE, resource);
        let data = serde_json::to_string(checkpoint)?;
        self.store
            .store_checkpoint(&id, data)
            .await
            .with_context(|| format!("Failed to store checkpoint {id}"))?;

        tracing::info!("Saved checkpoint {id}: {}", checkpoint.to_cli_string());
        Ok(())
    }
}

/// A store that never persists anything.
pub struct NullStore;

#[async_trait]
impl CheckpointStore for NullStore {
    async fn store_checkpoint(&self, id: &CheckpointID, _checkpoint_data: String) -> anyhow::Result<()> {
        tracing::debug!("Checkpoint storage disabled, dropping checkpoint {id}");
        Ok(())
    }

    async fn read_checkpoint(&self, _id: &CheckpointID) -> anyhow::Result<Option<StoredCheckpoint>> {
        Ok(None)
    }
}
