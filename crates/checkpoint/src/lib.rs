//! Checkpoint management for kafka-extract
//!
//! Provides storage-agnostic persistence of source positions between runs.
//!
//! # Architecture
//!
//! This crate provides a generic checkpoint system that:
//! - Defines the `Checkpoint` trait for source-specific checkpoint types
//! - Manages typed loading/saving per resource via `CheckpointManager`
//! - Supports multiple storage backends via the `CheckpointStore` trait
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file per resource, replaced atomically
//! - `MemoryStore` - Process-local map, for tests and dry runs
//! - `NullStore` - Discards everything (checkpointing disabled)
//!
//! Every checkpoint is keyed by `(source_type, resource)`, so independent
//! resources running concurrently never overwrite each other's state.

mod config;
mod filesystem;
mod manager;
mod memory;
pub mod store;


// Re-export config types
pub use config::CheckpointStorage;

// Re-export manager types
pub use manager::{CheckpointManager, NullStore};

// Re-export store trait and types
pub use store::{CheckpointID, CheckpointStore, StoredCheckpoint};

// Re-export storage implementations
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// Trait that source-specific checkpoints must implement.
///
/// # Example
///
/// ```rust
/// use checkpoint::Checkpoint;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct SequenceCheckpoint {
///     pub sequence: i64,
/// }
///
/// impl Checkpoint for SequenceCheckpoint {
///     const SOURCE_TYPE: &'static str = "sequence";
///
///     fn to_cli_string(&self) -> String {
///         self.sequence.to_string()
///     }
///
///     fn from_cli_string(s: &str) -> anyhow::Result<Self> {
///         Ok(Self { sequence: s.parse()? })
///     }
/// }
/// ```
pub trait Checkpoint: serde::Serialize + for<'de> serde::Deserialize<'de> + Clone {
    /// Source type identifier (e.g., "kafka").
    ///
    /// This constant is used to:
    /// - Build the storage key together with the resource name
    /// - Validate the checkpoint type when loading
    const SOURCE_TYPE: &'static str;

    /// Convert to CLI-friendly string format.
    ///
    /// The returned string should be parseable by `from_cli_string()`.
    fn to_cli_string(&self) -> String;

    /// Parse from CLI string format.
    fn from_cli_string(s: &str) -> anyhow::Result<Self>
    where
        Self: Sized;
}
