//! Incremental extraction from Kafka.
//!
//! A run resolves its topics, captures the watermark snapshot, and polls
//! until every partition reached its snapshot ceiling or the broker has
//! nothing more to hand out. Batches go to a [`BatchSink`]; offsets are
//! persisted only after the sink flushed, so a crash re-delivers rather
//! than loses records.

mod stream;

use std::time::Duration;

use async_trait::async_trait;
use checkpoint::CheckpointManager;
use chrono::{DateTime, Utc};
use kafka_types::Batch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::broker::Broker;
use crate::checkpoint::OffsetState;
use crate::decoder::MessageDecoder;
use crate::error::{Error, Result};
use crate::resolver::TopicSelector;

pub use stream::{start, BatchStream, RunStats};

/// Default number of records per poll.
pub const DEFAULT_BATCH_SIZE: usize = 3000;

/// Default time a single poll may wait for records.
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(3);

/// Polling bounds of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Maximum records per poll (and per batch)
    pub batch_size: usize,
    /// Maximum time a poll waits for records
    pub batch_timeout: Duration,
    /// Start every partition from this point in time instead of the persisted offsets
    pub start_from: Option<DateTime<Utc>>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            start_from: None,
        }
    }
}

/// Everything needed to run one resource.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resource name; keys the persisted offsets
    pub resource: String,
    pub selector: TopicSelector,
    pub decoder: MessageDecoder,
    pub options: ExtractOptions,
}

/// Destination of extracted batches.
#[async_trait]
pub trait BatchSink: Send {
    /// Accept one batch. Empty batches are passed through as well.
    async fn write_batch(&mut self, batch: Batch) -> anyhow::Result<()>;

    /// Make everything written so far durable.
    async fn flush(&mut self) -> anyhow::Result<()>;
}

/// Run one resource to completion: load offsets, stream batches into
/// `sink`, flush it, then persist the offsets reached.
///
/// Nothing is persisted when the run fails.
pub async fn run_extraction<B: Broker, S: BatchSink>(
    broker: B,
    config: &Config,
    checkpoints: &CheckpointManager,
    sink: &mut S,
    cancel: CancellationToken,
) -> Result<RunStats> {
    let offsets: OffsetState = checkpoints
        .load(&config.resource)
        .await
        .map_err(Error::Checkpoint)?
        .unwrap_or_default();

    let mut stream = start(
        broker,
        &config.selector,
        offsets,
        config.decoder.clone(),
        config.options.clone(),
        cancel,
    )
    .await?;

    while let Some(batch) = stream.next_batch().await {
        sink.write_batch(batch?).await.map_err(Error::Sink)?;
    }
    sink.flush().await.map_err(Error::Sink)?;

    checkpoints
        .save(&config.resource, stream.offsets())
        .await
        .map_err(Error::Checkpoint)?;

    let stats = stream.stats().clone();
    info!("Resource {} done: {stats}", config.resource);
    Ok(stats)
}
