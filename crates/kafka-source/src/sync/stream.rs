//! The consumption loop: watermark-bounded polling yielding one batch per poll.

use std::fmt;

use futures::Stream;
use kafka_types::{Batch, ErrorSeverity};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ExtractOptions;
use crate::broker::Broker;
use crate::checkpoint::OffsetState;
use crate::decoder::MessageDecoder;
use crate::error::{Error, Result};
use crate::resolver::{self, TopicSelector};
use crate::tracker::WatermarkTracker;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Batches yielded, including empty ones
    pub batches: u64,
    /// Records yielded, including diagnostic records
    pub records: u64,
    /// Records whose value failed to decode
    pub diagnostics: u64,
    /// Broker-reported record errors that were skipped
    pub skipped_errors: u64,
    /// Records outside the watermark snapshot
    pub out_of_snapshot: u64,
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches, {} records ({} diagnostic), {} skipped errors, {} out of snapshot",
            self.batches, self.records, self.diagnostics, self.skipped_errors, self.out_of_snapshot
        )
    }
}

/// Resolve topics, capture watermarks, and assign partitions.
///
/// The returned stream owns `broker`. It is closed here when setup fails,
/// and by the stream on every later exit, including drop.
pub async fn start<B: Broker>(
    broker: B,
    selector: &TopicSelector,
    offsets: OffsetState,
    decoder: MessageDecoder,
    options: ExtractOptions,
    cancel: CancellationToken,
) -> Result<BatchStream<B>> {
    let tracker = match setup(&broker, selector, offsets, &options).await {
        Ok(tracker) => tracker,
        Err(e) => {
            broker.close();
            return Err(e);
        }
    };

    Ok(BatchStream {
        broker,
        tracker,
        decoder,
        options,
        cancel,
        stats: RunStats::default(),
        finished: false,
        closed: false,
    })
}

async fn setup<B: Broker>(
    broker: &B,
    selector: &TopicSelector,
    offsets: OffsetState,
    options: &ExtractOptions,
) -> Result<WatermarkTracker> {
    if options.batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
    }

    let topics = resolver::resolve(broker, selector).await?;
    info!("Extracting from topics {topics:?}");

    let tracker = WatermarkTracker::initialize(broker, &topics, offsets, options.start_from).await?;
    let positions = tracker.positions();
    if !positions.is_empty() {
        broker.assign(&positions).await?;
    }
    info!(
        "Watermark snapshot: {} partitions, {} unread, {} records below the watermarks",
        tracker.watermarks().count(),
        positions.len(),
        tracker.remaining()
    );
    Ok(tracker)
}

/// A lazy sequence of batches bounded by the watermark snapshot.
pub struct BatchStream<B: Broker> {
    broker: B,
    tracker: WatermarkTracker,
    decoder: MessageDecoder,
    options: ExtractOptions,
    cancel: CancellationToken,
    stats: RunStats,
    finished: bool,
    closed: bool,
}

impl<B: Broker> BatchStream<B> {
    /// Poll once and return the resulting batch.
    ///
    /// Returns `None` once the snapshot is exhausted, a poll comes back
    /// empty, or the run was cancelled. A fatal record error or a broker
    /// failure is returned once and ends the stream.
    pub async fn next_batch(&mut self) -> Option<Result<Batch>> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            info!("Extraction cancelled");
            self.finish();
            return None;
        }
        if !self.tracker.has_unread() {
            info!("All partitions reached their watermarks");
            self.finish();
            return None;
        }

        let polled = match self
            .broker
            .consume(self.options.batch_size, self.options.batch_timeout)
            .await
        {
            Ok(polled) => polled,
            Err(e) => {
                error!("Polling failed: {e}");
                self.finish();
                return Some(Err(e));
            }
        };
        if polled.is_empty() {
            info!(
                "Poll returned no records, stopping with {} records below the watermarks",
                self.tracker.remaining()
            );
            self.finish();
            return None;
        }

        let mut batch = Batch::with_capacity(polled.len());
        for entry in polled {
            let record = match entry {
                Ok(record) => record,
                Err(err) => match err.severity() {
                    ErrorSeverity::Fatal => {
                        error!("Fatal broker error, aborting: {err}");
                        self.finish();
                        return Some(Err(Error::FatalRecord(err)));
                    }
                    severity => {
                        warn!("Skipping {severity:?} broker error: {err}");
                        self.stats.skipped_errors += 1;
                        continue;
                    }
                },
            };

            if !self
                .tracker
                .admits(&record.topic_partition(), record.offset)
            {
                debug!(
                    "Skipping {}[{}]@{} outside the watermark snapshot",
                    record.topic, record.partition, record.offset
                );
                self.stats.out_of_snapshot += 1;
                continue;
            }

            let decoded = self.decoder.decode(&record).await;
            if decoded.is_diagnostic() {
                self.stats.diagnostics += 1;
            }
            batch.push(decoded);
            self.tracker.renew(&record);
        }

        self.stats.batches += 1;
        self.stats.records += batch.len() as u64;
        debug!("Yielding batch of {} records", batch.len());
        Some(Ok(batch))
    }

    /// Adapt into a `Stream` of batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_batch().await.map(|batch| (batch, stream))
        })
    }

    /// Offsets reached so far, including topics first seen in this run.
    pub fn offsets(&self) -> &OffsetState {
        self.tracker.offsets()
    }

    pub fn tracker(&self) -> &WatermarkTracker {
        &self.tracker
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop the run and release the broker.
    pub fn close(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            info!("Extraction finished: {}", self.stats);
        }
        if !self.closed {
            self.closed = true;
            self.broker.close();
        }
    }
}

impl<B: Broker> Drop for BatchStream<B> {
    fn drop(&mut self) {
        self.finish();
    }
}
