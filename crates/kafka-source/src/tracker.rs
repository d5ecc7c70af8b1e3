//! Watermark-bounded progress tracking for one consumption run.
//!
//! At construction the tracker captures each partition's high watermark.
//! That snapshot is the ceiling of the run: records produced after it are
//! left for the next run, so a busy topic cannot keep a run reading forever.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use kafka_types::{RawRecord, TopicPartition};
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::checkpoint::OffsetState;
use crate::error::Result;

/// Progress of one partition within the current run.
///
/// Offsets are "last consumed" positions, so a partition with nothing
/// consumed yet sits at `low watermark - 1`.
/// `start_offset <= current_offset <= end_offset` holds throughout the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionWatermark {
    /// Position the run started from
    pub start_offset: i64,
    /// High watermark captured at initialization (next offset to be produced)
    pub end_offset: i64,
    /// Last offset consumed in this or a previous run
    pub current_offset: i64,
}

impl PartitionWatermark {
    pub fn has_unread(&self) -> bool {
        self.current_offset + 1 < self.end_offset
    }

    /// Offsets left below the snapshot ceiling.
    pub fn remaining(&self) -> i64 {
        (self.end_offset - self.current_offset - 1).max(0)
    }
}

/// State of a tracker after initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// At least one partition has offsets below its watermark.
    Reading,
    /// Every partition reached its watermark.
    Exhausted,
}

/// Tracks per-partition progress against the watermark snapshot.
#[derive(Debug)]
pub struct WatermarkTracker {
    partitions: BTreeMap<TopicPartition, PartitionWatermark>,
    offsets: OffsetState,
}

impl WatermarkTracker {
    /// Capture watermarks for `topics` and resolve each partition's start position.
    ///
    /// Topics missing from `offsets` are added with an empty partition map
    /// first. Without `start_from`, a partition resumes after its persisted
    /// offset, or from the log start when nothing was persisted. With
    /// `start_from`, the persisted offset is replaced by the position just
    /// before the first record at or after that time, or by the end of the
    /// partition when no such record exists.
    pub async fn initialize<B: Broker + ?Sized>(
        broker: &B,
        topics: &BTreeSet<String>,
        mut offsets: OffsetState,
        start_from: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        for topic in topics {
            if offsets.ensure_topic(topic) {
                info!("Topic {topic} has no persisted offsets, starting it fresh");
            }
        }

        let mut partitions = BTreeMap::new();
        for topic in topics {
            let metadata = broker.fetch_metadata(Some(topic)).await?;
            let Some(partition_ids) = metadata.get(topic) else {
                warn!("Topic {topic} not found in broker metadata, skipping");
                continue;
            };

            let by_time = match start_from {
                Some(ts) => Some(
                    broker
                        .offsets_for_timestamp(topic, partition_ids, ts.timestamp_millis())
                        .await?,
                ),
                None => None,
            };

            for &partition in partition_ids {
                let tp = TopicPartition::new(topic.clone(), partition);
                let (low, high) = broker.watermarks(&tp).await?;

                let current = match &by_time {
                    Some(found) => {
                        let current = match found.get(&partition).copied().flatten() {
                            Some(offset) => offset - 1,
                            None => high - 1,
                        };
                        offsets.set(&tp, current);
                        current
                    }
                    None => resume_position(&tp, offsets.get(&tp), low, high),
                };

                let watermark = PartitionWatermark {
                    start_offset: current,
                    end_offset: high,
                    current_offset: current,
                };
                debug!(
                    "Watermark {tp}: low={low} high={high} current={current} remaining={}",
                    watermark.remaining()
                );
                partitions.insert(tp, watermark);
            }
        }

        Ok(Self {
            partitions,
            offsets,
        })
    }

    /// True while any partition has offsets left below its watermark.
    pub fn has_unread(&self) -> bool {
        self.partitions.values().any(PartitionWatermark::has_unread)
    }

    pub fn state(&self) -> TrackerState {
        if self.has_unread() {
            TrackerState::Reading
        } else {
            TrackerState::Exhausted
        }
    }

    /// Whether a record at `offset` is new and inside the snapshot.
    pub fn admits(&self, tp: &TopicPartition, offset: i64) -> bool {
        self.partitions
            .get(tp)
            .is_some_and(|w| offset > w.current_offset && offset < w.end_offset)
    }

    /// Advance the partition of a processed record to its offset.
    ///
    /// Returns false, leaving everything unchanged, for untracked partitions
    /// and for offsets at or below the current position or at or above the
    /// watermark.
    pub fn renew(&mut self, record: &RawRecord) -> bool {
        self.advance(&record.topic_partition(), record.offset)
    }

    pub fn advance(&mut self, tp: &TopicPartition, offset: i64) -> bool {
        if !self.admits(tp, offset) {
            return false;
        }
        if let Some(watermark) = self.partitions.get_mut(tp) {
            watermark.current_offset = offset;
        }
        self.offsets.set(tp, offset);
        true
    }

    /// Positions to assign for partitions that still have unread offsets.
    pub fn positions(&self) -> Vec<(TopicPartition, i64)> {
        self.partitions
            .iter()
            .filter(|(_, w)| w.has_unread())
            .map(|(tp, w)| (tp.clone(), w.current_offset + 1))
            .collect()
    }

    pub fn watermark(&self, tp: &TopicPartition) -> Option<&PartitionWatermark> {
        self.partitions.get(tp)
    }

    pub fn watermarks(&self) -> impl Iterator<Item = (&TopicPartition, &PartitionWatermark)> {
        self.partitions.iter()
    }

    /// Offsets left below the snapshot across all partitions.
    pub fn remaining(&self) -> i64 {
        self.partitions.values().map(PartitionWatermark::remaining).sum()
    }

    /// Current offset state, to be persisted by the caller.
    pub fn offsets(&self) -> &OffsetState {
        &self.offsets
    }

    pub fn into_offsets(self) -> OffsetState {
        self.offsets
    }
}

/// Resume after `persisted`, kept within what the partition still holds.
fn resume_position(tp: &TopicPartition, persisted: Option<i64>, low: i64, high: i64) -> i64 {
    let floor = low - 1;
    let ceiling = (high - 1).max(floor);
    match persisted {
        None => floor,
        Some(offset) if offset < floor => {
            warn!("Persisted offset {offset} for {tp} is below the log start {low}, resuming from {low}");
            floor
        }
        Some(offset) if offset > ceiling => {
            warn!("Persisted offset {offset} for {tp} is beyond the high watermark {high}");
            ceiling
        }
        Some(offset) => offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBroker;
    use chrono::TimeZone;

    fn topics(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn tp(topic: &str, partition: i32) -> TopicPartition {
        TopicPartition::new(topic, partition)
    }

    fn record(topic: &str, partition: i32, offset: i64) -> RawRecord {
        RawRecord::new(topic, partition, offset, b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_initialize_without_state_starts_at_log_start() {
        let broker = MemoryBroker::new();
        broker.create_topic_with_low("t", 1, 10);
        broker.produce_json("t", 0, 5);

        let tracker = WatermarkTracker::initialize(&broker, &topics(&["t"]), OffsetState::new(), None)
            .await
            .unwrap();

        let w = tracker.watermark(&tp("t", 0)).unwrap();
        assert_eq!(w.start_offset, 9);
        assert_eq!(w.current_offset, 9);
        assert_eq!(w.end_offset, 15);
        assert_eq!(tracker.positions(), vec![(tp("t", 0), 10)]);
        assert_eq!(tracker.state(), TrackerState::Reading);
        assert_eq!(tracker.remaining(), 5);
    }

    #[tokio::test]
    async fn test_initialize_resumes_from_persisted_offset() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 2);
        broker.produce_json("t", 0, 5);
        broker.produce_json("t", 1, 3);

        let mut state = OffsetState::new();
        state.set(&tp("t", 0), 2);
        state.set(&tp("t", 1), 2);

        let tracker = WatermarkTracker::initialize(&broker, &topics(&["t"]), state, None)
            .await
            .unwrap();

        assert_eq!(tracker.positions(), vec![(tp("t", 0), 3)]);
        assert!(!tracker.watermark(&tp("t", 1)).unwrap().has_unread());
    }

    #[tokio::test]
    async fn test_initialize_adds_new_topics_to_existing_state() {
        let broker = MemoryBroker::new();
        broker.create_topic("orders_v1", 1);
        broker.create_topic("orders_v2", 1);
        broker.produce_json("orders_v1", 0, 2);
        broker.produce_json("orders_v2", 0, 2);

        let mut state = OffsetState::new();
        state.set(&tp("orders_v1", 0), 1);

        let tracker = WatermarkTracker::initialize(
            &broker,
            &topics(&["orders_v1", "orders_v2"]),
            state,
            None,
        )
        .await
        .unwrap();

        assert!(tracker.offsets().contains_topic("orders_v2"));
        assert_eq!(tracker.positions(), vec![(tp("orders_v2", 0), 0)]);
    }

    #[tokio::test]
    async fn test_initialize_clamps_out_of_range_offsets() {
        let broker = MemoryBroker::new();
        broker.create_topic_with_low("t", 2, 100);
        broker.produce_json("t", 0, 5);
        broker.produce_json("t", 1, 5);

        let mut state = OffsetState::new();
        // Retention removed everything up to 100
        state.set(&tp("t", 0), 50);
        // Topic was recreated with fewer records
        state.set(&tp("t", 1), 500);

        let tracker = WatermarkTracker::initialize(&broker, &topics(&["t"]), state, None)
            .await
            .unwrap();

        assert_eq!(tracker.watermark(&tp("t", 0)).unwrap().current_offset, 99);
        assert_eq!(tracker.watermark(&tp("t", 1)).unwrap().current_offset, 104);
        assert_eq!(tracker.positions(), vec![(tp("t", 0), 100)]);
    }

    #[tokio::test]
    async fn test_initialize_start_from_overrides_persisted_state() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 2);
        // Timestamps 1000, 2000, ... on partition 0; 1000, 2000 on partition 1
        broker.produce_json_with_timestamps("t", 0, &[1_000, 2_000, 3_000, 4_000]);
        broker.produce_json_with_timestamps("t", 1, &[1_000, 2_000]);

        let mut state = OffsetState::new();
        state.set(&tp("t", 0), 0);
        state.set(&tp("t", 1), 0);

        let start = Utc.timestamp_millis_opt(2_500).unwrap();
        let tracker = WatermarkTracker::initialize(&broker, &topics(&["t"]), state, Some(start))
            .await
            .unwrap();

        // First record at/after 2500 is offset 2 on partition 0
        assert_eq!(tracker.watermark(&tp("t", 0)).unwrap().current_offset, 1);
        // No such record on partition 1: start at the end
        assert_eq!(tracker.watermark(&tp("t", 1)).unwrap().current_offset, 1);
        assert_eq!(tracker.offsets().get(&tp("t", 0)), Some(1));
        assert_eq!(tracker.offsets().get(&tp("t", 1)), Some(1));
        assert_eq!(tracker.positions(), vec![(tp("t", 0), 2)]);
    }

    #[tokio::test]
    async fn test_initialize_skips_unknown_topic() {
        let broker = MemoryBroker::new();
        let tracker =
            WatermarkTracker::initialize(&broker, &topics(&["missing"]), OffsetState::new(), None)
                .await
                .unwrap();
        assert_eq!(tracker.state(), TrackerState::Exhausted);
        assert!(tracker.offsets().contains_topic("missing"));
    }

    #[tokio::test]
    async fn test_initialize_propagates_transport_failure() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.fail_metadata(true);
        let err = WatermarkTracker::initialize(&broker, &topics(&["t"]), OffsetState::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_renew_is_monotonic() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.produce_json("t", 0, 5);

        let mut tracker =
            WatermarkTracker::initialize(&broker, &topics(&["t"]), OffsetState::new(), None)
                .await
                .unwrap();

        assert!(tracker.renew(&record("t", 0, 3)));
        assert!(!tracker.renew(&record("t", 0, 3)));
        assert!(!tracker.renew(&record("t", 0, 1)));
        assert_eq!(tracker.watermark(&tp("t", 0)).unwrap().current_offset, 3);
        assert_eq!(tracker.offsets().get(&tp("t", 0)), Some(3));
    }

    #[tokio::test]
    async fn test_renew_ignores_records_outside_snapshot() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.produce_json("t", 0, 3);

        let mut tracker =
            WatermarkTracker::initialize(&broker, &topics(&["t"]), OffsetState::new(), None)
                .await
                .unwrap();

        // Produced after the snapshot
        assert!(!tracker.renew(&record("t", 0, 3)));
        // Never tracked
        assert!(!tracker.renew(&record("t", 7, 0)));
        assert!(!tracker.renew(&record("other", 0, 0)));
        assert_eq!(tracker.offsets().get(&tp("t", 0)), None);
    }

    #[tokio::test]
    async fn test_exhausted_after_consuming_all_records() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1);
        broker.produce_json("t", 0, 4);

        let mut tracker =
            WatermarkTracker::initialize(&broker, &topics(&["t"]), OffsetState::new(), None)
                .await
                .unwrap();

        for offset in 0..3 {
            assert!(tracker.renew(&record("t", 0, offset)));
            assert!(tracker.has_unread());
        }
        assert!(tracker.renew(&record("t", 0, 3)));
        assert!(!tracker.has_unread());
        assert_eq!(tracker.state(), TrackerState::Exhausted);
        assert!(tracker.positions().is_empty());

        let w = tracker.watermark(&tp("t", 0)).unwrap();
        assert!(w.start_offset <= w.current_offset && w.current_offset <= w.end_offset);
    }

    #[test]
    fn test_resume_position() {
        let t = tp("t", 0);
        assert_eq!(resume_position(&t, None, 0, 0), -1);
        assert_eq!(resume_position(&t, None, 10, 15), 9);
        assert_eq!(resume_position(&t, Some(12), 10, 15), 12);
        assert_eq!(resume_position(&t, Some(3), 10, 15), 9);
        assert_eq!(resume_position(&t, Some(30), 10, 15), 14);
        // Empty partition after retention: low == high
        assert_eq!(resume_position(&t, Some(30), 15, 15), 14);
    }
}
