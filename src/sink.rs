//! JSONL output for extracted batches.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use kafka_source::BatchSink;
use kafka_types::{Batch, DecodedRecord};
use tracing::{debug, info};

/// Default buffer size for JSONL writing.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Appends decoded records to one `<table>.jsonl` file per destination table.
///
/// The table is the configured target table, or the record's topic with
/// `.` replaced by `_`. Files are opened in append mode so successive runs
/// extend the same output.
pub struct JsonlSink {
    output_dir: PathBuf,
    target_table: Option<String>,
    writers: HashMap<String, BufWriter<File>>,
    rows_written: u64,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(output_dir: P, target_table: Option<String>) -> anyhow::Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;
        Ok(Self {
            output_dir,
            target_table,
            writers: HashMap::new(),
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Destination table for `record`.
    pub fn table_for(&self, record: &DecodedRecord) -> String {
        match &self.target_table {
            Some(table) => table.clone(),
            None => record.topic().replace('.', "_"),
        }
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{table}.jsonl"))
    }

    fn writer(&mut self, table: &str) -> anyhow::Result<&mut BufWriter<File>> {
        if !self.writers.contains_key(table) {
            let path = self.path_for(table);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            debug!("Opened {} for table '{table}'", path.display());
            self.writers.insert(
                table.to_string(),
                BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file),
            );
        }
        self.writers
            .get_mut(table)
            .ok_or_else(|| anyhow::anyhow!("No writer for table '{table}'"))
    }
}

#[async_trait]
impl BatchSink for JsonlSink {
    async fn write_batch(&mut self, batch: Batch) -> anyhow::Result<()> {
        for record in &batch {
            let table = self.table_for(record);
            let writer = self.writer(&table)?;
            serde_json::to_writer(&mut *writer, record)?;
            writeln!(writer)?;
        }
        self.rows_written += batch.len() as u64;
        debug!("Wrote {} records ({} total)", batch.len(), self.rows_written);
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        for (table, writer) in &mut self.writers {
            writer
                .flush()
                .with_context(|| format!("Failed to flush table '{table}'"))?;
            writer.get_ref().sync_all()?;
        }
        info!(
            "Flushed {} records across {} file(s) in {}",
            self.rows_written,
            self.writers.len(),
            self.output_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_types::RecordMetadata;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn record(topic: &str, offset: i64, id: i64) -> DecodedRecord {
        let fields = json!({ "id": id });
        DecodedRecord::decoded(
            fields.as_object().cloned().unwrap_or_default(),
            RecordMetadata {
                topic: topic.to_string(),
                partition: 0,
                offset,
                timestamp: None,
                key: None,
            },
        )
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_file_per_topic() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::new(dir.path(), None).unwrap();

        sink.write_batch(vec![
            record("shop.orders", 0, 1),
            record("payments", 0, 2),
            record("shop.orders", 1, 3),
        ])
        .await
        .unwrap();
        sink.flush().await.unwrap();

        let orders = read_lines(&dir.path().join("shop_orders.jsonl"));
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0]["id"], 1);
        assert_eq!(orders[1]["_kafka"]["offset"], 1);
        assert_eq!(orders[1]["_kafka"]["topic"], "shop.orders");

        let payments = read_lines(&dir.path().join("payments.jsonl"));
        assert_eq!(payments.len(), 1);
        assert_eq!(sink.rows_written(), 3);
    }

    #[tokio::test]
    async fn test_target_table_collects_all_topics() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::new(dir.path(), Some("orders".to_string())).unwrap();

        sink.write_batch(vec![record("orders_v1", 0, 1), record("orders_v2", 0, 2)])
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let lines = read_lines(&dir.path().join("orders.jsonl"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["_kafka"]["topic"], "orders_v2");
    }

    #[tokio::test]
    async fn test_appends_across_sinks() {
        let dir = TempDir::new().unwrap();
        for id in 0..2 {
            let mut sink = JsonlSink::new(dir.path(), None).unwrap();
            sink.write_batch(vec![record("events", id, id)]).await.unwrap();
            sink.flush().await.unwrap();
        }

        let lines = read_lines(&dir.path().join("events.jsonl"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 0);
        assert_eq!(lines[1]["id"], 1);
    }

    #[tokio::test]
    async fn test_empty_batch_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonlSink::new(dir.path().join("out"), None).unwrap();
        sink.write_batch(Vec::new()).await.unwrap();
        sink.flush().await.unwrap();

        assert!(dir.path().join("out").is_dir());
        assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }
}
