//! Batch persistence writer
//!
//! The writer is the only component touching the store during a run. It buffers
//! completed records and flushes them as one upsert transaction every
//! `batch_size` records, plus once more at the end of the run.

use super::traits::RecordStore;
use crate::config::OutputConfig;
use crate::scan::Record;
use tokio::sync::mpsc;

/// Counters of a writer's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub accepted: u64,
    pub persisted: u64,
    /// Records of batches that could not be written
    pub lost: u64,
    /// Successful flushes
    pub flushes: u64,
    pub failed_flushes: u64,
}

/// Buffers records and upserts them in batches
pub struct BatchWriter<S: RecordStore> {
    store: S,
    batch_size: usize,
    retry_failed_flush: bool,
    buffer: Vec<Record>,
    report: WriterReport,
}

impl<S: RecordStore> BatchWriter<S> {
    pub fn new(store: S, batch_size: usize, retry_failed_flush: bool) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            retry_failed_flush,
            buffer: Vec::with_capacity(batch_size),
            report: WriterReport::default(),
        }
    }

    pub fn from_config(store: S, config: &OutputConfig) -> Self {
        Self::new(store, config.batch_size, config.retry_failed_flush)
    }

    /// Buffers a record, flushing once the buffer reaches the batch size
    pub fn accept(&mut self, record: Record) {
        self.report.accepted += 1;
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    /// Writes every buffered record
    ///
    /// A failed batch is retried once when configured to; a batch that still
    /// fails is dropped and its records counted as lost.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        let mut result = self.store.upsert_batch(&batch);

        if let Err(e) = &result {
            if self.retry_failed_flush {
                tracing::warn!("Flush of {} records failed: {}; retrying", batch.len(), e);
                result = self.store.upsert_batch(&batch);
            }
        }

        match result {
            Ok(written) => {
                self.report.persisted += written as u64;
                self.report.flushes += 1;
                tracing::debug!(
                    "Flushed {} records ({} total)",
                    written,
                    self.report.persisted
                );
            }
            Err(e) => {
                self.report.failed_flushes += 1;
                self.report.lost += batch.len() as u64;
                tracing::error!("Lost batch of {} records: {}", batch.len(), e);
            }
        }
    }

    /// Number of records waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn report(&self) -> WriterReport {
        self.report
    }

    /// Performs the final flush and hands the store back
    pub fn finish(mut self) -> (S, WriterReport) {
        self.flush();
        (self.store, self.report)
    }

    /// Consumes records until the channel closes, then finishes
    ///
    /// Blocks the calling thread; run it under `spawn_blocking`.
    pub fn run_blocking(mut self, mut records: mpsc::Receiver<Record>) -> (S, WriterReport) {
        while let Some(record) = records.blocking_recv() {
            self.accept(record);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Reference;
    use crate::storage::{SqliteStorage, StorageError, StorageResult};

    /// Store that records batch sizes and fails a configurable number of times
    #[derive(Default)]
    struct RecordingStore {
        batches: Vec<usize>,
        failures_left: u32,
    }

    impl RecordStore for RecordingStore {
        fn upsert_batch(&mut self, records: &[Record]) -> StorageResult<usize> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            self.batches.push(records.len());
            Ok(records.len())
        }

        fn get_issue(&self, _issue_id: &str) -> StorageResult<Option<Record>> {
            Ok(None)
        }

        fn count_issues(&self) -> StorageResult<u64> {
            Ok(self.batches.iter().sum::<usize>() as u64)
        }
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let reference = Reference::new(i.to_string(), format!("https://t.example.com/{}", i));
                Record::minimal(&reference, None)
            })
            .collect()
    }

    fn write_all(store: RecordingStore, n: usize, retry: bool) -> (RecordingStore, WriterReport) {
        let mut writer = BatchWriter::new(store, 3, retry);
        for record in records(n) {
            writer.accept(record);
        }
        writer.finish()
    }

    #[test]
    fn test_partial_final_batch() {
        let (store, report) = write_all(RecordingStore::default(), 4, true);
        assert_eq!(store.batches, vec![3, 1]);
        assert_eq!(report.flushes, 2);
        assert_eq!(report.persisted, 4);
    }

    #[test]
    fn test_exact_multiple_of_batch_size() {
        let (store, report) = write_all(RecordingStore::default(), 6, true);
        assert_eq!(store.batches, vec![3, 3]);
        assert_eq!(report.flushes, 2);
    }

    #[test]
    fn test_empty_run_does_not_flush() {
        let (store, report) = write_all(RecordingStore::default(), 0, true);
        assert!(store.batches.is_empty());
        assert_eq!(report.flushes, 0);
    }

    #[test]
    fn test_failed_flush_is_retried_once() {
        let store = RecordingStore {
            failures_left: 1,
            ..Default::default()
        };
        let (store, report) = write_all(store, 3, true);
        assert_eq!(store.batches, vec![3]);
        assert_eq!(report.lost, 0);
        assert_eq!(report.persisted, 3);
    }

    #[test]
    fn test_batch_lost_after_retry_fails() {
        let store = RecordingStore {
            failures_left: 2,
            ..Default::default()
        };
        let (store, report) = write_all(store, 4, true);
        assert_eq!(store.batches, vec![1]);
        assert_eq!(report.lost, 3);
        assert_eq!(report.failed_flushes, 1);
        assert_eq!(report.persisted, 1);
    }

    #[test]
    fn test_no_retry_when_disabled() {
        let store = RecordingStore {
            failures_left: 1,
            ..Default::default()
        };
        let (store, report) = write_all(store, 3, false);
        assert!(store.batches.is_empty());
        assert_eq!(report.lost, 3);
    }

    #[test]
    fn test_buffered_count() {
        let mut writer = BatchWriter::new(RecordingStore::default(), 3, true);
        for record in records(2) {
            writer.accept(record);
        }
        assert_eq!(writer.buffered(), 2);
        assert_eq!(writer.report().flushes, 0);
    }

    #[tokio::test]
    async fn test_run_blocking_drains_channel() {
        let (tx, rx) = mpsc::channel(16);
        let writer = BatchWriter::new(SqliteStorage::new_in_memory().unwrap(), 3, true);
        let handle = tokio::task::spawn_blocking(move || writer.run_blocking(rx));

        for record in records(5) {
            tx.send(record).await.unwrap();
        }
        drop(tx);

        let (store, report) = handle.await.unwrap();
        assert_eq!(report.flushes, 2);
        assert_eq!(store.count_issues().unwrap(), 5);
    }
}
