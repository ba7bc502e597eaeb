//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::output::RunSummary;
use crate::scan::Record;
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable, idempotent record storage
///
/// Implementations must be `Send`: the batch writer moves its store onto a
/// blocking thread and is the only one writing to it.
pub trait RecordStore: Send {
    /// Upserts a batch of records in one transaction
    ///
    /// A record whose `issue_id` already exists replaces the stored row in
    /// full. Either every record of the batch is written or none is.
    ///
    /// # Returns
    ///
    /// The number of records written
    fn upsert_batch(&mut self, records: &[Record]) -> StorageResult<usize>;

    /// Reads one record back by issue id
    fn get_issue(&self, issue_id: &str) -> StorageResult<Option<Record>>;

    /// Total number of stored issues
    fn count_issues(&self) -> StorageResult<u64>;
}

/// Full storage backend: records plus run bookkeeping and reporting queries
pub trait Storage: RecordStore {
    // ===== Run Management =====

    /// Creates a new run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `scope` - Scope-selector token of the run, if any
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str, scope: Option<&str>) -> StorageResult<i64>;

    /// Stores the final status and summary of a run
    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Statistics =====

    /// Issue counts grouped by status, largest first
    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>>;

    /// Issue counts grouped by project name, largest first
    fn count_by_project(&self) -> StorageResult<Vec<(String, u64)>>;
}
