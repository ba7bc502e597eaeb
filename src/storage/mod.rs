//! Storage module for persisting scan results
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent batch upserts of issue records
//! - Run tracking with the end-of-run summary
//! - The batch writer that owns the store during a run

mod schema;
mod sqlite;
mod traits;
mod writer;

pub use sqlite::SqliteStorage;
pub use traits::{RecordStore, Storage, StorageError, StorageResult};
pub use writer::{BatchWriter, WriterReport};

use crate::output::RunSummary;

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a scan run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub scope: Option<String>,
    pub status: RunStatus,
    pub summary: RunSummary,
}

/// Status of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }
}
