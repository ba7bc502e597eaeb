//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::output::RunSummary;
use crate::scan::{Field, FieldSet, Note, Record};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// Columns written ahead of the labelled fields
const LEADING_COLUMNS: [&str; 4] = ["issue_id", "project_id", "project_name", "url"];

/// Columns written after the labelled fields
const TRAILING_COLUMNS: [&str; 2] = ["notes", "scraped_at"];

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, scope, status,
    references_discovered, records_extracted, partial_records, records_persisted,
    records_lost, flush_count, pages_fetched, pages_failed, collection_aborted,
    parse_mismatches, retries, abandoned_tasks, skipped_tasks, interrupted, elapsed_ms";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    upsert_sql: String,
    select_sql: String,
}

fn issue_columns() -> Vec<&'static str> {
    LEADING_COLUMNS
        .iter()
        .copied()
        .chain(Field::ALL.iter().map(Field::column))
        .chain(TRAILING_COLUMNS.iter().copied())
        .collect()
}

/// `INSERT ... ON CONFLICT(issue_id) DO UPDATE` replacing every column
fn build_upsert_sql() -> String {
    let columns = issue_columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "issue_id")
        .map(|c| format!("{} = excluded.{}", c, c))
        .collect();

    format!(
        "INSERT INTO issues ({}) VALUES ({}) ON CONFLICT(issue_id) DO UPDATE SET {}",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn build_select_sql() -> String {
    format!(
        "SELECT {} FROM issues WHERE issue_id = ?1",
        issue_columns().join(", ")
    )
}

fn parse_timestamp(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// An `issues` row before its notes column is decoded
struct StoredIssue {
    issue_id: String,
    url: String,
    project_id: Option<String>,
    project_name: Option<String>,
    fields: FieldSet,
    notes_json: String,
    scraped_at: DateTime<Utc>,
}

impl StoredIssue {
    fn into_record(self) -> StorageResult<Record> {
        let notes: Vec<Note> = serde_json::from_str(&self.notes_json)?;
        Ok(Record::from_stored(
            self.issue_id,
            self.url,
            self.project_id,
            self.project_name,
            self.fields,
            notes,
            self.scraped_at,
        ))
    }
}

fn read_issue(row: &Row<'_>) -> rusqlite::Result<StoredIssue> {
    let mut fields = FieldSet::new();
    for (offset, field) in Field::ALL.iter().enumerate() {
        let value: Option<String> = row.get(LEADING_COLUMNS.len() + offset)?;
        if let Some(value) = value {
            fields.insert(*field, value);
        }
    }

    let notes_idx = LEADING_COLUMNS.len() + Field::ALL.len();
    let scraped_at: String = row.get(notes_idx + 1)?;

    Ok(StoredIssue {
        issue_id: row.get(0)?,
        project_id: row.get(1)?,
        project_name: row.get(2)?,
        url: row.get(3)?,
        fields,
        notes_json: row.get(notes_idx)?,
        scraped_at: parse_timestamp(notes_idx + 1, &scraped_at)?,
    })
}

fn read_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(5)?;
    let count = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };

    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        scope: row.get(4)?,
        status: RunStatus::from_db_string(&status).unwrap_or(RunStatus::Running),
        summary: RunSummary {
            references_discovered: count(6)?,
            records_extracted: count(7)?,
            partial_records: count(8)?,
            records_persisted: count(9)?,
            records_lost: count(10)?,
            flush_count: count(11)?,
            pages_fetched: count(12)?,
            pages_failed: count(13)?,
            collection_aborted: row.get(14)?,
            parse_mismatches: count(15)?,
            retries: count(16)?,
            abandoned_tasks: count(17)?,
            skipped_tasks: count(18)?,
            interrupted: row.get(19)?,
            elapsed: Duration::from_millis(count(20)?),
        },
    })
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            upsert_sql: build_upsert_sql(),
            select_sql: build_select_sql(),
        }
    }

    fn grouped_counts(&self, sql: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((key, count as u64))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

impl RecordStore for SqliteStorage {
    fn upsert_batch(&mut self, records: &[Record]) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&self.upsert_sql)?;
            for record in records {
                let mut values: Vec<Option<String>> = vec![
                    Some(record.issue_id().to_string()),
                    record.project_id().map(str::to_string),
                    record.project_name().map(str::to_string),
                    Some(record.url().to_string()),
                ];
                values.extend(
                    Field::ALL
                        .iter()
                        .map(|field| record.get(*field).map(str::to_string)),
                );
                values.push(Some(serde_json::to_string(record.notes())?));
                values.push(Some(record.scraped_at().to_rfc3339()));

                stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn get_issue(&self, issue_id: &str) -> StorageResult<Option<Record>> {
        let stored = self
            .conn
            .query_row(&self.select_sql, params![issue_id], read_issue)
            .optional()?;

        stored.map(StoredIssue::into_record).transpose()
    }

    fn count_issues(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, scope: Option<&str>) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, scope, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, scope, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2,
                references_discovered = ?3, records_extracted = ?4, partial_records = ?5,
                records_persisted = ?6, records_lost = ?7, flush_count = ?8,
                pages_fetched = ?9, pages_failed = ?10, collection_aborted = ?11,
                parse_mismatches = ?12, retries = ?13, abandoned_tasks = ?14,
                skipped_tasks = ?15, interrupted = ?16, elapsed_ms = ?17
             WHERE id = ?18",
            params![
                status.to_db_string(),
                now,
                summary.references_discovered as i64,
                summary.records_extracted as i64,
                summary.partial_records as i64,
                summary.records_persisted as i64,
                summary.records_lost as i64,
                summary.flush_count as i64,
                summary.pages_fetched as i64,
                summary.pages_failed as i64,
                summary.collection_aborted,
                summary.parse_mismatches as i64,
                summary.retries as i64,
                summary.abandoned_tasks as i64,
                summary.skipped_tasks as i64,
                summary.interrupted,
                summary.elapsed.as_millis() as i64,
                run_id,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                read_run,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                read_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    fn count_by_status(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT COALESCE(status, '(unknown)'), COUNT(*) FROM issues
             GROUP BY 1 ORDER BY 2 DESC, 1",
        )
    }

    fn count_by_project(&self) -> StorageResult<Vec<(String, u64)>> {
        self.grouped_counts(
            "SELECT COALESCE(project_name, '(unknown)'), COUNT(*) FROM issues
             GROUP BY 1 ORDER BY 2 DESC, 1",
        )
    }
}
