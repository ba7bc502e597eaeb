//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Tracker-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track scan runs and their summaries
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    scope TEXT,
    status TEXT NOT NULL,
    references_discovered INTEGER NOT NULL DEFAULT 0,
    records_extracted INTEGER NOT NULL DEFAULT 0,
    partial_records INTEGER NOT NULL DEFAULT 0,
    records_persisted INTEGER NOT NULL DEFAULT 0,
    records_lost INTEGER NOT NULL DEFAULT 0,
    flush_count INTEGER NOT NULL DEFAULT 0,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    pages_failed INTEGER NOT NULL DEFAULT 0,
    collection_aborted INTEGER NOT NULL DEFAULT 0,
    parse_mismatches INTEGER NOT NULL DEFAULT 0,
    retries INTEGER NOT NULL DEFAULT 0,
    abandoned_tasks INTEGER NOT NULL DEFAULT 0,
    skipped_tasks INTEGER NOT NULL DEFAULT 0,
    interrupted INTEGER NOT NULL DEFAULT 0,
    elapsed_ms INTEGER NOT NULL DEFAULT 0
);

-- One row per issue, replaced in full on every scan that sees it
CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    issue_id TEXT NOT NULL UNIQUE,
    project_id TEXT,
    project_name TEXT,
    url TEXT NOT NULL,
    category TEXT,
    summary TEXT,
    description TEXT,
    steps_to_reproduce TEXT,
    additional_information TEXT,
    status TEXT,
    resolution TEXT,
    reporter TEXT,
    assigned_to TEXT,
    priority TEXT,
    severity TEXT,
    date_submitted TEXT,
    last_updated TEXT,
    version TEXT,
    fixed_in_version TEXT,
    target_version TEXT,
    notes TEXT NOT NULL DEFAULT '[]',
    scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_issues_project_name ON issues(project_name);
CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
