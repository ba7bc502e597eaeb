//! Statistics generation from the issue database
//!
//! This module provides functionality for extracting and displaying
//! store statistics from the storage layer.

use crate::storage::{RunRecord, Storage, StorageResult};

/// Issue store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Total number of stored issues
    pub total_issues: u64,

    /// Issue count per status, largest first
    pub by_status: Vec<(String, u64)>,

    /// Issue count per project name, largest first
    pub by_project: Vec<(String, u64)>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<StoreStatistics> {
    Ok(StoreStatistics {
        total_issues: storage.count_issues()?,
        by_status: storage.count_by_status()?,
        by_project: storage.count_by_project()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    println!("=== Issue Store Statistics ===\n");

    println!("Overview:");
    println!("  Total issues: {}", stats.total_issues);
    println!("  Projects: {}", stats.by_project.len());
    println!();

    print_breakdown("Issues by Status", &stats.by_status, stats.total_issues);
    print_breakdown("Issues by Project", &stats.by_project, stats.total_issues);

    match &stats.latest_run {
        Some(run) => {
            println!("Latest Run (#{}):", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Scope: {}", run.scope.as_deref().unwrap_or("all projects"));
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("{}", run.summary);
        }
        None => println!("No runs recorded yet"),
    }
}

fn print_breakdown(title: &str, counts: &[(String, u64)], total: u64) {
    if counts.is_empty() {
        return;
    }

    println!("{}:", title);
    for (key, count) in counts {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", key, count, percentage);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RunSummary;
    use crate::scan::{Field, Record, Reference};
    use crate::storage::{RecordStore, RunStatus, SqliteStorage};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn record(id: &str, category: &str, status: &str) -> Record {
        let reference = Reference::new(id, format!("https://t.example.com/view.php?id={}", id));
        let fields = BTreeMap::from([
            (Field::Category, category.to_string()),
            (Field::Status, status.to_string()),
        ]);
        Record::assemble(&reference, None, fields, vec![], Utc::now())
    }

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .upsert_batch(&[
                record("1", "[Portal] Login", "new"),
                record("2", "[Portal] Sync", "resolved"),
                record("3", "Mobile crash", "new"),
            ])
            .unwrap();
        let run_id = storage.create_run("hash", None).unwrap();
        let summary = RunSummary {
            records_persisted: 3,
            ..Default::default()
        };
        storage
            .complete_run(run_id, RunStatus::Completed, &summary)
            .unwrap();

        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.total_issues, 3);
        assert_eq!(stats.by_status[0], ("new".to_string(), 2));
        assert_eq!(stats.by_project[0], ("Portal".to_string(), 2));
        let run = stats.latest_run.unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.summary.records_persisted, 3);
    }

    #[test]
    fn test_empty_store() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let stats = load_statistics(&storage).unwrap();

        assert_eq!(stats.total_issues, 0);
        assert!(stats.by_status.is_empty());
        assert!(stats.latest_run.is_none());
    }
}
